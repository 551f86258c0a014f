use std::sync::Arc;

use rolegate_core::engine::{EntityReader, ResolveError};
use rolegate_core::model::{GroupRole, RolePermission, UserGroup, UserRole};
use rolegate_storage::{EntityStore, StorageError};

/// Exposes an [`EntityStore`] to the resolver.
pub struct StoreEntityReader<S: EntityStore> {
    store: Arc<S>,
}

impl<S: EntityStore> StoreEntityReader<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

fn to_resolve_error(e: StorageError) -> ResolveError {
    match &e {
        StorageError::Unavailable(_) | StorageError::Internal(_) => {
            ResolveError::StoreUnavailable(e.to_string())
        }
        StorageError::NotFound { .. } | StorageError::InvalidRecord { .. } => {
            ResolveError::DataIntegrity(e.to_string())
        }
    }
}

impl<S: EntityStore> EntityReader for StoreEntityReader<S> {
    async fn effective_user_roles(&self, user_id: &str) -> Result<Vec<UserRole>, ResolveError> {
        self.store
            .effective_user_roles(user_id)
            .await
            .map_err(to_resolve_error)
    }

    async fn active_groups_for_user(&self, user_id: &str) -> Result<Vec<UserGroup>, ResolveError> {
        self.store
            .active_groups_for_user(user_id)
            .await
            .map_err(to_resolve_error)
    }

    async fn effective_group_roles(&self, group_id: &str) -> Result<Vec<GroupRole>, ResolveError> {
        self.store
            .effective_group_roles(group_id)
            .await
            .map_err(to_resolve_error)
    }

    async fn role_permissions(&self, role_id: &str) -> Result<Vec<RolePermission>, ResolveError> {
        self.store
            .role_permissions(role_id)
            .await
            .map_err(to_resolve_error)
    }

    async fn resource_parent(&self, resource_id: &str) -> Result<Option<String>, ResolveError> {
        self.store
            .resource_parent(resource_id)
            .await
            .map_err(to_resolve_error)
    }

    async fn role_parent(&self, role_id: &str) -> Result<Option<String>, ResolveError> {
        self.store
            .role_parent(role_id)
            .await
            .map_err(to_resolve_error)
    }

    async fn group_parent(&self, group_id: &str) -> Result<Option<String>, ResolveError> {
        self.store
            .group_parent(group_id)
            .await
            .map_err(to_resolve_error)
    }
}
