pub mod migrations;
mod queries;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use rolegate_core::model::{
    Effect, GroupRole, Permission, Resource, Role, RolePermission, UserGroup, UserGroupMembership,
    UserRole,
};

use crate::traits::{EntityStore, StorageError};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(queries::to_storage_error)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn require(&self, entity: &'static str, table: &'static str, id: &str) -> Result<(), StorageError> {
        if queries::exists(&self.pool, table, id).await? {
            Ok(())
        } else {
            Err(StorageError::not_found(entity, id))
        }
    }

    async fn require_scope(&self, resource_id: Option<&str>) -> Result<(), StorageError> {
        match resource_id {
            Some(id) => self.require("resource", "resources", id).await,
            None => Ok(()),
        }
    }
}

impl EntityStore for PostgresStore {
    async fn effective_user_roles(&self, user_id: &str) -> Result<Vec<UserRole>, StorageError> {
        queries::effective_user_roles(&self.pool, user_id).await
    }

    async fn active_groups_for_user(&self, user_id: &str) -> Result<Vec<UserGroup>, StorageError> {
        queries::active_groups_for_user(&self.pool, user_id).await
    }

    async fn effective_group_roles(&self, group_id: &str) -> Result<Vec<GroupRole>, StorageError> {
        queries::effective_group_roles(&self.pool, group_id).await
    }

    async fn role_permissions(&self, role_id: &str) -> Result<Vec<RolePermission>, StorageError> {
        queries::role_permissions(&self.pool, role_id).await
    }

    async fn resource_parent(&self, resource_id: &str) -> Result<Option<String>, StorageError> {
        queries::parent_of(&self.pool, "resources", "parent_resource_id", resource_id).await
    }

    async fn role_parent(&self, role_id: &str) -> Result<Option<String>, StorageError> {
        queries::parent_of(&self.pool, "roles", "parent_role_id", role_id).await
    }

    async fn group_parent(&self, group_id: &str) -> Result<Option<String>, StorageError> {
        queries::parent_of(&self.pool, "user_groups", "parent_group_id", group_id).await
    }

    async fn group_members(&self, group_id: &str) -> Result<Vec<String>, StorageError> {
        queries::group_members(&self.pool, group_id).await
    }

    async fn upsert_role(&self, role: &Role) -> Result<(), StorageError> {
        queries::upsert_role(&self.pool, role).await
    }

    async fn upsert_permission(&self, permission: &Permission) -> Result<(), StorageError> {
        queries::upsert_permission(&self.pool, permission).await
    }

    async fn upsert_resource(&self, resource: &Resource) -> Result<(), StorageError> {
        queries::upsert_resource(&self.pool, resource).await
    }

    async fn upsert_group(&self, group: &UserGroup) -> Result<(), StorageError> {
        queries::upsert_group(&self.pool, group).await
    }

    async fn bind_permission(
        &self,
        role_id: &str,
        permission_id: &str,
        effect_override: Option<Effect>,
        conditions: Option<serde_json::Value>,
    ) -> Result<(), StorageError> {
        self.require("role", "roles", role_id).await?;
        self.require("permission", "permissions", permission_id)
            .await?;
        queries::bind_permission(&self.pool, role_id, permission_id, effect_override, conditions)
            .await
    }

    async fn assign_user_role(&self, assignment: &UserRole) -> Result<(), StorageError> {
        self.require("role", "roles", &assignment.role_id).await?;
        self.require_scope(assignment.resource_id.as_deref()).await?;
        queries::upsert_user_role(&self.pool, assignment).await
    }

    async fn revoke_user_role(
        &self,
        user_id: &str,
        role_id: &str,
        resource_id: Option<&str>,
    ) -> Result<bool, StorageError> {
        queries::delete_assignment(&self.pool, "user_roles", "user_id", user_id, role_id, resource_id)
            .await
    }

    async fn assign_group_role(&self, assignment: &GroupRole) -> Result<(), StorageError> {
        self.require("group", "user_groups", &assignment.group_id)
            .await?;
        self.require("role", "roles", &assignment.role_id).await?;
        self.require_scope(assignment.resource_id.as_deref()).await?;
        queries::upsert_group_role(&self.pool, assignment).await
    }

    async fn revoke_group_role(
        &self,
        group_id: &str,
        role_id: &str,
        resource_id: Option<&str>,
    ) -> Result<bool, StorageError> {
        queries::delete_assignment(&self.pool, "group_roles", "group_id", group_id, role_id, resource_id)
            .await
    }

    async fn add_group_member(&self, membership: &UserGroupMembership) -> Result<(), StorageError> {
        self.require("group", "user_groups", &membership.group_id)
            .await?;
        queries::upsert_membership(&self.pool, membership).await
    }

    async fn remove_group_member(&self, user_id: &str, group_id: &str) -> Result<bool, StorageError> {
        queries::delete_membership(&self.pool, user_id, group_id).await
    }
}
