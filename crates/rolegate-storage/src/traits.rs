use std::future::Future;

use rolegate_core::model::{
    Effect, GroupRole, Permission, Resource, Role, RolePermission, UserGroup, UserGroupMembership,
    UserRole,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid {entity} record: {reason}")]
    InvalidRecord { entity: &'static str, reason: String },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("internal storage error: {0}")]
    Internal(String),
}

impl StorageError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StorageError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Persistent home of roles, permissions, resources, groups and their assignments.
///
/// The `effective_*` reads return only assignments that are active, unexpired and reference an
/// active role. Unknown ids yield empty results rather than `NotFound`; writes that reference a
/// missing entity fail with `NotFound`.
pub trait EntityStore: Send + Sync {
    fn effective_user_roles(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<UserRole>, StorageError>> + Send;

    fn active_groups_for_user(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<UserGroup>, StorageError>> + Send;

    fn effective_group_roles(
        &self,
        group_id: &str,
    ) -> impl Future<Output = Result<Vec<GroupRole>, StorageError>> + Send;

    fn role_permissions(
        &self,
        role_id: &str,
    ) -> impl Future<Output = Result<Vec<RolePermission>, StorageError>> + Send;

    fn resource_parent(
        &self,
        resource_id: &str,
    ) -> impl Future<Output = Result<Option<String>, StorageError>> + Send;

    fn role_parent(
        &self,
        role_id: &str,
    ) -> impl Future<Output = Result<Option<String>, StorageError>> + Send;

    fn group_parent(
        &self,
        group_id: &str,
    ) -> impl Future<Output = Result<Option<String>, StorageError>> + Send;

    /// User ids with an active membership in the group.
    fn group_members(
        &self,
        group_id: &str,
    ) -> impl Future<Output = Result<Vec<String>, StorageError>> + Send;

    fn upsert_role(&self, role: &Role) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn upsert_permission(
        &self,
        permission: &Permission,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn upsert_resource(
        &self,
        resource: &Resource,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn upsert_group(&self, group: &UserGroup)
    -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Binding the same pair twice replaces the override and conditions.
    fn bind_permission(
        &self,
        role_id: &str,
        permission_id: &str,
        effect_override: Option<Effect>,
        conditions: Option<serde_json::Value>,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Upserts on `(user_id, role_id, resource_id)`.
    fn assign_user_role(
        &self,
        assignment: &UserRole,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Returns whether an assignment was removed.
    fn revoke_user_role(
        &self,
        user_id: &str,
        role_id: &str,
        resource_id: Option<&str>,
    ) -> impl Future<Output = Result<bool, StorageError>> + Send;

    /// Upserts on `(group_id, role_id, resource_id)`.
    fn assign_group_role(
        &self,
        assignment: &GroupRole,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn revoke_group_role(
        &self,
        group_id: &str,
        role_id: &str,
        resource_id: Option<&str>,
    ) -> impl Future<Output = Result<bool, StorageError>> + Send;

    fn add_group_member(
        &self,
        membership: &UserGroupMembership,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn remove_group_member(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> impl Future<Output = Result<bool, StorageError>> + Send;
}
