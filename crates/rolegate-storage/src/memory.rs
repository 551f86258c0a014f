use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use rolegate_core::model::{
    Effect, GroupRole, Permission, Resource, Role, RolePermission, UserGroup, UserGroupMembership,
    UserRole,
};

use crate::traits::{EntityStore, StorageError};

#[derive(Debug, Clone)]
struct StoredBinding {
    role_id: String,
    permission_id: String,
    effect_override: Option<Effect>,
    conditions: Option<serde_json::Value>,
}

#[derive(Debug, Default)]
struct InnerState {
    roles: HashMap<String, Role>,
    permissions: HashMap<String, Permission>,
    resources: HashMap<String, Resource>,
    groups: HashMap<String, UserGroup>,
    bindings: Vec<StoredBinding>,
    user_roles: Vec<UserRole>,
    group_roles: Vec<GroupRole>,
    memberships: Vec<UserGroupMembership>,
}

impl InnerState {
    fn role_is_active(&self, role_id: &str) -> bool {
        self.roles.get(role_id).is_some_and(|role| role.is_active)
    }

    fn require_role(&self, role_id: &str) -> Result<(), StorageError> {
        if self.roles.contains_key(role_id) {
            Ok(())
        } else {
            Err(StorageError::not_found("role", role_id))
        }
    }

    fn require_scope(&self, resource_id: Option<&str>) -> Result<(), StorageError> {
        match resource_id {
            Some(id) if !self.resources.contains_key(id) => {
                Err(StorageError::not_found("resource", id))
            }
            _ => Ok(()),
        }
    }

    fn require_group(&self, group_id: &str) -> Result<(), StorageError> {
        if self.groups.contains_key(group_id) {
            Ok(())
        } else {
            Err(StorageError::not_found("group", group_id))
        }
    }
}

/// Process-local store. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<InnerState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntityStore for InMemoryStore {
    async fn effective_user_roles(&self, user_id: &str) -> Result<Vec<UserRole>, StorageError> {
        let state = self.state.read();
        let now = Utc::now();

        Ok(state
            .user_roles
            .iter()
            .filter(|ur| {
                ur.user_id == user_id && ur.is_effective_at(now) && state.role_is_active(&ur.role_id)
            })
            .cloned()
            .collect())
    }

    async fn active_groups_for_user(&self, user_id: &str) -> Result<Vec<UserGroup>, StorageError> {
        let state = self.state.read();

        let mut groups: Vec<UserGroup> = state
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id && m.is_active)
            .filter_map(|m| state.groups.get(&m.group_id).cloned())
            .collect();
        groups.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(groups)
    }

    async fn effective_group_roles(&self, group_id: &str) -> Result<Vec<GroupRole>, StorageError> {
        let state = self.state.read();
        let now = Utc::now();

        Ok(state
            .group_roles
            .iter()
            .filter(|gr| {
                gr.group_id == group_id
                    && gr.is_effective_at(now)
                    && state.role_is_active(&gr.role_id)
            })
            .cloned()
            .collect())
    }

    async fn role_permissions(&self, role_id: &str) -> Result<Vec<RolePermission>, StorageError> {
        let state = self.state.read();

        state
            .bindings
            .iter()
            .filter(|b| b.role_id == role_id)
            .map(|b| {
                let permission = state.permissions.get(&b.permission_id).ok_or_else(|| {
                    StorageError::InvalidRecord {
                        entity: "role_permission",
                        reason: format!("permission '{}' is missing", b.permission_id),
                    }
                })?;
                Ok(RolePermission {
                    role_id: b.role_id.clone(),
                    permission: permission.clone(),
                    effect_override: b.effect_override,
                    conditions: b.conditions.clone(),
                })
            })
            .collect()
    }

    async fn resource_parent(&self, resource_id: &str) -> Result<Option<String>, StorageError> {
        let state = self.state.read();
        Ok(state
            .resources
            .get(resource_id)
            .and_then(|r| r.parent_resource_id.clone()))
    }

    async fn role_parent(&self, role_id: &str) -> Result<Option<String>, StorageError> {
        let state = self.state.read();
        Ok(state
            .roles
            .get(role_id)
            .and_then(|r| r.parent_role_id.clone()))
    }

    async fn group_parent(&self, group_id: &str) -> Result<Option<String>, StorageError> {
        let state = self.state.read();
        Ok(state
            .groups
            .get(group_id)
            .and_then(|g| g.parent_group_id.clone()))
    }

    async fn group_members(&self, group_id: &str) -> Result<Vec<String>, StorageError> {
        let state = self.state.read();

        let mut members: Vec<String> = state
            .memberships
            .iter()
            .filter(|m| m.group_id == group_id && m.is_active)
            .map(|m| m.user_id.clone())
            .collect();
        members.sort();
        members.dedup();
        Ok(members)
    }

    async fn upsert_role(&self, role: &Role) -> Result<(), StorageError> {
        let mut state = self.state.write();
        state.roles.insert(role.id.clone(), role.clone());
        Ok(())
    }

    async fn upsert_permission(&self, permission: &Permission) -> Result<(), StorageError> {
        let mut state = self.state.write();
        state
            .permissions
            .insert(permission.id.clone(), permission.clone());
        Ok(())
    }

    async fn upsert_resource(&self, resource: &Resource) -> Result<(), StorageError> {
        let mut state = self.state.write();
        state.resources.insert(resource.id.clone(), resource.clone());
        Ok(())
    }

    async fn upsert_group(&self, group: &UserGroup) -> Result<(), StorageError> {
        let mut state = self.state.write();
        state.groups.insert(group.id.clone(), group.clone());
        Ok(())
    }

    async fn bind_permission(
        &self,
        role_id: &str,
        permission_id: &str,
        effect_override: Option<Effect>,
        conditions: Option<serde_json::Value>,
    ) -> Result<(), StorageError> {
        let mut state = self.state.write();
        state.require_role(role_id)?;
        if !state.permissions.contains_key(permission_id) {
            return Err(StorageError::not_found("permission", permission_id));
        }

        let binding = StoredBinding {
            role_id: role_id.to_string(),
            permission_id: permission_id.to_string(),
            effect_override,
            conditions,
        };
        match state
            .bindings
            .iter_mut()
            .find(|b| b.role_id == role_id && b.permission_id == permission_id)
        {
            Some(existing) => *existing = binding,
            None => state.bindings.push(binding),
        }
        Ok(())
    }

    async fn assign_user_role(&self, assignment: &UserRole) -> Result<(), StorageError> {
        let mut state = self.state.write();
        state.require_role(&assignment.role_id)?;
        state.require_scope(assignment.resource_id.as_deref())?;

        match state.user_roles.iter_mut().find(|ur| {
            ur.user_id == assignment.user_id
                && ur.role_id == assignment.role_id
                && ur.resource_id == assignment.resource_id
        }) {
            Some(existing) => *existing = assignment.clone(),
            None => state.user_roles.push(assignment.clone()),
        }
        Ok(())
    }

    async fn revoke_user_role(
        &self,
        user_id: &str,
        role_id: &str,
        resource_id: Option<&str>,
    ) -> Result<bool, StorageError> {
        let mut state = self.state.write();
        let before = state.user_roles.len();
        state.user_roles.retain(|ur| {
            !(ur.user_id == user_id
                && ur.role_id == role_id
                && ur.resource_id.as_deref() == resource_id)
        });
        Ok(state.user_roles.len() != before)
    }

    async fn assign_group_role(&self, assignment: &GroupRole) -> Result<(), StorageError> {
        let mut state = self.state.write();
        state.require_group(&assignment.group_id)?;
        state.require_role(&assignment.role_id)?;
        state.require_scope(assignment.resource_id.as_deref())?;

        match state.group_roles.iter_mut().find(|gr| {
            gr.group_id == assignment.group_id
                && gr.role_id == assignment.role_id
                && gr.resource_id == assignment.resource_id
        }) {
            Some(existing) => *existing = assignment.clone(),
            None => state.group_roles.push(assignment.clone()),
        }
        Ok(())
    }

    async fn revoke_group_role(
        &self,
        group_id: &str,
        role_id: &str,
        resource_id: Option<&str>,
    ) -> Result<bool, StorageError> {
        let mut state = self.state.write();
        let before = state.group_roles.len();
        state.group_roles.retain(|gr| {
            !(gr.group_id == group_id
                && gr.role_id == role_id
                && gr.resource_id.as_deref() == resource_id)
        });
        Ok(state.group_roles.len() != before)
    }

    async fn add_group_member(&self, membership: &UserGroupMembership) -> Result<(), StorageError> {
        let mut state = self.state.write();
        state.require_group(&membership.group_id)?;

        match state
            .memberships
            .iter_mut()
            .find(|m| m.user_id == membership.user_id && m.group_id == membership.group_id)
        {
            Some(existing) => *existing = membership.clone(),
            None => state.memberships.push(membership.clone()),
        }
        Ok(())
    }

    async fn remove_group_member(&self, user_id: &str, group_id: &str) -> Result<bool, StorageError> {
        let mut state = self.state.write();
        let before = state.memberships.len();
        state
            .memberships
            .retain(|m| !(m.user_id == user_id && m.group_id == group_id));
        Ok(state.memberships.len() != before)
    }
}
