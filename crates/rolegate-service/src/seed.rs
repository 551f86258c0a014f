//! TOML fixtures describing a complete entity graph.
//!
//! Timestamps are RFC 3339 strings (`expires_at = "2030-01-01T00:00:00Z"`).

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use rolegate_core::model::{
    Effect, GroupRole, Permission, Resource, Role, UserGroup, UserGroupMembership, UserRole,
};
use rolegate_storage::{EntityStore, StorageError};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeedFile {
    pub roles: Vec<SeedRole>,
    pub permissions: Vec<SeedPermission>,
    pub resources: Vec<SeedResource>,
    pub groups: Vec<SeedGroup>,
    pub bindings: Vec<SeedBinding>,
    pub user_roles: Vec<SeedUserRole>,
    pub group_roles: Vec<SeedGroupRole>,
    pub memberships: Vec<SeedMembership>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedRole {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub level: i32,
    pub parent: Option<String>,
    #[serde(default)]
    pub system: bool,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedPermission {
    pub id: String,
    pub resource_type: String,
    pub action: String,
    pub effect: Effect,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedResource {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub identifier: Option<String>,
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedGroup {
    pub id: String,
    pub name: Option<String>,
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedBinding {
    pub role: String,
    pub permission: String,
    #[serde(rename = "override")]
    pub effect_override: Option<Effect>,
    pub conditions: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedUserRole {
    pub user: String,
    pub role: String,
    pub resource: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedGroupRole {
    pub group: String,
    pub role: String,
    pub resource: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedMembership {
    pub user: String,
    pub group: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read seed file '{0}': {1}")]
    ReadFile(String, String),

    #[error("failed to parse seed file: {0}")]
    Parse(String),

    #[error("failed to apply seed: {0}")]
    Storage(#[from] StorageError),
}

impl SeedFile {
    pub fn parse(contents: &str) -> Result<Self, SeedError> {
        toml::from_str(contents).map_err(|e| SeedError::Parse(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, SeedError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SeedError::ReadFile(path.display().to_string(), e.to_string()))?;
        Self::parse(&contents)
    }

    /// Writes entities before the assignments that reference them.
    pub async fn apply<S: EntityStore>(&self, store: &S) -> Result<(), SeedError> {
        for seed in &self.roles {
            store
                .upsert_role(&Role {
                    id: seed.id.clone(),
                    name: seed.name.clone().unwrap_or_else(|| seed.id.clone()),
                    level: seed.level,
                    parent_role_id: seed.parent.clone(),
                    is_system: seed.system,
                    is_active: seed.active,
                })
                .await?;
        }
        for seed in &self.permissions {
            store
                .upsert_permission(&Permission::new(
                    &seed.id,
                    &seed.resource_type,
                    &seed.action,
                    seed.effect,
                ))
                .await?;
        }
        for seed in &self.resources {
            store
                .upsert_resource(&Resource {
                    id: seed.id.clone(),
                    resource_type: seed.resource_type.clone(),
                    identifier: seed.identifier.clone().unwrap_or_else(|| seed.id.clone()),
                    parent_resource_id: seed.parent.clone(),
                })
                .await?;
        }
        for seed in &self.groups {
            store
                .upsert_group(&UserGroup {
                    id: seed.id.clone(),
                    name: seed.name.clone().unwrap_or_else(|| seed.id.clone()),
                    parent_group_id: seed.parent.clone(),
                })
                .await?;
        }
        for seed in &self.bindings {
            store
                .bind_permission(
                    &seed.role,
                    &seed.permission,
                    seed.effect_override,
                    seed.conditions.clone(),
                )
                .await?;
        }
        for seed in &self.user_roles {
            store
                .assign_user_role(&UserRole {
                    user_id: seed.user.clone(),
                    role_id: seed.role.clone(),
                    resource_id: seed.resource.clone(),
                    expires_at: seed.expires_at,
                    is_active: seed.active,
                })
                .await?;
        }
        for seed in &self.group_roles {
            store
                .assign_group_role(&GroupRole {
                    group_id: seed.group.clone(),
                    role_id: seed.role.clone(),
                    resource_id: seed.resource.clone(),
                    expires_at: seed.expires_at,
                    is_active: seed.active,
                })
                .await?;
        }
        for seed in &self.memberships {
            let mut membership = UserGroupMembership::new(&seed.user, &seed.group);
            membership.is_active = seed.active;
            store.add_group_member(&membership).await?;
        }

        tracing::info!(
            roles = self.roles.len(),
            resources = self.resources.len(),
            user_roles = self.user_roles.len(),
            group_roles = self.group_roles.len(),
            "seed applied"
        );
        Ok(())
    }
}
