use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "allow",
            Effect::Deny => "deny",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid effect '{0}': expected 'allow' or 'deny'")]
pub struct InvalidEffect(pub String);

impl FromStr for Effect {
    type Err = InvalidEffect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Effect::Allow),
            "deny" => Ok(Effect::Deny),
            _ => Err(InvalidEffect(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub level: i32,
    #[serde(default)]
    pub parent_role_id: Option<String>,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Role {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            level: 0,
            parent_role_id: None,
            is_system: false,
            is_active: true,
        }
    }

    pub fn with_parent(mut self, parent_role_id: impl Into<String>) -> Self {
        self.parent_role_id = Some(parent_role_id.into());
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    pub resource_type: String,
    pub action: String,
    pub effect: Effect,
}

impl Permission {
    pub fn new(
        id: impl Into<String>,
        resource_type: impl Into<String>,
        action: impl Into<String>,
        effect: Effect,
    ) -> Self {
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            action: action.into(),
            effect,
        }
    }

    pub fn allow(
        id: impl Into<String>,
        resource_type: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self::new(id, resource_type, action, Effect::Allow)
    }

    pub fn deny(
        id: impl Into<String>,
        resource_type: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self::new(id, resource_type, action, Effect::Deny)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub identifier: String,
    #[serde(default)]
    pub parent_resource_id: Option<String>,
}

impl Resource {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            identifier: id.clone(),
            id,
            resource_type: resource_type.into(),
            parent_resource_id: None,
        }
    }

    pub fn with_parent(mut self, parent_resource_id: impl Into<String>) -> Self {
        self.parent_resource_id = Some(parent_resource_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_group_id: Option<String>,
}

impl UserGroup {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_group_id: None,
        }
    }

    pub fn with_parent(mut self, parent_group_id: impl Into<String>) -> Self {
        self.parent_group_id = Some(parent_group_id.into());
        self
    }
}

/// A permission bound to a role, joined with the permission it references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolePermission {
    pub role_id: String,
    pub permission: Permission,
    #[serde(default)]
    pub effect_override: Option<Effect>,
    #[serde(default)]
    pub conditions: Option<serde_json::Value>,
}

impl RolePermission {
    pub fn new(role_id: impl Into<String>, permission: Permission) -> Self {
        Self {
            role_id: role_id.into(),
            permission,
            effect_override: None,
            conditions: None,
        }
    }

    pub fn with_override(mut self, effect: Effect) -> Self {
        self.effect_override = Some(effect);
        self
    }

    pub fn effective_effect(&self) -> Effect {
        self.effect_override.unwrap_or(self.permission.effect)
    }

    pub fn applies_to(&self, resource_type: &str, action: &str) -> bool {
        self.permission.resource_type == resource_type && self.permission.action == action
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole {
    pub user_id: String,
    pub role_id: String,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl UserRole {
    pub fn global(user_id: impl Into<String>, role_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role_id: role_id.into(),
            resource_id: None,
            expires_at: None,
            is_active: true,
        }
    }

    pub fn scoped(
        user_id: impl Into<String>,
        role_id: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            resource_id: Some(resource_id.into()),
            ..Self::global(user_id, role_id)
        }
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        is_effective(self.is_active, self.expires_at, now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRole {
    pub group_id: String,
    pub role_id: String,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl GroupRole {
    pub fn global(group_id: impl Into<String>, role_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            role_id: role_id.into(),
            resource_id: None,
            expires_at: None,
            is_active: true,
        }
    }

    pub fn scoped(
        group_id: impl Into<String>,
        role_id: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            resource_id: Some(resource_id.into()),
            ..Self::global(group_id, role_id)
        }
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        is_effective(self.is_active, self.expires_at, now)
    }
}

fn is_effective(is_active: bool, expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    is_active && expires_at.is_none_or(|at| at > now)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGroupMembership {
    pub user_id: String,
    pub group_id: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl UserGroupMembership {
    pub fn new(user_id: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            group_id: group_id.into(),
            is_active: true,
        }
    }
}

/// How a subject came to hold a role.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GrantSource {
    Direct,
    Group { group_id: String },
}

impl fmt::Display for GrantSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrantSource::Direct => f.write_str("direct"),
            GrantSource::Group { group_id } => write!(f, "group:{group_id}"),
        }
    }
}

/// An effective role assignment, regardless of whether it came from a user or a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoleGrant {
    pub role_id: String,
    pub resource_id: Option<String>,
    pub via: GrantSource,
}

impl From<&UserRole> for RoleGrant {
    fn from(assignment: &UserRole) -> Self {
        Self {
            role_id: assignment.role_id.clone(),
            resource_id: assignment.resource_id.clone(),
            via: GrantSource::Direct,
        }
    }
}

impl From<&GroupRole> for RoleGrant {
    fn from(assignment: &GroupRole) -> Self {
        Self {
            role_id: assignment.role_id.clone(),
            resource_id: assignment.resource_id.clone(),
            via: GrantSource::Group {
                group_id: assignment.group_id.clone(),
            },
        }
    }
}

/// The resource a request targets. `Any` only ever matches global grants.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceTarget {
    Any,
    Resource(String),
}

impl ResourceTarget {
    pub fn resource_id(&self) -> Option<&str> {
        match self {
            ResourceTarget::Any => None,
            ResourceTarget::Resource(id) => Some(id),
        }
    }
}

impl From<Option<String>> for ResourceTarget {
    fn from(resource_id: Option<String>) -> Self {
        resource_id.map_or(ResourceTarget::Any, ResourceTarget::Resource)
    }
}

impl fmt::Display for ResourceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceTarget::Any => f.write_str("*"),
            ResourceTarget::Resource(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CheckRequest {
    pub user_id: String,
    pub resource_type: String,
    pub resource: ResourceTarget,
    pub action: String,
}

impl CheckRequest {
    pub fn new(
        user_id: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            resource_type: resource_type.into(),
            resource: ResourceTarget::Resource(resource_id.into()),
            action: action.into(),
        }
    }

    pub fn wildcard(
        user_id: impl Into<String>,
        resource_type: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            resource_type: resource_type.into(),
            resource: ResourceTarget::Any,
            action: action.into(),
        }
    }

    /// `{resource_type}:{resource_id or *}:{action}`
    pub fn permission_key(&self) -> String {
        format!("{}:{}:{}", self.resource_type, self.resource, self.action)
    }
}

impl fmt::Display for CheckRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user_id, self.permission_key())
    }
}

/// One applicable binding with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PermissionDecision {
    pub effect: Effect,
    pub source_role_id: String,
    pub source_permission_id: String,
    pub via: GrantSource,
    pub scope: Option<String>,
}

impl fmt::Display for PermissionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} via role '{}' permission '{}' ({}, scope {})",
            self.effect,
            self.source_role_id,
            self.source_permission_id,
            self.via,
            self.scope.as_deref().unwrap_or("*"),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "decision", rename_all = "snake_case")]
pub enum DecisionReason {
    NoApplicableGrant,
    ExplicitDeny(PermissionDecision),
    Granted(PermissionDecision),
    Undetermined(String),
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionReason::NoApplicableGrant => f.write_str("no applicable grant"),
            DecisionReason::ExplicitDeny(d) => write!(f, "explicit deny: {d}"),
            DecisionReason::Granted(d) => write!(f, "granted: {d}"),
            DecisionReason::Undetermined(msg) => write!(f, "undetermined: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDecision {
    pub effect: Effect,
    pub reason: DecisionReason,
}

impl ResolvedDecision {
    pub fn is_allowed(&self) -> bool {
        self.effect == Effect::Allow
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub allowed: bool,
    pub decision: ResolvedDecision,
    pub cache_hit: bool,
}

/// A role the subject does not hold but sits above a held role. Never used for decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritedRole {
    pub role_id: String,
    pub below_role_id: String,
    pub distance: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionMatrix {
    pub user_id: String,
    pub direct_roles: Vec<UserRole>,
    pub inherited_roles: Vec<InheritedRole>,
    pub group_roles: Vec<GroupRole>,
    pub final_permissions: BTreeMap<String, ResolvedDecision>,
}

impl PermissionMatrix {
    pub fn is_allowed(&self, key: &str) -> bool {
        self.final_permissions
            .get(key)
            .is_some_and(ResolvedDecision::is_allowed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermission {
    pub resource_type: String,
    pub resource: ResourceTarget,
    pub action: String,
    pub decision: ResolvedDecision,
}
