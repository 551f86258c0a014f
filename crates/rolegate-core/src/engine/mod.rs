mod aggregate;
mod conflict;
mod hierarchy;
mod resolver;
mod scope;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregate::{GrantSet, PermissionAggregator};
pub use conflict::resolve;
pub use hierarchy::{HierarchyKind, HierarchyResolver};
pub use resolver::{CancelHandle, CancelSignal, PermissionResolver, ResolveOptions, cancellation};
pub use scope::ScopeMatcher;

use std::future::Future;
use std::time::Duration;

use crate::model::{
    DecisionReason, Effect, GroupRole, ResolvedDecision, RolePermission, UserGroup, UserRole,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("cycle detected in {kind} hierarchy at '{node_id}'")]
    CycleDetected {
        kind: HierarchyKind,
        node_id: String,
    },

    #[error("{kind} hierarchy exceeds max depth {depth}")]
    MaxDepthExceeded { kind: HierarchyKind, depth: usize },

    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    #[error("entity store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("permission cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl ResolveError {
    /// Transient collaborator failures. The caller may retry these; everything else is a data
    /// defect.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            ResolveError::StoreUnavailable(_)
                | ResolveError::Timeout(_)
                | ResolveError::CacheUnavailable(_)
                | ResolveError::Cancelled
        )
    }

    /// The decision a caller applies when resolution failed.
    pub fn fail_closed_decision(&self) -> ResolvedDecision {
        ResolvedDecision {
            effect: Effect::Deny,
            reason: DecisionReason::Undetermined(self.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_hierarchy_depth: usize,
    pub default_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_hierarchy_depth: 32,
            default_timeout: Duration::from_secs(2),
        }
    }
}

/// Read-only view of the entity store used during resolution.
///
/// `effective_*` operations return only active, unexpired assignments. Unknown ids are not
/// errors: they yield empty collections or `None`.
pub trait EntityReader: Send + Sync {
    fn effective_user_roles(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<UserRole>, ResolveError>> + Send;

    fn active_groups_for_user(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<UserGroup>, ResolveError>> + Send;

    fn effective_group_roles(
        &self,
        group_id: &str,
    ) -> impl Future<Output = Result<Vec<GroupRole>, ResolveError>> + Send;

    fn role_permissions(
        &self,
        role_id: &str,
    ) -> impl Future<Output = Result<Vec<RolePermission>, ResolveError>> + Send;

    fn resource_parent(
        &self,
        resource_id: &str,
    ) -> impl Future<Output = Result<Option<String>, ResolveError>> + Send;

    fn role_parent(
        &self,
        role_id: &str,
    ) -> impl Future<Output = Result<Option<String>, ResolveError>> + Send;

    fn group_parent(
        &self,
        group_id: &str,
    ) -> impl Future<Output = Result<Option<String>, ResolveError>> + Send;
}
