use std::sync::Arc;

use rolegate_core::cache::PermissionCache;
use rolegate_core::engine::{EngineConfig, PermissionResolver, ResolveOptions};
use rolegate_core::model::{
    CheckRequest, CheckResult, EffectivePermission, GroupRole, PermissionMatrix,
    UserGroupMembership, UserRole,
};
use rolegate_storage::EntityStore;

use crate::adapter::StoreEntityReader;
use crate::audit::{self, AssignmentChange};
use crate::error::ApiError;
use crate::metrics::Metrics;

/// Resolution plus the assignment mutations that must invalidate it.
///
/// Every mutation invalidates each affected user before it returns, so a check issued after
/// a mutation completes never observes a decision cached before it.
pub struct AuthzService<S: EntityStore, C: PermissionCache> {
    store: Arc<S>,
    resolver: PermissionResolver<StoreEntityReader<S>, C>,
    metrics: Option<Arc<Metrics>>,
}

impl<S: EntityStore, C: PermissionCache> AuthzService<S, C> {
    pub fn new(store: Arc<S>, cache: Arc<C>, engine_config: EngineConfig) -> Self {
        let reader = Arc::new(StoreEntityReader::new(Arc::clone(&store)));
        Self {
            store,
            resolver: PermissionResolver::new(reader, cache, engine_config),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn resolver(&self) -> &PermissionResolver<StoreEntityReader<S>, C> {
        &self.resolver
    }

    pub async fn check_permission(
        &self,
        request: &CheckRequest,
        options: &ResolveOptions,
    ) -> Result<CheckResult, ApiError> {
        match self.resolver.check_permission(request, options).await {
            Ok(result) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_check(&result);
                }
                Ok(result)
            }
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_check_failure();
                }
                tracing::warn!(request = %request, error = %e, "permission check failed closed");
                Err(e.into())
            }
        }
    }

    /// Never errors: any failure is reported as a denial carrying the cause.
    pub async fn authorize(&self, request: &CheckRequest, options: &ResolveOptions) -> CheckResult {
        match self.resolver.check_permission(request, options).await {
            Ok(result) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_check(&result);
                }
                result
            }
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_check_failure();
                }
                tracing::warn!(request = %request, error = %e, "permission check failed closed");
                CheckResult {
                    allowed: false,
                    decision: e.fail_closed_decision(),
                    cache_hit: false,
                }
            }
        }
    }

    pub async fn permission_matrix(
        &self,
        user_id: &str,
        options: &ResolveOptions,
    ) -> Result<PermissionMatrix, ApiError> {
        let matrix = self
            .resolver
            .compute_user_permission_matrix(user_id, options)
            .await?;
        if let Some(metrics) = &self.metrics {
            metrics.record_matrix();
        }
        Ok(matrix)
    }

    pub async fn effective_permissions(
        &self,
        user_id: &str,
        options: &ResolveOptions,
    ) -> Result<Vec<EffectivePermission>, ApiError> {
        Ok(self
            .resolver
            .get_user_effective_permissions(user_id, options)
            .await?)
    }

    pub async fn assign_user_role(
        &self,
        assignment: &UserRole,
        options: &ResolveOptions,
    ) -> Result<(), ApiError> {
        self.store.assign_user_role(assignment).await?;
        audit::audit_user_role_change(
            AssignmentChange::Assigned,
            &assignment.user_id,
            &assignment.role_id,
            assignment.resource_id.as_deref(),
        );
        self.invalidate(&assignment.user_id, "user_role_assigned", options)
            .await
    }

    /// Returns whether an assignment existed.
    pub async fn revoke_user_role(
        &self,
        user_id: &str,
        role_id: &str,
        resource_id: Option<&str>,
        options: &ResolveOptions,
    ) -> Result<bool, ApiError> {
        let removed = self
            .store
            .revoke_user_role(user_id, role_id, resource_id)
            .await?;
        if removed {
            audit::audit_user_role_change(AssignmentChange::Revoked, user_id, role_id, resource_id);
            self.invalidate(user_id, "user_role_revoked", options)
                .await?;
        }
        Ok(removed)
    }

    /// Returns the number of members whose decisions were invalidated.
    pub async fn assign_group_role(
        &self,
        assignment: &GroupRole,
        options: &ResolveOptions,
    ) -> Result<usize, ApiError> {
        self.store.assign_group_role(assignment).await?;
        let affected = self
            .invalidate_members(&assignment.group_id, "group_role_assigned", options)
            .await?;
        audit::audit_group_role_change(
            AssignmentChange::Assigned,
            &assignment.group_id,
            &assignment.role_id,
            assignment.resource_id.as_deref(),
            affected,
        );
        Ok(affected)
    }

    /// Returns whether an assignment existed.
    pub async fn revoke_group_role(
        &self,
        group_id: &str,
        role_id: &str,
        resource_id: Option<&str>,
        options: &ResolveOptions,
    ) -> Result<bool, ApiError> {
        let removed = self
            .store
            .revoke_group_role(group_id, role_id, resource_id)
            .await?;
        if removed {
            let affected = self
                .invalidate_members(group_id, "group_role_revoked", options)
                .await?;
            audit::audit_group_role_change(
                AssignmentChange::Revoked,
                group_id,
                role_id,
                resource_id,
                affected,
            );
        }
        Ok(removed)
    }

    pub async fn add_group_member(
        &self,
        membership: &UserGroupMembership,
        options: &ResolveOptions,
    ) -> Result<(), ApiError> {
        self.store.add_group_member(membership).await?;
        audit::audit_membership_change(
            AssignmentChange::Assigned,
            &membership.user_id,
            &membership.group_id,
        );
        self.invalidate(&membership.user_id, "group_member_added", options)
            .await
    }

    /// Returns whether the membership existed.
    pub async fn remove_group_member(
        &self,
        user_id: &str,
        group_id: &str,
        options: &ResolveOptions,
    ) -> Result<bool, ApiError> {
        let removed = self.store.remove_group_member(user_id, group_id).await?;
        if removed {
            audit::audit_membership_change(AssignmentChange::Revoked, user_id, group_id);
            self.invalidate(user_id, "group_member_removed", options)
                .await?;
        }
        Ok(removed)
    }

    /// Drops every cached decision for the user.
    pub async fn invalidate_user(
        &self,
        user_id: &str,
        options: &ResolveOptions,
    ) -> Result<(), ApiError> {
        self.invalidate(user_id, "manual", options).await
    }

    /// The store write has already landed when this runs. On `Err` the mutation is durable but
    /// the user's cached decisions may be stale until the caller retries the invalidation.
    async fn invalidate(
        &self,
        user_id: &str,
        trigger: &str,
        options: &ResolveOptions,
    ) -> Result<(), ApiError> {
        self.resolver.invalidate_user(user_id, options).await?;
        if let Some(metrics) = &self.metrics {
            metrics.record_invalidation();
        }
        audit::audit_invalidation(user_id, trigger);
        Ok(())
    }

    async fn invalidate_members(
        &self,
        group_id: &str,
        trigger: &str,
        options: &ResolveOptions,
    ) -> Result<usize, ApiError> {
        let members = self.store.group_members(group_id).await?;
        for user_id in &members {
            self.invalidate(user_id, trigger, options).await?;
        }
        Ok(members.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolegate_core::cache::{CacheConfig, InMemoryPermissionCache};
    use std::time::Duration;

    use rolegate_core::engine::{ResolveError, cancellation};
    use rolegate_core::model::{
        DecisionReason, Effect, Permission, Resource, ResolvedDecision, Role, UserGroup,
    };
    use rolegate_storage::InMemoryStore;

    use crate::audit::tests::{audit_events, capture_events, has_field};

    type TestService = AuthzService<InMemoryStore, InMemoryPermissionCache>;

    async fn make_service() -> (TestService, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new());
        let service = AuthzService::new(
            seeded_store().await,
            Arc::new(InMemoryPermissionCache::new(CacheConfig::default())),
            EngineConfig::default(),
        )
        .with_metrics(Arc::clone(&metrics));
        (service, metrics)
    }

    async fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.upsert_role(&Role::new("editor", "Editor")).await.unwrap();
        store
            .upsert_permission(&Permission::allow("doc-edit", "document", "edit"))
            .await
            .unwrap();
        store
            .bind_permission("editor", "doc-edit", None, None)
            .await
            .unwrap();
        store
            .upsert_resource(&Resource::new("org", "organization"))
            .await
            .unwrap();
        store
            .upsert_resource(&Resource::new("d1", "document").with_parent("org"))
            .await
            .unwrap();
        store
            .upsert_group(&UserGroup::new("eng", "Engineering"))
            .await
            .unwrap();
        store
    }

    fn opts() -> ResolveOptions {
        ResolveOptions::default()
    }

    fn edit_d1(user: &str) -> CheckRequest {
        CheckRequest::new(user, "document", "d1", "edit")
    }

    async fn allowed(service: &TestService, user: &str) -> bool {
        service
            .check_permission(&edit_d1(user), &ResolveOptions::default())
            .await
            .unwrap()
            .allowed
    }

    #[tokio::test]
    async fn assignment_is_visible_to_next_check() {
        let (service, _) = make_service().await;
        assert!(!allowed(&service, "alice").await);

        service
            .assign_user_role(&UserRole::scoped("alice", "editor", "org"), &opts())
            .await
            .unwrap();

        assert!(allowed(&service, "alice").await);
    }

    #[tokio::test]
    async fn revocation_is_visible_to_next_check() {
        let (service, _) = make_service().await;
        service
            .assign_user_role(&UserRole::global("alice", "editor"), &opts())
            .await
            .unwrap();
        assert!(allowed(&service, "alice").await);
        assert!(
            service
                .check_permission(&edit_d1("alice"), &ResolveOptions::default())
                .await
                .unwrap()
                .cache_hit
        );

        let removed = service
            .revoke_user_role("alice", "editor", None, &opts())
            .await
            .unwrap();

        assert!(removed);
        assert!(!allowed(&service, "alice").await);
    }

    #[tokio::test]
    async fn group_role_change_fans_out_to_members() {
        let (service, _) = make_service().await;
        service
            .add_group_member(&UserGroupMembership::new("alice", "eng"), &opts())
            .await
            .unwrap();
        service
            .add_group_member(&UserGroupMembership::new("bob", "eng"), &opts())
            .await
            .unwrap();
        assert!(!allowed(&service, "alice").await);
        assert!(!allowed(&service, "bob").await);

        let affected = service
            .assign_group_role(&GroupRole::global("eng", "editor"), &opts())
            .await
            .unwrap();

        assert_eq!(affected, 2);
        assert!(allowed(&service, "alice").await);
        assert!(allowed(&service, "bob").await);

        service
            .revoke_group_role("eng", "editor", None, &opts())
            .await
            .unwrap();
        assert!(!allowed(&service, "alice").await);
    }

    #[tokio::test]
    async fn leaving_a_group_drops_its_grants() {
        let (service, _) = make_service().await;
        service
            .assign_group_role(&GroupRole::global("eng", "editor"), &opts())
            .await
            .unwrap();
        service
            .add_group_member(&UserGroupMembership::new("alice", "eng"), &opts())
            .await
            .unwrap();
        assert!(allowed(&service, "alice").await);

        let removed = service
            .remove_group_member("alice", "eng", &opts())
            .await
            .unwrap();

        assert!(removed);
        assert!(!allowed(&service, "alice").await);
    }

    #[tokio::test]
    async fn revoking_missing_assignment_is_a_noop() {
        let (service, metrics) = make_service().await;

        let removed = service
            .revoke_user_role("alice", "editor", Some("org"), &opts())
            .await
            .unwrap();

        assert!(!removed);
        assert_eq!(metrics.invalidations(), 0);
    }

    #[tokio::test]
    async fn assignment_to_unknown_role_is_a_storage_error() {
        let (service, _) = make_service().await;

        let err = service
            .assign_user_role(&UserRole::global("alice", "ghost"), &opts())
            .await
            .unwrap_err();

        assert!(
            matches!(err, ApiError::Storage(_)),
            "expected storage error, got: {err}"
        );
    }

    #[tokio::test]
    async fn metrics_track_checks_and_invalidations() {
        let (service, metrics) = make_service().await;
        service
            .assign_user_role(&UserRole::global("alice", "editor"), &opts())
            .await
            .unwrap();

        allowed(&service, "alice").await;
        allowed(&service, "alice").await;
        allowed(&service, "bob").await;

        assert_eq!(metrics.checks_total(), 3);
        assert_eq!(metrics.checks_allowed(), 2);
        assert_eq!(metrics.checks_denied(), 1);
        assert_eq!(metrics.cache_hits(), 1);
        assert_eq!(metrics.invalidations(), 1);

        let rendered = metrics.render_prometheus();
        assert!(rendered.contains("rolegate_checks_total 3\n"));
        assert!(rendered.contains("rolegate_invalidations_total 1\n"));
    }

    #[tokio::test]
    async fn authorize_fails_closed_when_cancelled() {
        let (service, metrics) = make_service().await;
        service
            .assign_user_role(&UserRole::global("alice", "editor"), &opts())
            .await
            .unwrap();
        let (handle, signal) = cancellation();
        handle.cancel();

        let result = service
            .authorize(&edit_d1("alice"), &ResolveOptions::default().with_cancel(signal))
            .await;

        assert!(!result.allowed);
        assert_eq!(result.decision.effect, Effect::Deny);
        assert!(
            matches!(result.decision.reason, DecisionReason::Undetermined(_)),
            "expected Undetermined, got: {}",
            result.decision.reason
        );
        assert_eq!(metrics.checks_failed(), 1);
    }

    #[tokio::test]
    async fn matrix_and_effective_permissions_agree() {
        let (service, _) = make_service().await;
        service
            .assign_user_role(&UserRole::scoped("alice", "editor", "d1"), &opts())
            .await
            .unwrap();

        let matrix = service
            .permission_matrix("alice", &ResolveOptions::default())
            .await
            .unwrap();
        let effective = service
            .effective_permissions("alice", &ResolveOptions::default())
            .await
            .unwrap();

        assert!(matrix.is_allowed("document:d1:edit"));
        assert_eq!(effective.len(), matrix.final_permissions.len());
    }

    struct StuckInvalidationCache;

    impl PermissionCache for StuckInvalidationCache {
        async fn get(&self, _key: &CheckRequest) -> Result<Option<ResolvedDecision>, ResolveError> {
            Ok(None)
        }

        async fn generation(&self, _user_id: &str) -> Result<u64, ResolveError> {
            Ok(0)
        }

        async fn put(
            &self,
            _key: CheckRequest,
            _decision: ResolvedDecision,
            _generation: u64,
        ) -> Result<bool, ResolveError> {
            Ok(false)
        }

        async fn invalidate_user(&self, _user_id: &str) -> Result<(), ResolveError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn stuck_cache_bounds_mutations_with_timeout() {
        let metrics = Arc::new(Metrics::new());
        let service = AuthzService::new(
            seeded_store().await,
            Arc::new(StuckInvalidationCache),
            EngineConfig {
                default_timeout: Duration::from_millis(20),
                ..EngineConfig::default()
            },
        )
        .with_metrics(Arc::clone(&metrics));

        let assigned = tokio::time::timeout(
            Duration::from_millis(500),
            service.assign_user_role(&UserRole::global("alice", "editor"), &opts()),
        )
        .await
        .expect("assignment must not hang on the cache");
        let invalidated = tokio::time::timeout(
            Duration::from_millis(500),
            service.invalidate_user("alice", &ResolveOptions::with_timeout(Duration::from_millis(5))),
        )
        .await
        .expect("invalidation must not hang on the cache");

        assert!(
            matches!(assigned, Err(ApiError::Resolve(ResolveError::Timeout(_)))),
            "expected Timeout, got: {assigned:?}"
        );
        assert!(
            matches!(invalidated, Err(ApiError::Resolve(ResolveError::Timeout(limit))) if limit == Duration::from_millis(5)),
            "expected Timeout, got: {invalidated:?}"
        );
        assert_eq!(metrics.invalidations(), 0);
        assert_eq!(service.store().effective_user_roles("alice").await.unwrap().len(), 1);
    }

    #[test]
    fn mutations_emit_audit_events() {
        let events = capture_events(|| {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let (service, _) = make_service().await;
                service
                    .assign_user_role(&UserRole::global("alice", "editor"), &opts())
                    .await
                    .unwrap();
            });
        });

        let audit = audit_events(&events);
        assert_eq!(audit.len(), 2);
        assert!(has_field(audit[0], "event", "user_role_assigned"));
        assert!(has_field(audit[1], "event", "user_invalidated"));
        assert!(has_field(audit[1], "trigger", "user_role_assigned"));
    }
}
