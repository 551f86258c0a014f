use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use crate::cache::PermissionCache;
use crate::model::{
    CheckRequest, CheckResult, EffectivePermission, InheritedRole, PermissionMatrix,
    ResolvedDecision, ResourceTarget,
};

use super::aggregate::{GrantSet, PermissionAggregator};
use super::conflict;
use super::hierarchy::HierarchyKind;
use super::{EngineConfig, EntityReader, ResolveError};

/// Fires a [`CancelSignal`]. Dropping the handle without cancelling never fires it.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    async fn cancelled(mut self) {
        if self.0.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelSignal(rx))
}

struct UserEvaluation {
    grants: GrantSet,
    inherited_roles: Vec<InheritedRole>,
    permissions: Vec<(CheckRequest, ResolvedDecision)>,
}

#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelSignal>,
}

impl ResolveOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }
}

/// Entry point for permission decisions.
///
/// A decision is written to the cache only after it has been fully resolved, so a timed-out,
/// cancelled or dropped call leaves the cache untouched.
pub struct PermissionResolver<R: EntityReader, C: PermissionCache> {
    reader: Arc<R>,
    cache: Arc<C>,
    config: EngineConfig,
}

impl<R: EntityReader, C: PermissionCache> PermissionResolver<R, C> {
    pub fn new(reader: Arc<R>, cache: Arc<C>, config: EngineConfig) -> Self {
        Self {
            reader,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Failures are never an allow: on `Err` the caller applies
    /// [`ResolveError::fail_closed_decision`].
    pub async fn check_permission(
        &self,
        request: &CheckRequest,
        options: &ResolveOptions,
    ) -> Result<CheckResult, ResolveError> {
        let (decision, cache_hit) = self.bounded(options, self.decide(request)).await?;

        tracing::debug!(
            request = %request,
            effect = %decision.effect,
            reason = %decision.reason,
            cache_hit,
            "permission resolved"
        );

        Ok(CheckResult {
            allowed: decision.is_allowed(),
            decision,
            cache_hit,
        })
    }

    pub async fn compute_user_permission_matrix(
        &self,
        user_id: &str,
        options: &ResolveOptions,
    ) -> Result<PermissionMatrix, ResolveError> {
        self.bounded(options, self.build_matrix(user_id)).await
    }

    pub async fn get_user_effective_permissions(
        &self,
        user_id: &str,
        options: &ResolveOptions,
    ) -> Result<Vec<EffectivePermission>, ResolveError> {
        let evaluation = self.bounded(options, self.evaluate_user(user_id)).await?;

        Ok(evaluation
            .permissions
            .into_iter()
            .map(|(request, decision)| EffectivePermission {
                resource_type: request.resource_type,
                resource: request.resource,
                action: request.action,
                decision,
            })
            .collect())
    }

    /// Bounded like every other operation, so a stuck cache surfaces as `Timeout`.
    pub async fn invalidate_user(
        &self,
        user_id: &str,
        options: &ResolveOptions,
    ) -> Result<(), ResolveError> {
        self.bounded(options, self.cache.invalidate_user(user_id))
            .await
    }

    async fn bounded<T>(
        &self,
        options: &ResolveOptions,
        work: impl Future<Output = Result<T, ResolveError>>,
    ) -> Result<T, ResolveError> {
        let limit = options.timeout.unwrap_or(self.config.default_timeout);
        let timed = async {
            tokio::time::timeout(limit, work)
                .await
                .unwrap_or(Err(ResolveError::Timeout(limit)))
        };

        match options.cancel.clone() {
            Some(signal) => {
                if signal.is_cancelled() {
                    return Err(ResolveError::Cancelled);
                }
                tokio::select! {
                    biased;
                    () = signal.cancelled() => Err(ResolveError::Cancelled),
                    result = timed => result,
                }
            }
            None => timed.await,
        }
    }

    async fn decide(&self, request: &CheckRequest) -> Result<(ResolvedDecision, bool), ResolveError> {
        if let Some(hit) = self.cache.get(request).await? {
            return Ok((hit, true));
        }

        let generation = self.cache.generation(&request.user_id).await?;
        let decision = self.evaluate(request).await?;
        self.cache
            .put(request.clone(), decision.clone(), generation)
            .await?;
        Ok((decision, false))
    }

    async fn evaluate(&self, request: &CheckRequest) -> Result<ResolvedDecision, ResolveError> {
        let aggregator = PermissionAggregator::new(&*self.reader, self.config.max_hierarchy_depth);
        let decisions = aggregator.collect(request, Utc::now()).await?;
        Ok(conflict::resolve(&decisions))
    }

    async fn build_matrix(&self, user_id: &str) -> Result<PermissionMatrix, ResolveError> {
        let evaluation = self.evaluate_user(user_id).await?;

        Ok(PermissionMatrix {
            user_id: user_id.to_string(),
            direct_roles: evaluation.grants.user_roles,
            inherited_roles: evaluation.inherited_roles,
            group_roles: evaluation.grants.group_roles,
            final_permissions: evaluation
                .permissions
                .into_iter()
                .map(|(request, decision)| (request.permission_key(), decision))
                .collect(),
        })
    }

    /// Runs the regular check path over every target implied by the user's grants, so the
    /// reporting views can never disagree with `check_permission`.
    async fn evaluate_user(&self, user_id: &str) -> Result<UserEvaluation, ResolveError> {
        let aggregator = PermissionAggregator::new(&*self.reader, self.config.max_hierarchy_depth);
        let grants = aggregator.effective_grants(user_id, Utc::now()).await?;

        let held = grants.role_ids();
        let mut inherited: BTreeMap<String, InheritedRole> = BTreeMap::new();
        for role_id in &held {
            let ancestors = aggregator
                .hierarchy()
                .ancestors(role_id, HierarchyKind::Role)
                .await?;
            for (idx, ancestor) in ancestors.into_iter().enumerate() {
                if held.contains(ancestor.as_str()) {
                    continue;
                }
                let candidate = InheritedRole {
                    role_id: ancestor.clone(),
                    below_role_id: role_id.to_string(),
                    distance: idx + 1,
                };
                inherited
                    .entry(ancestor)
                    .and_modify(|existing| {
                        if candidate.distance < existing.distance {
                            *existing = candidate.clone();
                        }
                    })
                    .or_insert(candidate);
            }
        }

        let mut permissions = Vec::new();
        for request in self.matrix_targets(user_id, &grants).await? {
            let (decision, _) = self.decide(&request).await?;
            permissions.push((request, decision));
        }

        Ok(UserEvaluation {
            grants,
            inherited_roles: inherited.into_values().collect(),
            permissions,
        })
    }

    /// Every (type, scope, action) the user's grants could speak to.
    async fn matrix_targets(
        &self,
        user_id: &str,
        grants: &GrantSet,
    ) -> Result<BTreeSet<CheckRequest>, ResolveError> {
        let mut bindings_by_role = HashMap::new();
        for role_id in grants.role_ids() {
            bindings_by_role.insert(role_id, self.reader.role_permissions(role_id).await?);
        }

        let mut targets = BTreeSet::new();
        for grant in grants.grants() {
            let Some(bindings) = bindings_by_role.get(grant.role_id.as_str()) else {
                continue;
            };
            for binding in bindings {
                targets.insert(CheckRequest {
                    user_id: user_id.to_string(),
                    resource_type: binding.permission.resource_type.clone(),
                    resource: ResourceTarget::from(grant.resource_id.clone()),
                    action: binding.permission.action.clone(),
                });
            }
        }
        Ok(targets)
    }
}
