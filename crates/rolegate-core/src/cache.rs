use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::engine::ResolveError;
use crate::model::{CheckRequest, ResolvedDecision};

/// Memo of resolved decisions keyed by the full request, invalidated per user.
///
/// Writers pass the generation they observed before evaluating. A write carrying a
/// generation older than the user's current one is discarded, so an evaluation racing an
/// invalidation can never reinstate a stale decision.
pub trait PermissionCache: Send + Sync {
    fn get(
        &self,
        key: &CheckRequest,
    ) -> impl Future<Output = Result<Option<ResolvedDecision>, ResolveError>> + Send;

    fn generation(&self, user_id: &str) -> impl Future<Output = Result<u64, ResolveError>> + Send;

    /// Returns whether the decision was stored.
    fn put(
        &self,
        key: CheckRequest,
        decision: ResolvedDecision,
        generation: u64,
    ) -> impl Future<Output = Result<bool, ResolveError>> + Send;

    fn invalidate_user(&self, user_id: &str) -> impl Future<Output = Result<(), ResolveError>> + Send;
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Option<Duration>,
    pub max_entries_per_user: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Some(Duration::from_secs(300)),
            max_entries_per_user: 1024,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedDecision {
    decision: ResolvedDecision,
    inserted_at: Instant,
}

#[derive(Debug, Default)]
struct UserSlot {
    generation: u64,
    decisions: HashMap<CheckRequest, CachedDecision>,
}

/// Sharded in-process cache. Readers of one user never block writers of another user
/// on a different shard, and a decision is always cloned out whole under the shard lock.
#[derive(Debug, Default)]
pub struct InMemoryPermissionCache {
    users: DashMap<String, UserSlot>,
    config: CacheConfig,
}

impl InMemoryPermissionCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            users: DashMap::new(),
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.users.iter().map(|slot| slot.decisions.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries_for_user(&self, user_id: &str) -> usize {
        self.users
            .get(user_id)
            .map_or(0, |slot| slot.decisions.len())
    }

    pub fn clear(&self) {
        for mut slot in self.users.iter_mut() {
            slot.generation += 1;
            slot.decisions.clear();
        }
    }

    fn is_fresh(&self, entry: &CachedDecision, now: Instant) -> bool {
        self.config
            .ttl
            .is_none_or(|ttl| now.duration_since(entry.inserted_at) < ttl)
    }
}

impl PermissionCache for InMemoryPermissionCache {
    async fn get(&self, key: &CheckRequest) -> Result<Option<ResolvedDecision>, ResolveError> {
        let now = Instant::now();
        Ok(self.users.get(&key.user_id).and_then(|slot| {
            slot.decisions
                .get(key)
                .filter(|entry| self.is_fresh(entry, now))
                .map(|entry| entry.decision.clone())
        }))
    }

    async fn generation(&self, user_id: &str) -> Result<u64, ResolveError> {
        Ok(self.users.get(user_id).map_or(0, |slot| slot.generation))
    }

    async fn put(
        &self,
        key: CheckRequest,
        decision: ResolvedDecision,
        generation: u64,
    ) -> Result<bool, ResolveError> {
        if self.config.max_entries_per_user == 0 {
            return Ok(false);
        }

        let now = Instant::now();
        let mut slot = self.users.entry(key.user_id.clone()).or_default();
        if slot.generation != generation {
            tracing::debug!(
                user_id = %key.user_id,
                observed = generation,
                current = slot.generation,
                "discarding decision computed before invalidation"
            );
            return Ok(false);
        }

        if !slot.decisions.contains_key(&key) {
            slot.decisions.retain(|_, entry| self.is_fresh(entry, now));

            if slot.decisions.len() >= self.config.max_entries_per_user {
                let oldest = slot
                    .decisions
                    .iter()
                    .min_by_key(|(_, entry)| entry.inserted_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    slot.decisions.remove(&oldest);
                }
            }
        }

        slot.decisions.insert(
            key,
            CachedDecision {
                decision,
                inserted_at: now,
            },
        );
        Ok(true)
    }

    async fn invalidate_user(&self, user_id: &str) -> Result<(), ResolveError> {
        let mut slot = self.users.entry(user_id.to_string()).or_default();
        slot.generation += 1;
        let dropped = slot.decisions.len();
        slot.decisions.clear();
        tracing::debug!(user_id, dropped, generation = slot.generation, "invalidated user decisions");
        Ok(())
    }
}

/// Stores nothing. Resolution behaves identically with it, only slower.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPermissionCache;

impl PermissionCache for NoopPermissionCache {
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
        Ok(())
    }
}
