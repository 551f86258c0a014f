use std::collections::HashMap;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};

use rolegate_core::cache::{CacheConfig, InMemoryPermissionCache, NoopPermissionCache, PermissionCache};
use rolegate_core::engine::{
    EngineConfig, EntityReader, PermissionResolver, ResolveError, ResolveOptions,
};
use rolegate_core::model::{
    CheckRequest, GroupRole, Permission, RolePermission, UserGroup, UserRole,
};

#[derive(Default)]
struct TestStore {
    user_roles: Vec<UserRole>,
    bindings: HashMap<String, Vec<RolePermission>>,
    resource_parents: HashMap<String, String>,
}

impl EntityReader for TestStore {
    async fn effective_user_roles(&self, user_id: &str) -> Result<Vec<UserRole>, ResolveError> {
        Ok(self
            .user_roles
            .iter()
            .filter(|ur| ur.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn active_groups_for_user(&self, _user_id: &str) -> Result<Vec<UserGroup>, ResolveError> {
        Ok(Vec::new())
    }

    async fn effective_group_roles(&self, _group_id: &str) -> Result<Vec<GroupRole>, ResolveError> {
        Ok(Vec::new())
    }

    async fn role_permissions(&self, role_id: &str) -> Result<Vec<RolePermission>, ResolveError> {
        Ok(self.bindings.get(role_id).cloned().unwrap_or_default())
    }

    async fn resource_parent(&self, resource_id: &str) -> Result<Option<String>, ResolveError> {
        Ok(self.resource_parents.get(resource_id).cloned())
    }

    async fn role_parent(&self, _role_id: &str) -> Result<Option<String>, ResolveError> {
        Ok(None)
    }

    async fn group_parent(&self, _group_id: &str) -> Result<Option<String>, ResolveError> {
        Ok(None)
    }
}

/// A resource chain `r0 <- r1 <- ... <- r{depth-1}` with one role scoped at the root.
fn resource_chain(depth: usize) -> TestStore {
    let mut store = TestStore::default();
    for i in 1..depth {
        store
            .resource_parents
            .insert(format!("r{i}"), format!("r{}", i - 1));
    }
    store.user_roles.push(UserRole::scoped("alice", "reader", "r0"));
    store.bindings.insert(
        "reader".to_string(),
        vec![RolePermission::new(
            "reader",
            Permission::allow("doc-read", "document", "read"),
        )],
    );
    store
}

/// `count` roles held directly, each carrying a read and a write permission.
fn fan_out_roles(count: usize) -> TestStore {
    let mut store = TestStore::default();
    for i in 0..count {
        let role = format!("role{i}");
        store.user_roles.push(UserRole::global("alice", role.clone()));
        store.bindings.insert(
            role.clone(),
            vec![
                RolePermission::new(&role, Permission::allow(format!("p{i}-r"), "document", "read")),
                RolePermission::new(&role, Permission::allow(format!("p{i}-w"), "document", "write")),
            ],
        );
    }
    store
}

fn make_resolver<C: PermissionCache>(store: TestStore, cache: C) -> PermissionResolver<TestStore, C> {
    PermissionResolver::new(Arc::new(store), Arc::new(cache), EngineConfig::default())
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn bench_check_chain_uncached(c: &mut Criterion, depth: usize) {
    let rt = runtime();
    let resolver = make_resolver(resource_chain(depth), NoopPermissionCache);
    let request = CheckRequest::new("alice", "document", format!("r{}", depth - 1), "read");
    let options = ResolveOptions::default();

    c.bench_function(&format!("check_chain_depth_{depth}_uncached"), |b| {
        b.to_async(&rt)
            .iter(|| async { resolver.check_permission(&request, &options).await.unwrap() });
    });
}

fn bench_check_chain_depth_3(c: &mut Criterion) {
    bench_check_chain_uncached(c, 3);
}

fn bench_check_chain_depth_16(c: &mut Criterion) {
    bench_check_chain_uncached(c, 16);
}

fn bench_check_cached(c: &mut Criterion) {
    let rt = runtime();
    let resolver = make_resolver(
        resource_chain(16),
        InMemoryPermissionCache::new(CacheConfig::default()),
    );
    let request = CheckRequest::new("alice", "document", "r15", "read");
    let options = ResolveOptions::default();
    rt.block_on(resolver.check_permission(&request, &options))
        .unwrap();

    c.bench_function("check_chain_depth_16_cached", |b| {
        b.to_async(&rt)
            .iter(|| async { resolver.check_permission(&request, &options).await.unwrap() });
    });
}

fn bench_check_fan_out_50(c: &mut Criterion) {
    let rt = runtime();
    let resolver = make_resolver(fan_out_roles(50), NoopPermissionCache);
    let request = CheckRequest::new("alice", "document", "d1", "write");
    let options = ResolveOptions::default();

    c.bench_function("check_fan_out_50_roles", |b| {
        b.to_async(&rt)
            .iter(|| async { resolver.check_permission(&request, &options).await.unwrap() });
    });
}

fn bench_matrix_fan_out_50(c: &mut Criterion) {
    let rt = runtime();
    let resolver = make_resolver(fan_out_roles(50), NoopPermissionCache);
    let options = ResolveOptions::default();

    c.bench_function("matrix_fan_out_50_roles", |b| {
        b.to_async(&rt).iter(|| async {
            resolver
                .compute_user_permission_matrix("alice", &options)
                .await
                .unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_check_chain_depth_3,
    bench_check_chain_depth_16,
    bench_check_cached,
    bench_check_fan_out_50,
    bench_matrix_fan_out_50,
);
criterion_main!(benches);
