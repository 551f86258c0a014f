use std::sync::Arc;
use std::time::Instant;

use rolegate_core::cache::{CacheConfig, InMemoryPermissionCache};
use rolegate_core::engine::{EngineConfig, ResolveOptions};
use rolegate_core::model::{
    CheckRequest, GroupRole, Permission, Resource, Role, UserGroup, UserGroupMembership, UserRole,
};
use rolegate_service::AuthzService;
use rolegate_storage::{EntityStore, InMemoryStore};

type Service = AuthzService<InMemoryStore, InMemoryPermissionCache>;

fn make_service() -> Service {
    AuthzService::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(InMemoryPermissionCache::new(CacheConfig::default())),
        EngineConfig::default(),
    )
}

/// One organization with 10 projects, each holding 100 documents.
async fn seed_org(service: &Service) {
    let store = service.store();
    store
        .upsert_resource(&Resource::new("org", "organization"))
        .await
        .unwrap();
    for project_idx in 0..10 {
        let project_id = format!("project{project_idx}");
        store
            .upsert_resource(&Resource::new(&project_id, "project").with_parent("org"))
            .await
            .unwrap();
        for doc_idx in 0..100 {
            store
                .upsert_resource(
                    &Resource::new(format!("doc_{project_idx}_{doc_idx}"), "document")
                        .with_parent(&project_id),
                )
                .await
                .unwrap();
        }
    }

    store
        .upsert_role(&Role::new("reader", "Reader"))
        .await
        .unwrap();
    store
        .upsert_permission(&Permission::allow("doc-read", "document", "read"))
        .await
        .unwrap();
    store
        .bind_permission("reader", "doc-read", None, None)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore]
async fn load_test_1000_documents_scoped_check() {
    let service = make_service();
    seed_org(&service).await;
    service
        .assign_user_role(
            &UserRole::scoped("alice", "reader", "org"),
            &ResolveOptions::default(),
        )
        .await
        .unwrap();

    let start = Instant::now();
    for i in 0..1000 {
        let doc_id = format!("doc_{}_{}", i % 10, i % 100);

        let result = service
            .check_permission(
                &CheckRequest::new("alice", "document", &doc_id, "read"),
                &ResolveOptions::default(),
            )
            .await
            .unwrap();

        assert!(result.allowed, "alice should read {doc_id}");
    }

    let elapsed = start.elapsed();
    eprintln!(
        "load_test_1000_documents: 1000 scoped checks in {:.2?} ({:.2?}/check)",
        elapsed,
        elapsed / 1000,
    );
}

#[tokio::test]
#[ignore]
async fn load_test_group_fan_out_invalidation() {
    let service = make_service();
    seed_org(&service).await;
    service
        .store()
        .upsert_group(&UserGroup::new("everyone", "Everyone"))
        .await
        .unwrap();

    // 1000 members, each warming one cached decision
    for user_idx in 0..1000 {
        let user_id = format!("user{user_idx}");
        service
            .add_group_member(
                &UserGroupMembership::new(&user_id, "everyone"),
                &ResolveOptions::default(),
            )
            .await
            .unwrap();
        service
            .check_permission(
                &CheckRequest::new(&user_id, "document", "doc_0_0", "read"),
                &ResolveOptions::default(),
            )
            .await
            .unwrap();
    }

    let start = Instant::now();
    let affected = service
        .assign_group_role(
            &GroupRole::global("everyone", "reader"),
            &ResolveOptions::default(),
        )
        .await
        .unwrap();
    let fan_out_elapsed = start.elapsed();

    assert_eq!(affected, 1000);

    let result = service
        .check_permission(
            &CheckRequest::new("user999", "document", "doc_0_0", "read"),
            &ResolveOptions::default(),
        )
        .await
        .unwrap();
    assert!(result.allowed, "stale denial survived the group grant");

    eprintln!(
        "load_test_fan_out: invalidated {affected} members in {:.2?}",
        fan_out_elapsed,
    );
}

#[tokio::test]
#[ignore]
async fn load_test_cache_warm_vs_cold() {
    let service = make_service();
    seed_org(&service).await;
    service
        .assign_user_role(
            &UserRole::scoped("alice", "reader", "project3"),
            &ResolveOptions::default(),
        )
        .await
        .unwrap();

    let request = CheckRequest::new("alice", "document", "doc_3_42", "read");

    // Cold check: walks the resource tree and populates the cache
    let cold_start = Instant::now();
    let cold = service
        .check_permission(&request, &ResolveOptions::default())
        .await
        .unwrap();
    let cold_elapsed = cold_start.elapsed();
    assert!(!cold.cache_hit);

    let warm_start = Instant::now();
    for _ in 0..100 {
        let warm = service
            .check_permission(&request, &ResolveOptions::default())
            .await
            .unwrap();
        assert!(warm.cache_hit);
    }
    let warm_elapsed = warm_start.elapsed();

    eprintln!(
        "load_test_cache: 1 cold check in {:.2?}, 100 warm checks in {:.2?} ({:.2?}/check)",
        cold_elapsed,
        warm_elapsed,
        warm_elapsed / 100,
    );
}

#[tokio::test]
#[ignore]
async fn load_test_matrix_for_100_scoped_grants() {
    let service = make_service();
    seed_org(&service).await;
    for project_idx in 0..10 {
        for doc_idx in 0..10 {
            service
                .assign_user_role(
                    &UserRole::scoped("bob", "reader", format!("doc_{project_idx}_{doc_idx}")),
                    &ResolveOptions::default(),
                )
                .await
                .unwrap();
        }
    }

    let start = Instant::now();
    let matrix = service
        .permission_matrix("bob", &ResolveOptions::default())
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(matrix.final_permissions.len(), 100);
    eprintln!(
        "load_test_matrix: {} entries in {:.2?}",
        matrix.final_permissions.len(),
        elapsed,
    );
}
