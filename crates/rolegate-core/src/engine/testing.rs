use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;

use crate::model::{
    GroupRole, Permission, Resource, Role, RolePermission, UserGroup, UserGroupMembership,
    UserRole,
};

use super::{EntityReader, ResolveError};

#[derive(Debug, Default)]
struct Fixture {
    roles: HashMap<String, Role>,
    resources: HashMap<String, Resource>,
    groups: HashMap<String, UserGroup>,
    bindings: Vec<RolePermission>,
    user_roles: Vec<UserRole>,
    group_roles: Vec<GroupRole>,
    memberships: Vec<UserGroupMembership>,
}

/// Mutable in-process reader for engine tests.
#[derive(Debug, Default)]
pub(crate) struct TestStore {
    fixture: RwLock<Fixture>,
    reads: AtomicUsize,
    unavailable: RwLock<bool>,
    delay: RwLock<Option<Duration>>,
}

impl TestStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn role(self, role: Role) -> Self {
        self.fixture.write().roles.insert(role.id.clone(), role);
        self
    }

    pub(crate) fn resource(self, resource: Resource) -> Self {
        self.fixture
            .write()
            .resources
            .insert(resource.id.clone(), resource);
        self
    }

    pub(crate) fn group(self, group: UserGroup) -> Self {
        self.fixture.write().groups.insert(group.id.clone(), group);
        self
    }

    pub(crate) fn bind(self, role_id: &str, permission: Permission) -> Self {
        self.fixture
            .write()
            .bindings
            .push(RolePermission::new(role_id, permission));
        self
    }

    pub(crate) fn binding(self, binding: RolePermission) -> Self {
        self.fixture.write().bindings.push(binding);
        self
    }

    pub(crate) fn user_role(self, assignment: UserRole) -> Self {
        self.grant_user_role(assignment);
        self
    }

    pub(crate) fn group_role(self, assignment: GroupRole) -> Self {
        self.fixture.write().group_roles.push(assignment);
        self
    }

    pub(crate) fn member(self, user_id: &str, group_id: &str) -> Self {
        self.fixture
            .write()
            .memberships
            .push(UserGroupMembership::new(user_id, group_id));
        self
    }

    pub(crate) fn grant_user_role(&self, assignment: UserRole) {
        self.fixture.write().user_roles.push(assignment);
    }

    pub(crate) fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write() = unavailable;
    }

    pub(crate) fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write() = delay;
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<(), ResolveError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.unavailable.read() {
            return Err(ResolveError::StoreUnavailable(
                "connection refused".to_string(),
            ));
        }
        Ok(())
    }
}

impl EntityReader for TestStore {
    async fn effective_user_roles(&self, user_id: &str) -> Result<Vec<UserRole>, ResolveError> {
        self.enter().await?;
        let now = Utc::now();
        Ok(self
            .fixture
            .read()
            .user_roles
            .iter()
            .filter(|a| a.user_id == user_id && a.is_effective_at(now))
            .cloned()
            .collect())
    }

    async fn active_groups_for_user(&self, user_id: &str) -> Result<Vec<UserGroup>, ResolveError> {
        self.enter().await?;
        let fixture = self.fixture.read();
        Ok(fixture
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id && m.is_active)
            .filter_map(|m| fixture.groups.get(&m.group_id).cloned())
            .collect())
    }

    async fn effective_group_roles(&self, group_id: &str) -> Result<Vec<GroupRole>, ResolveError> {
        self.enter().await?;
        let now = Utc::now();
        Ok(self
            .fixture
            .read()
            .group_roles
            .iter()
            .filter(|a| a.group_id == group_id && a.is_effective_at(now))
            .cloned()
            .collect())
    }

    async fn role_permissions(&self, role_id: &str) -> Result<Vec<RolePermission>, ResolveError> {
        self.enter().await?;
        Ok(self
            .fixture
            .read()
            .bindings
            .iter()
            .filter(|b| b.role_id == role_id)
            .cloned()
            .collect())
    }

    async fn resource_parent(&self, resource_id: &str) -> Result<Option<String>, ResolveError> {
        self.enter().await?;
        Ok(self
            .fixture
            .read()
            .resources
            .get(resource_id)
            .and_then(|r| r.parent_resource_id.clone()))
    }

    async fn role_parent(&self, role_id: &str) -> Result<Option<String>, ResolveError> {
        self.enter().await?;
        Ok(self
            .fixture
            .read()
            .roles
            .get(role_id)
            .and_then(|r| r.parent_role_id.clone()))
    }

    async fn group_parent(&self, group_id: &str) -> Result<Option<String>, ResolveError> {
        self.enter().await?;
        Ok(self
            .fixture
            .read()
            .groups
            .get(group_id)
            .and_then(|g| g.parent_group_id.clone()))
    }
}

/// organization `org` → project `p1` → workspace `w1`, plus sibling project `p2` → `w2`
/// and a standalone `system` resource.
pub(crate) fn org_tree(store: TestStore) -> TestStore {
    store
        .resource(Resource::new("org", "organization"))
        .resource(Resource::new("p1", "project").with_parent("org"))
        .resource(Resource::new("w1", "workspace").with_parent("p1"))
        .resource(Resource::new("p2", "project").with_parent("org"))
        .resource(Resource::new("w2", "workspace").with_parent("p2"))
        .resource(Resource::new("system", "system"))
}
