use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::model::{CheckRequest, GroupRole, PermissionDecision, RoleGrant, RolePermission, UserRole};

use super::hierarchy::HierarchyResolver;
use super::scope::ScopeMatcher;
use super::{EntityReader, ResolveError};

/// Every effective role assignment a user holds, directly or through group membership.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrantSet {
    pub user_roles: Vec<UserRole>,
    pub group_roles: Vec<GroupRole>,
}

impl GrantSet {
    pub fn is_empty(&self) -> bool {
        self.user_roles.is_empty() && self.group_roles.is_empty()
    }

    pub fn grants(&self) -> impl Iterator<Item = RoleGrant> + '_ {
        self.user_roles
            .iter()
            .map(RoleGrant::from)
            .chain(self.group_roles.iter().map(RoleGrant::from))
    }

    pub fn role_ids(&self) -> BTreeSet<&str> {
        self.user_roles
            .iter()
            .map(|a| a.role_id.as_str())
            .chain(self.group_roles.iter().map(|a| a.role_id.as_str()))
            .collect()
    }
}

/// Collects the bindings that apply to a request.
///
/// Only resource containment widens a grant. Role and group ancestry are never walked here.
pub struct PermissionAggregator<'a, R: EntityReader> {
    reader: &'a R,
    hierarchy: HierarchyResolver<'a, R>,
}

impl<'a, R: EntityReader> PermissionAggregator<'a, R> {
    pub fn new(reader: &'a R, max_hierarchy_depth: usize) -> Self {
        Self {
            reader,
            hierarchy: HierarchyResolver::new(reader, max_hierarchy_depth),
        }
    }

    pub fn hierarchy(&self) -> &HierarchyResolver<'a, R> {
        &self.hierarchy
    }

    pub async fn effective_grants(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<GrantSet, ResolveError> {
        let user_roles = self
            .reader
            .effective_user_roles(user_id)
            .await?
            .into_iter()
            .filter(|a| a.user_id == user_id && a.is_effective_at(now))
            .collect();

        let mut group_roles = Vec::new();
        let mut seen_groups = HashSet::new();
        for group in self.reader.active_groups_for_user(user_id).await? {
            if !seen_groups.insert(group.id.clone()) {
                continue;
            }
            group_roles.extend(
                self.reader
                    .effective_group_roles(&group.id)
                    .await?
                    .into_iter()
                    .filter(|a| a.group_id == group.id && a.is_effective_at(now)),
            );
        }

        Ok(GrantSet {
            user_roles,
            group_roles,
        })
    }

    /// One decision per applicable binding, sorted and without duplicates. An empty result
    /// is a normal outcome: unknown users and unknown resources simply have no grants.
    pub async fn collect(
        &self,
        request: &CheckRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<PermissionDecision>, ResolveError> {
        let grants = self.effective_grants(&request.user_id, now).await?;
        if grants.is_empty() {
            return Ok(Vec::new());
        }

        let matcher = ScopeMatcher::for_target(&self.hierarchy, &request.resource).await?;

        let mut bindings_by_role: HashMap<String, Vec<RolePermission>> = HashMap::new();
        let mut decisions = Vec::new();

        for grant in grants.grants() {
            if !matcher.matches(grant.resource_id.as_deref()) {
                continue;
            }

            let bindings = match bindings_by_role.entry(grant.role_id.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    entry.insert(self.reader.role_permissions(&grant.role_id).await?)
                }
            };

            for binding in bindings
                .iter()
                .filter(|b| b.applies_to(&request.resource_type, &request.action))
            {
                decisions.push(PermissionDecision {
                    effect: binding.effective_effect(),
                    source_role_id: grant.role_id.clone(),
                    source_permission_id: binding.permission.id.clone(),
                    via: grant.via.clone(),
                    scope: grant.resource_id.clone(),
                });
            }
        }

        decisions.sort();
        decisions.dedup();

        tracing::trace!(
            request = %request,
            decisions = decisions.len(),
            "collected applicable grants"
        );

        Ok(decisions)
    }
}
