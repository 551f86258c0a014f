use std::collections::HashSet;

use crate::model::ResourceTarget;

use super::hierarchy::{HierarchyKind, HierarchyResolver};
use super::{EntityReader, ResolveError};

/// Decides whether a grant scope covers the requested resource.
///
/// Built once per request so the ancestor walk happens a single time no matter how many
/// grants are tested against it.
#[derive(Debug, Clone)]
pub struct ScopeMatcher {
    target: ResourceTarget,
    ancestors: HashSet<String>,
}

impl ScopeMatcher {
    pub async fn for_target<R: EntityReader>(
        hierarchy: &HierarchyResolver<'_, R>,
        target: &ResourceTarget,
    ) -> Result<Self, ResolveError> {
        let ancestors = match target {
            ResourceTarget::Any => HashSet::new(),
            ResourceTarget::Resource(id) => hierarchy
                .ancestors(id, HierarchyKind::Resource)
                .await?
                .into_iter()
                .collect(),
        };

        Ok(Self {
            target: target.clone(),
            ancestors,
        })
    }

    /// `None` is a global grant. A scoped grant matches its own resource and every
    /// descendant of it, never an ancestor.
    pub fn matches(&self, grant_resource_id: Option<&str>) -> bool {
        let Some(scope) = grant_resource_id else {
            return true;
        };

        match &self.target {
            ResourceTarget::Any => false,
            ResourceTarget::Resource(id) => id == scope || self.ancestors.contains(scope),
        }
    }
}
