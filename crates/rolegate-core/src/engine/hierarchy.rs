use std::collections::HashSet;

use std::fmt;

use super::{EntityReader, ResolveError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HierarchyKind {
    /// Role seniority. Reporting only, never consulted for decisions.
    Role,
    /// Resource containment, the only inherited dimension.
    Resource,
    /// Group nesting. Reporting only.
    Group,
}

impl fmt::Display for HierarchyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HierarchyKind::Role => "role",
            HierarchyKind::Resource => "resource",
            HierarchyKind::Group => "group",
        })
    }
}

/// Walks parent pointers without recursion.
///
/// The visited set is seeded with the starting node, so a self-parent or any loop back
/// into the chain is reported as a cycle on first traversal.
pub struct HierarchyResolver<'a, R: EntityReader> {
    reader: &'a R,
    max_depth: usize,
}

impl<'a, R: EntityReader> HierarchyResolver<'a, R> {
    pub fn new(reader: &'a R, max_depth: usize) -> Self {
        Self { reader, max_depth }
    }

    /// Ancestors of `node_id`, nearest first. Unknown nodes have no ancestors.
    pub async fn ancestors(
        &self,
        node_id: &str,
        kind: HierarchyKind,
    ) -> Result<Vec<String>, ResolveError> {
        let mut visited = HashSet::from([node_id.to_string()]);
        let mut chain = Vec::new();
        let mut current = node_id.to_string();

        while let Some(parent) = self.parent_of(&current, kind).await? {
            if !visited.insert(parent.clone()) {
                tracing::warn!(
                    kind = %kind,
                    node_id = %parent,
                    start = %node_id,
                    "hierarchy cycle detected"
                );
                return Err(ResolveError::CycleDetected {
                    kind,
                    node_id: parent,
                });
            }
            if chain.len() >= self.max_depth {
                return Err(self.past_depth_limit(parent, kind, visited).await);
            }
            chain.push(parent.clone());
            current = parent;
        }

        Ok(chain)
    }

    /// Keeps following parents past the depth limit so a long loop is still reported as a
    /// cycle. Stops at the first repeated node or at a root.
    async fn past_depth_limit(
        &self,
        from: String,
        kind: HierarchyKind,
        mut visited: HashSet<String>,
    ) -> ResolveError {
        let depth_error = ResolveError::MaxDepthExceeded {
            kind,
            depth: self.max_depth,
        };
        let mut current = from;
        loop {
            match self.parent_of(&current, kind).await {
                Ok(Some(parent)) => {
                    if !visited.insert(parent.clone()) {
                        tracing::warn!(
                            kind = %kind,
                            node_id = %parent,
                            max_depth = self.max_depth,
                            "hierarchy cycle detected beyond depth limit"
                        );
                        return ResolveError::CycleDetected {
                            kind,
                            node_id: parent,
                        };
                    }
                    current = parent;
                }
                Ok(None) => return depth_error,
                Err(e) => return e,
            }
        }
    }

    async fn parent_of(
        &self,
        node_id: &str,
        kind: HierarchyKind,
    ) -> Result<Option<String>, ResolveError> {
        match kind {
            HierarchyKind::Resource => self.reader.resource_parent(node_id).await,
            HierarchyKind::Role => self.reader.role_parent(node_id).await,
            HierarchyKind::Group => self.reader.group_parent(node_id).await,
        }
    }
}
