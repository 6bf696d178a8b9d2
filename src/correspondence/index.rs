use crate::scene::{Hierarchy, MaterialSlot, NodeId, Renderable};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    #[error("'{root}' has no renderable below it")]
    EmptyHierarchy { root: String },
    #[error("index root {0:?} is not part of the hierarchy")]
    UnknownRoot(NodeId),
}

/// One renderable recorded by a [`HierarchyIndex`].
#[derive(Debug, Clone)]
pub struct IndexedRenderable<'a> {
    pub node: NodeId,
    /// Root-relative structural path, root itself excluded.
    pub path: String,
    pub name: &'a str,
    pub renderable: &'a Renderable,
}

impl IndexedRenderable<'_> {
    pub fn slots(&self) -> &[MaterialSlot] {
        self.renderable.slots()
    }
}

/// Read-only lookup tables over the renderables of one subtree.
///
/// Entries keep depth-first traversal order. When two renderables share a
/// structural path (duplicate sibling names) the first one owns the path.
#[derive(Debug)]
pub struct HierarchyIndex<'a> {
    entries: Vec<IndexedRenderable<'a>>,
    by_path: HashMap<String, usize>,
    by_name: HashMap<&'a str, Vec<usize>>,
}

impl<'a> HierarchyIndex<'a> {
    pub fn build(hierarchy: &'a Hierarchy, root: NodeId) -> Result<Self, IndexError> {
        let root_name = hierarchy.name(root).ok_or(IndexError::UnknownRoot(root))?;

        let mut entries = Vec::new();
        let mut by_path = HashMap::new();
        let mut by_name: HashMap<&'a str, Vec<usize>> = HashMap::new();

        for id in hierarchy.descendants(root) {
            let Some(node) = hierarchy.node(id) else {
                continue;
            };
            let Some(renderable) = node.renderable() else {
                continue;
            };
            let Some(path) = hierarchy.relative_path(id, root) else {
                continue;
            };
            let position = entries.len();
            by_path.entry(path.clone()).or_insert(position);
            by_name.entry(node.name()).or_default().push(position);
            entries.push(IndexedRenderable {
                node: id,
                path,
                name: node.name(),
                renderable,
            });
        }

        if entries.is_empty() {
            return Err(IndexError::EmptyHierarchy {
                root: root_name.to_string(),
            });
        }

        Ok(Self {
            entries,
            by_path,
            by_name,
        })
    }

    pub fn entries(&self) -> &[IndexedRenderable<'a>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&IndexedRenderable<'a>> {
        self.entries.get(position)
    }

    pub fn position_by_path(&self, path: &str) -> Option<usize> {
        self.by_path.get(path).copied()
    }

    pub fn by_path(&self, path: &str) -> Option<&IndexedRenderable<'a>> {
        self.position_by_path(path).and_then(|position| self.get(position))
    }

    /// Positions of every renderable named `name`, in traversal order.
    pub fn positions_by_name(&self, name: &str) -> &[usize] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn first_by_name(&self, name: &str) -> Option<&IndexedRenderable<'a>> {
        self.positions_by_name(name)
            .first()
            .and_then(|position| self.get(*position))
    }
}
