//! Renderer correspondence between two independently authored hierarchies.
//!
//! Donor renderables are matched against a target subtree by structural
//! path first and by bare name second. Anything left over is reported as
//! unresolved rather than dropped.

mod index;

pub use index::{HierarchyIndex, IndexError, IndexedRenderable};

use crate::scene::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    ExactPath,
    /// First target renderable in traversal order with the same name. With
    /// duplicate names this is order dependent.
    NameFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrespondenceEntry {
    /// Position of the donor renderable in the donor index.
    pub donor: usize,
    pub donor_path: String,
    /// Position of the matched renderable in the target index.
    pub target: usize,
    pub target_node: NodeId,
    pub target_path: String,
    pub kind: MatchKind,
}

/// Partial donor → target mapping plus the donor paths nothing matched.
///
/// Several donors may map to the same target; the switch list applies them
/// in donor order, so the last one wins per slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Correspondence {
    pub mapping: Vec<CorrespondenceEntry>,
    /// Distinct unmatched donor paths in first-seen order. Same-named
    /// siblings share a path and appear once.
    pub unresolved: Vec<String>,
}

impl Correspondence {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    pub fn count(&self, kind: MatchKind) -> usize {
        self.mapping.iter().filter(|entry| entry.kind == kind).count()
    }

    fn mark_unresolved(&mut self, path: &str) {
        if !self.unresolved.iter().any(|seen| seen == path) {
            self.unresolved.push(path.to_string());
        }
    }
}

pub fn resolve(donor: &HierarchyIndex<'_>, target: &HierarchyIndex<'_>) -> Correspondence {
    let mut correspondence = Correspondence::default();

    for (position, renderable) in donor.entries().iter().enumerate() {
        let matched = target
            .position_by_path(&renderable.path)
            .map(|found| (found, MatchKind::ExactPath))
            .or_else(|| {
                target
                    .positions_by_name(renderable.name)
                    .first()
                    .map(|found| (*found, MatchKind::NameFallback))
            });

        let Some((found, kind)) = matched else {
            log::warn!("No corresponding renderer for '{}'", renderable.path);
            correspondence.mark_unresolved(&renderable.path);
            continue;
        };
        let Some(target_entry) = target.get(found) else {
            correspondence.mark_unresolved(&renderable.path);
            continue;
        };
        if kind == MatchKind::NameFallback {
            log::debug!(
                "'{}' matched '{}' by name only",
                renderable.path,
                target_entry.path
            );
        }
        correspondence.mapping.push(CorrespondenceEntry {
            donor: position,
            donor_path: renderable.path.clone(),
            target: found,
            target_node: target_entry.node,
            target_path: target_entry.path.clone(),
            kind,
        });
    }

    correspondence
}
