//! Material switch lists built from a renderer correspondence.

use crate::correspondence::{Correspondence, HierarchyIndex};
use crate::scene::{Hierarchy, Material, NodeId};
use std::sync::Arc;

/// One substitution: put `material` into `slot` of the target renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialSwitchEntry {
    pub target: NodeId,
    /// Path of the target renderer below the indexed target root.
    pub target_path: String,
    pub slot: usize,
    pub material: Arc<Material>,
}

/// Donor slots that had a material but no counterpart slot on the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotDiscrepancy {
    pub donor_path: String,
    pub target_path: String,
    pub donor_slots: usize,
    pub target_slots: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchSummary {
    pub entries: usize,
    pub slot_discrepancies: usize,
    pub discrepancies: Vec<SlotDiscrepancy>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwitchList {
    pub entries: Vec<MaterialSwitchEntry>,
    pub summary: SwitchSummary,
}

/// Build the ordered switch list for a correspondence.
///
/// Order is donor traversal order, then ascending slot. Only slots present
/// on both sides with a non-empty donor material produce entries.
pub fn build_switch_list(
    correspondence: &Correspondence,
    donor: &HierarchyIndex<'_>,
    target: &HierarchyIndex<'_>,
) -> SwitchList {
    let mut list = SwitchList::default();

    for mapped in &correspondence.mapping {
        let (Some(donor_entry), Some(target_entry)) =
            (donor.get(mapped.donor), target.get(mapped.target))
        else {
            continue;
        };
        let donor_slots = donor_entry.slots();
        let target_slots = target_entry.slots().len();
        let mut skipped = 0;

        for (slot, material) in donor_slots.iter().enumerate() {
            let Some(material) = material else {
                continue;
            };
            if slot >= target_slots {
                skipped += 1;
                continue;
            }
            log::debug!(
                "Switch {}[{}] -> {}",
                target_entry.path,
                slot,
                material.name
            );
            list.entries.push(MaterialSwitchEntry {
                target: target_entry.node,
                target_path: target_entry.path.clone(),
                slot,
                material: Arc::clone(material),
            });
        }

        if skipped > 0 {
            log::warn!(
                "'{}' has {} material slots but '{}' only {}; {} skipped",
                donor_entry.path,
                donor_slots.len(),
                target_entry.path,
                target_slots,
                skipped
            );
            list.summary.slot_discrepancies += skipped;
            list.summary.discrepancies.push(SlotDiscrepancy {
                donor_path: donor_entry.path.clone(),
                target_path: target_entry.path.clone(),
                donor_slots: donor_slots.len(),
                target_slots,
                skipped,
            });
        }
    }

    list.summary.entries = list.entries.len();
    list
}

/// Write every entry into `hierarchy` in list order, so later entries for
/// the same (node, slot) win. Returns the number of slots written; entries
/// whose node or slot is missing are skipped.
pub fn apply_switches(hierarchy: &mut Hierarchy, entries: &[MaterialSwitchEntry]) -> usize {
    let mut written = 0;
    for entry in entries {
        let applied = hierarchy
            .renderable_mut(entry.target)
            .map(|renderable| renderable.set_slot(entry.slot, Arc::clone(&entry.material)))
            .unwrap_or(false);
        if applied {
            written += 1;
        } else {
            log::warn!(
                "Could not apply {} to {}[{}]",
                entry.material.name,
                entry.target_path,
                entry.slot
            );
        }
    }
    written
}
