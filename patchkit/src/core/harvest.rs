//! Verdict collection from a converged tree.

use crate::core::fault::TreeFault;
use crate::core::tree::{DecisionTree, NodeId, PatchId, Verdict};

/// What one test's finished tree resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    /// Patch ids sitting on a `Failed` node, in discovery order.
    pub failed: Vec<PatchId>,
    /// Executions avoided by folding state-equivalent patches together:
    /// each terminal node scored all its patches with one path.
    pub shared_savings: usize,
    /// Number of `InvokeExpanded` nodes. A tree with more than one actually
    /// branched inside the test rather than converging at the root.
    pub interior_nodes: usize,
}

/// Walk a fully resolved tree depth-first and collect per-patch verdicts.
///
/// `Failed` marks every patch id at the node; `Passed` leaves its patches
/// unresolved (a pass never clears a patch, only the absence of any failure
/// across all tests does). Meeting an `Expanding` node, or a terminal node no
/// patch reached, means the tree never actually converged.
pub fn collect_verdicts(tree: &DecisionTree) -> Result<HarvestSummary, TreeFault> {
    let mut summary = HarvestSummary::default();
    walk(tree, tree.root(), &mut summary)?;
    Ok(summary)
}

fn walk(tree: &DecisionTree, id: NodeId, summary: &mut HarvestSummary) -> Result<(), TreeFault> {
    match tree.verdict(id) {
        Verdict::Expanding => Err(TreeFault::UnresolvedNode),
        Verdict::InvokeExpanded => {
            summary.interior_nodes += 1;
            for (_, child) in tree.children(id) {
                walk(tree, *child, summary)?;
            }
            Ok(())
        }
        terminal => {
            let patches = tree.patch_ids(id);
            if patches.is_empty() {
                return Err(TreeFault::EmptyPatchSet);
            }
            if terminal == Verdict::Failed {
                summary.failed.extend_from_slice(patches);
            }
            summary.shared_savings += patches.len() - 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::outcome::{ExecOutcome, FieldValue};
    use crate::core::record::InvocationRecord;
    use std::collections::BTreeMap;

    fn record(value: i64) -> InvocationRecord {
        let mut changed_fields = BTreeMap::new();
        changed_fields.insert("x".to_string(), FieldValue::Int(value));
        InvocationRecord {
            changed_fields,
            outcome: ExecOutcome::Return(FieldValue::Int(value)),
        }
    }

    #[test]
    fn collects_failures_and_savings_from_terminal_nodes() {
        let mut tree = DecisionTree::new();
        let root = tree.root();
        for pid in 0..3 {
            tree.push_root_patch(pid);
        }
        let shared = tree.get_or_insert_child(root, record(6), Verdict::Expanding, 0);
        tree.get_or_insert_child(root, record(6), Verdict::Expanding, 2);
        let lone = tree.get_or_insert_child(root, record(5), Verdict::Expanding, 1);
        tree.set_verdict(root, Verdict::InvokeExpanded);
        tree.set_verdict(shared, Verdict::Failed);
        tree.set_verdict(lone, Verdict::Passed);

        let summary = collect_verdicts(&tree).expect("harvest");
        assert_eq!(summary.failed, vec![0, 2]);
        assert_eq!(summary.shared_savings, 1);
        assert_eq!(summary.interior_nodes, 1);
    }

    #[test]
    fn a_root_that_never_branched_is_a_single_terminal() {
        let mut tree = DecisionTree::new();
        tree.push_root_patch(0);
        tree.push_root_patch(1);
        tree.set_verdict(tree.root(), Verdict::Failed);

        let summary = collect_verdicts(&tree).expect("harvest");
        assert_eq!(summary.failed, vec![0, 1]);
        assert_eq!(summary.shared_savings, 1);
        assert_eq!(summary.interior_nodes, 0);
    }

    #[test]
    fn an_expanding_node_is_an_inconsistency() {
        let tree = DecisionTree::new();
        assert_eq!(collect_verdicts(&tree), Err(TreeFault::UnresolvedNode));
    }

    /// Every seeded patch id comes back with exactly one verdict once the
    /// tree is converged: failed ids from `Failed` nodes, the rest left
    /// unresolved by `Passed` leaves.
    #[test]
    fn round_trip_assigns_every_seeded_patch() {
        let mut tree = DecisionTree::new();
        let root = tree.root();
        let seeded: Vec<PatchId> = (0..4).collect();
        for pid in &seeded {
            tree.push_root_patch(*pid);
        }
        let fail = tree.get_or_insert_child(root, record(1), Verdict::Expanding, 0);
        tree.get_or_insert_child(root, record(1), Verdict::Expanding, 3);
        let pass = tree.get_or_insert_child(root, record(2), Verdict::Expanding, 1);
        tree.get_or_insert_child(root, record(2), Verdict::Expanding, 2);
        tree.set_verdict(root, Verdict::InvokeExpanded);
        tree.set_verdict(fail, Verdict::Failed);
        tree.set_verdict(pass, Verdict::Passed);

        let summary = collect_verdicts(&tree).expect("harvest");
        let mut resolved: Vec<PatchId> = summary.failed.clone();
        // Passed leaves keep their patches unresolved; they are the seeded
        // complement of the failed set.
        let unresolved: Vec<PatchId> = seeded
            .iter()
            .copied()
            .filter(|pid| !summary.failed.contains(pid))
            .collect();
        resolved.extend(&unresolved);
        resolved.sort_unstable();
        assert_eq!(resolved, seeded);
        assert_eq!(unresolved, vec![1, 2]);
    }
}
