//! Structural invariants checked by exhaustive recount.
//!
//! The tree maintains `expanding_count` incrementally; this module recomputes
//! it from scratch so tests (and debug assertions) can catch drift after any
//! verdict change.

use crate::core::tree::{DecisionTree, NodeId, Verdict};

/// Recount every subtree and collect violations:
/// - `expanding_count` must equal the number of `Expanding` nodes in the
///   subtree, the node itself included
/// - terminal nodes must not carry children
/// - every non-root node must have been reached by at least one patch
/// - every child's parent link must point back at its owner
pub fn validate_tree(tree: &DecisionTree) -> Vec<String> {
    let mut errors = Vec::new();
    validate_node(tree, tree.root(), true, &mut errors);
    errors
}

fn validate_node(
    tree: &DecisionTree,
    id: NodeId,
    is_root: bool,
    errors: &mut Vec<String>,
) -> usize {
    let verdict = tree.verdict(id);
    let mut recount = usize::from(verdict == Verdict::Expanding);

    if verdict.is_terminal() && !tree.children(id).is_empty() {
        errors.push(format!("{id:?}: {verdict} node still has children"));
    }
    if !is_root && tree.patch_ids(id).is_empty() {
        errors.push(format!("{id:?}: non-root node with empty patch set"));
    }

    for (_, child) in tree.children(id) {
        if tree.parent(*child) != Some(id) {
            errors.push(format!("{child:?}: parent link does not point at {id:?}"));
        }
        recount += validate_node(tree, *child, false, errors);
    }

    if recount != tree.expanding_count(id) {
        errors.push(format!(
            "{id:?}: expanding_count {} but recount found {}",
            tree.expanding_count(id),
            recount
        ));
    }
    recount
}
