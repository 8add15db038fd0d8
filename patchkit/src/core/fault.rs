//! Tree-consistency faults.
//!
//! These are the fatal-but-contained failures: any of them aborts the shared
//! tree walk for the current test and forces the driver back to one-patch-
//! per-execution, but never crashes the run or touches other tests' trees.

use std::fmt;

use crate::core::tree::Verdict;

/// A detected violation of the shared-execution traversal contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeFault {
    /// The instrumentation point was reached while an invocation was still
    /// open: a patch body called back into the patched method.
    ReentrantInvocation,
    /// A second thread reached the instrumentation point during the same
    /// tree run. The traversal state has no locking discipline across
    /// program threads, so this is detected and aborted rather than served.
    CrossThread,
    /// The traversal arrived at a node that is already `Passed`/`Failed`:
    /// the captured state diverged between repeated executions of the test.
    ExpandTerminalNode(Verdict),
    /// A node with unresolved descendants had no expandable child edge.
    NoExpandableEdge,
    /// The test finished while the traversal pointer was not on an
    /// `Expanding` leaf: the walk did not end where the previous executions
    /// said it would.
    FinalizeOffLeaf(Verdict),
    /// Expansion was closed on a node that was not `Expanding`.
    CloseUnexpandedNode(Verdict),
    /// A field report or invocation close arrived with no open invocation.
    NoOpenInvocation,
    /// A tree-mode operation was issued while in single-run mode (or before
    /// any run was begun).
    NotInTreeMode,
    /// Verdict collection met a node still `Expanding` in a tree that was
    /// supposed to be fully resolved.
    UnresolvedNode,
    /// Verdict collection met a terminal node no patch ever reached.
    EmptyPatchSet,
}

impl fmt::Display for TreeFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeFault::ReentrantInvocation => {
                write!(f, "recursive call into the patched region")
            }
            TreeFault::CrossThread => {
                write!(f, "instrumentation point reached from a second thread")
            }
            TreeFault::ExpandTerminalNode(v) => {
                write!(f, "unstable test: expanding on a {v} node")
            }
            TreeFault::NoExpandableEdge => write!(f, "decision tree inconsistent: no expandable edge"),
            TreeFault::FinalizeOffLeaf(v) => {
                write!(f, "unstable test: stopped on a non-leaf {v} node")
            }
            TreeFault::CloseUnexpandedNode(v) => {
                write!(f, "finish_expansion on a {v} node")
            }
            TreeFault::NoOpenInvocation => write!(f, "no invocation is open"),
            TreeFault::NotInTreeMode => write!(f, "tree operation outside a tree run"),
            TreeFault::UnresolvedNode => {
                write!(f, "decision tree inconsistent: unresolved node after convergence")
            }
            TreeFault::EmptyPatchSet => {
                write!(f, "decision tree inconsistent: terminal node with no patches")
            }
        }
    }
}

impl std::error::Error for TreeFault {}
