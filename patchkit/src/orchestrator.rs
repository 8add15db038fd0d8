//! Traversal control for one test's decision tree.
//!
//! One orchestrator exists per test-run series, constructed fresh and handed
//! to the instrumented call sites by reference (never ambient global state).
//! It owns the traversal cursor, the single in-flight invocation capture,
//! the recorded worker identity, and the sticky fault that the run driver
//! consults after every execution.

use std::thread::{self, ThreadId};

use tracing::error;

use crate::core::fault::TreeFault;
use crate::core::outcome::{ExecOutcome, FieldValue};
use crate::core::record::{InvocationRecord, InvokeCapture};
use crate::core::tree::{DecisionTree, NodeId, PatchId, Verdict};
use crate::harness::TestStatus;

#[derive(Debug)]
enum Mode {
    Idle,
    /// Shared traversal over the decision tree.
    Tree { cursor: NodeId },
    /// Degraded path: exactly one patch, no tree bookkeeping.
    Single { patch_id: PatchId, touched: bool },
}

/// The edge chosen to continue the current execution. All patch ids on it
/// are state-equivalent; the dispatcher restores the saved context of the
/// representative and the test runs on as that variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChosenEdge {
    pub record: InvocationRecord,
    pub representative: PatchId,
}

#[derive(Debug)]
pub struct Orchestrator {
    mode: Mode,
    open: Option<InvokeCapture>,
    worker: Option<ThreadId>,
    fault: Option<TreeFault>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            mode: Mode::Idle,
            open: None,
            worker: None,
            fault: None,
        }
    }

    /// Arm a tree-mode execution starting at the root. Transient state
    /// (open invocation, worker identity, fault) is reset; the tree itself
    /// persists across executions.
    pub fn begin_tree_run(&mut self, tree: &DecisionTree) {
        self.mode = Mode::Tree {
            cursor: tree.root(),
        };
        self.open = None;
        self.worker = None;
        self.fault = None;
    }

    /// Arm a single-run execution for one explicit patch id. The fault slot
    /// is deliberately left alone: fallback single runs legitimately execute
    /// after a fatal tree fault.
    pub fn begin_single_run(&mut self, patch_id: PatchId) {
        self.mode = Mode::Single {
            patch_id,
            touched: false,
        };
        self.open = None;
        self.worker = None;
    }

    pub fn is_tree_run(&self) -> bool {
        matches!(self.mode, Mode::Tree { .. })
    }

    pub fn single_patch_id(&self) -> Option<PatchId> {
        match self.mode {
            Mode::Single { patch_id, .. } => Some(patch_id),
            _ => None,
        }
    }

    /// The instrumentation point was reached in single-run mode.
    pub fn mark_touched(&mut self) {
        if let Mode::Single { touched, .. } = &mut self.mode {
            *touched = true;
        }
    }

    pub fn touched(&self) -> bool {
        matches!(self.mode, Mode::Single { touched: true, .. })
    }

    pub fn fault(&self) -> Option<&TreeFault> {
        self.fault.as_ref()
    }

    /// Runtime guard at every reach of the instrumentation point. Fails on
    /// reentrancy (a patch calling back into the patched region), on a
    /// second program thread arriving here, and on a traversal that landed
    /// on an already-terminal node (a non-deterministic test).
    pub fn consistency_check(&mut self, tree: &DecisionTree) -> Result<(), TreeFault> {
        if let Some(fault) = &self.fault {
            return Err(fault.clone());
        }
        if self.open.is_some() {
            return Err(self.fail(TreeFault::ReentrantInvocation));
        }

        let current = thread::current().id();
        match self.worker {
            None => self.worker = Some(current),
            Some(recorded) if recorded != current => {
                return Err(self.fail(TreeFault::CrossThread));
            }
            Some(_) => {}
        }

        let cursor = self.cursor()?;
        match tree.verdict(cursor) {
            Verdict::Expanding | Verdict::InvokeExpanded => Ok(()),
            terminal => Err(self.fail(TreeFault::ExpandTerminalNode(terminal))),
        }
    }

    /// Verdict of the node the traversal currently points at.
    pub fn node_verdict(&mut self, tree: &DecisionTree) -> Result<Verdict, TreeFault> {
        let cursor = self.cursor()?;
        Ok(tree.verdict(cursor))
    }

    /// Patch ids that must all be invoked while expanding the current node.
    pub fn pending_patches(&mut self, tree: &DecisionTree) -> Result<Vec<PatchId>, TreeFault> {
        let cursor = self.cursor()?;
        Ok(tree.patch_ids(cursor).to_vec())
    }

    /// Open an invocation capture. At most one invocation may be in flight;
    /// a second open means the patch body re-entered the patched region.
    pub fn begin_invocation(&mut self) -> Result<(), TreeFault> {
        if let Some(fault) = &self.fault {
            return Err(fault.clone());
        }
        self.cursor()?;
        if self.open.is_some() {
            return Err(self.fail(TreeFault::ReentrantInvocation));
        }
        self.open = Some(InvokeCapture::new());
        Ok(())
    }

    pub fn record_field_before(&mut self, name: &str, value: FieldValue) -> Result<(), TreeFault> {
        match &mut self.open {
            Some(capture) => {
                capture.record_before(name, value);
                Ok(())
            }
            None => Err(self.fail(TreeFault::NoOpenInvocation)),
        }
    }

    /// Report a field after the patch body ran; returns the value the
    /// dispatcher must restore before the next sibling invocation.
    pub fn record_field_after(
        &mut self,
        name: &str,
        value: FieldValue,
    ) -> Result<FieldValue, TreeFault> {
        match &mut self.open {
            Some(capture) => Ok(capture.record_after(name, value)),
            None => Err(self.fail(TreeFault::NoOpenInvocation)),
        }
    }

    /// Close the open invocation into a record and merge it into the current
    /// node's children under `patch_id`.
    pub fn complete_invocation(
        &mut self,
        tree: &mut DecisionTree,
        outcome: ExecOutcome,
        patch_id: PatchId,
    ) -> Result<(), TreeFault> {
        let cursor = self.cursor()?;
        let capture = match self.open.take() {
            Some(capture) => capture,
            None => return Err(self.fail(TreeFault::NoOpenInvocation)),
        };
        let record = capture.into_record(outcome);
        tree.get_or_insert_child(cursor, record, Verdict::Expanding, patch_id);
        Ok(())
    }

    /// All pending patches at the current node have been invoked.
    pub fn finish_expansion(&mut self, tree: &mut DecisionTree) -> Result<(), TreeFault> {
        if let Some(fault) = &self.fault {
            return Err(fault.clone());
        }
        if self.open.is_some() {
            return Err(self.fail(TreeFault::ReentrantInvocation));
        }
        let cursor = self.cursor()?;
        match tree.verdict(cursor) {
            Verdict::Expanding => {
                tree.set_verdict(cursor, Verdict::InvokeExpanded);
                Ok(())
            }
            other => Err(self.fail(TreeFault::CloseUnexpandedNode(other))),
        }
    }

    /// Descend to the first child edge with unresolved descendants and hand
    /// the dispatcher the context to continue with.
    pub fn advance_to_expandable_edge(
        &mut self,
        tree: &DecisionTree,
    ) -> Result<ChosenEdge, TreeFault> {
        let cursor = self.cursor()?;
        let Some((record, child)) = tree.find_expandable_edge(cursor) else {
            return Err(self.fail(TreeFault::NoExpandableEdge));
        };
        let record = record.clone();
        let representative = tree.patch_ids(child)[0];
        self.mode = Mode::Tree { cursor: child };
        Ok(ChosenEdge {
            record,
            representative,
        })
    }

    /// Record the test's final pass/fail on the leaf the traversal stopped
    /// at. Runs on the driver side of the harness boundary, so a violation
    /// is recorded as the sticky fault rather than propagated.
    pub fn finalize_test_run(&mut self, tree: &mut DecisionTree, status: TestStatus) {
        let cursor = match self.mode {
            Mode::Tree { cursor } => cursor,
            _ => {
                self.fail(TreeFault::NotInTreeMode);
                return;
            }
        };
        match tree.verdict(cursor) {
            Verdict::Expanding => tree.set_verdict(cursor, status.as_verdict()),
            other => {
                self.fail(TreeFault::FinalizeOffLeaf(other));
            }
        }
    }

    fn cursor(&mut self) -> Result<NodeId, TreeFault> {
        match self.mode {
            Mode::Tree { cursor } => Ok(cursor),
            _ => Err(self.fail(TreeFault::NotInTreeMode)),
        }
    }

    /// Record the first fault (sticky) and hand the caller this one.
    fn fail(&mut self, fault: TreeFault) -> TreeFault {
        error!(%fault, "tree run aborted");
        if self.fault.is_none() {
            self.fault = Some(fault.clone());
        }
        fault
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    fn int(v: i64) -> FieldValue {
        FieldValue::Int(v)
    }

    fn expand_one(
        orch: &mut Orchestrator,
        tree: &mut DecisionTree,
        patch_id: PatchId,
        value: i64,
    ) {
        orch.begin_invocation().expect("begin");
        orch.record_field_before("x", int(0)).expect("before");
        let restore = orch.record_field_after("x", int(value)).expect("after");
        assert_eq!(restore, int(0));
        orch.complete_invocation(tree, ExecOutcome::Return(int(value)), patch_id)
            .expect("complete");
    }

    #[test]
    fn expansion_descends_to_the_representative_edge() {
        let mut tree = DecisionTree::new();
        tree.push_root_patch(0);
        tree.push_root_patch(1);
        let mut orch = Orchestrator::new();
        orch.begin_tree_run(&tree);

        orch.consistency_check(&tree).expect("checkpoint");
        assert_eq!(orch.node_verdict(&tree).expect("verdict"), Verdict::Expanding);
        for pid in orch.pending_patches(&tree).expect("patches") {
            expand_one(&mut orch, &mut tree, pid, 5);
        }
        orch.finish_expansion(&mut tree).expect("finish");

        let edge = orch.advance_to_expandable_edge(&tree).expect("advance");
        assert_eq!(edge.representative, 0);
        assert_eq!(
            edge.record.changed_fields,
            BTreeMap::from([("x".to_string(), int(5))])
        );

        orch.finalize_test_run(&mut tree, TestStatus::Passed);
        assert!(orch.fault().is_none());
        assert_eq!(tree.expanding_count(tree.root()), 0);
    }

    #[test]
    fn finalize_off_a_leaf_records_a_sticky_fault() {
        let mut tree = DecisionTree::new();
        tree.push_root_patch(0);
        let mut orch = Orchestrator::new();
        orch.begin_tree_run(&tree);

        expand_one(&mut orch, &mut tree, 0, 5);
        orch.finish_expansion(&mut tree).expect("finish");
        // Traversal pointer still on the InvokeExpanded node.
        orch.finalize_test_run(&mut tree, TestStatus::Passed);

        assert_eq!(
            orch.fault(),
            Some(&TreeFault::FinalizeOffLeaf(Verdict::InvokeExpanded))
        );
    }

    #[test]
    fn reentrant_invocation_is_fatal() {
        let mut tree = DecisionTree::new();
        tree.push_root_patch(0);
        let mut orch = Orchestrator::new();
        orch.begin_tree_run(&tree);

        orch.begin_invocation().expect("first open");
        assert_eq!(
            orch.begin_invocation(),
            Err(TreeFault::ReentrantInvocation)
        );
        // The same condition trips the checkpoint on a nested dispatch.
        assert_eq!(
            orch.consistency_check(&tree),
            Err(TreeFault::ReentrantInvocation)
        );
    }

    #[test]
    fn second_thread_at_the_instrumentation_point_is_fatal() {
        let tree = DecisionTree::new();
        let mut orch = Orchestrator::new();
        orch.begin_tree_run(&tree);
        orch.consistency_check(&tree).expect("first thread");

        let shared = Mutex::new((orch, tree));
        std::thread::scope(|scope| {
            scope.spawn(|| {
                let (orch, tree) = &mut *shared.lock().expect("lock");
                assert_eq!(orch.consistency_check(tree), Err(TreeFault::CrossThread));
            });
        });

        let (orch, _) = &*shared.lock().expect("lock");
        assert_eq!(orch.fault(), Some(&TreeFault::CrossThread));
    }

    #[test]
    fn advancing_with_no_expandable_edge_is_fatal() {
        let mut tree = DecisionTree::new();
        tree.push_root_patch(0);
        let mut orch = Orchestrator::new();
        orch.begin_tree_run(&tree);

        expand_one(&mut orch, &mut tree, 0, 5);
        orch.finish_expansion(&mut tree).expect("finish");
        orch.advance_to_expandable_edge(&tree).expect("advance");
        orch.finalize_test_run(&mut tree, TestStatus::Passed);

        // Re-enter a tree whose subtrees are all resolved: the root is
        // InvokeExpanded but no child is expandable anymore.
        orch.begin_tree_run(&tree);
        assert_eq!(
            orch.advance_to_expandable_edge(&tree),
            Err(TreeFault::NoExpandableEdge)
        );
    }

    #[test]
    fn terminal_cursor_fails_the_checkpoint() {
        let mut tree = DecisionTree::new();
        tree.push_root_patch(0);
        tree.set_verdict(tree.root(), Verdict::Failed);
        let mut orch = Orchestrator::new();
        orch.begin_tree_run(&tree);

        assert_eq!(
            orch.consistency_check(&tree),
            Err(TreeFault::ExpandTerminalNode(Verdict::Failed))
        );
    }

    #[test]
    fn faults_stick_until_the_next_tree_run() {
        let mut tree = DecisionTree::new();
        tree.push_root_patch(0);
        let mut orch = Orchestrator::new();
        orch.begin_tree_run(&tree);

        orch.begin_invocation().expect("open");
        let _ = orch.begin_invocation();
        assert_eq!(
            orch.consistency_check(&tree),
            Err(TreeFault::ReentrantInvocation)
        );

        // Single-run mode leaves the fault in place for the driver to read.
        orch.begin_single_run(0);
        assert_eq!(orch.fault(), Some(&TreeFault::ReentrantInvocation));
        assert_eq!(orch.single_patch_id(), Some(0));
        assert!(!orch.touched());
        orch.mark_touched();
        assert!(orch.touched());

        // A fresh tree run clears it.
        orch.begin_tree_run(&tree);
        assert!(orch.fault().is_none());
    }
}
