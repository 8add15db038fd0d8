//! Shared handle carrying one test's orchestrator and decision tree.
//!
//! The driver thread arms each execution and reads verdicts; the worker
//! thread drives the dispatcher protocol from inside the test. Both go
//! through this handle, which serializes access with a mutex. A worker that
//! panicked while holding the lock does not poison the run: the state is
//! taken as-is and the consistency checks catch any divergence it left
//! behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::core::fault::TreeFault;
use crate::core::harvest::{self, HarvestSummary};
use crate::core::outcome::{ExecOutcome, FieldValue};
use crate::core::tree::{DecisionTree, PatchId, Verdict};
use crate::harness::TestStatus;
use crate::orchestrator::{ChosenEdge, Orchestrator};

#[derive(Debug)]
struct SessionState {
    orchestrator: Orchestrator,
    tree: DecisionTree,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<SessionState>,
    cancelled: AtomicBool,
}

/// Cloneable handle to one test's shared execution state.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SessionState {
                    orchestrator: Orchestrator::new(),
                    tree: DecisionTree::new(),
                }),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // Driver side -----------------------------------------------------------

    pub fn seed_root_patch(&self, patch_id: PatchId) {
        self.lock().tree.push_root_patch(patch_id);
    }

    pub fn root_patch_count(&self) -> usize {
        let state = self.lock();
        state.tree.patch_ids(state.tree.root()).len()
    }

    /// Unresolved leaves left in the whole tree.
    pub fn expanding_leaves(&self) -> usize {
        let state = self.lock();
        state.tree.expanding_count(state.tree.root())
    }

    pub fn root_verdict(&self) -> Verdict {
        let state = self.lock();
        state.tree.verdict(state.tree.root())
    }

    pub fn begin_tree_run(&self) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.orchestrator.begin_tree_run(&state.tree);
    }

    pub fn begin_single_run(&self, patch_id: PatchId) {
        self.lock().orchestrator.begin_single_run(patch_id);
    }

    pub fn finalize_test_run(&self, status: TestStatus) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.orchestrator.finalize_test_run(&mut state.tree, status);
    }

    pub fn fault(&self) -> Option<TreeFault> {
        self.lock().orchestrator.fault().cloned()
    }

    pub fn touched(&self) -> bool {
        self.lock().orchestrator.touched()
    }

    pub fn harvest(&self) -> Result<HarvestSummary, TreeFault> {
        harvest::collect_verdicts(&self.lock().tree)
    }

    pub fn render_tree(&self) -> String {
        self.lock().tree.render()
    }

    /// Snapshot for invariant checks in tests.
    pub fn tree_snapshot(&self) -> DecisionTree {
        self.lock().tree.clone()
    }

    /// Best-effort cancellation: raised by the driver on timeout, polled by
    /// cooperative suites. Nothing forces an ignoring worker to stop.
    pub fn request_cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn cancel_requested(&self) -> bool {
        self.inner.cancelled.load(Ordering::Relaxed)
    }

    // Dispatcher side -------------------------------------------------------

    pub fn is_tree_run(&self) -> bool {
        self.lock().orchestrator.is_tree_run()
    }

    pub fn consistency_check(&self) -> Result<(), TreeFault> {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.orchestrator.consistency_check(&state.tree)
    }

    pub fn node_verdict(&self) -> Result<Verdict, TreeFault> {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.orchestrator.node_verdict(&state.tree)
    }

    pub fn pending_patches(&self) -> Result<Vec<PatchId>, TreeFault> {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.orchestrator.pending_patches(&state.tree)
    }

    pub fn begin_invocation(&self) -> Result<(), TreeFault> {
        self.lock().orchestrator.begin_invocation()
    }

    pub fn record_field_before(&self, name: &str, value: FieldValue) -> Result<(), TreeFault> {
        self.lock().orchestrator.record_field_before(name, value)
    }

    pub fn record_field_after(&self, name: &str, value: FieldValue) -> Result<FieldValue, TreeFault> {
        self.lock().orchestrator.record_field_after(name, value)
    }

    pub fn complete_invocation(
        &self,
        outcome: ExecOutcome,
        patch_id: PatchId,
    ) -> Result<(), TreeFault> {
        let mut guard = self.lock();
        let state = &mut *guard;
        state
            .orchestrator
            .complete_invocation(&mut state.tree, outcome, patch_id)
    }

    pub fn finish_expansion(&self) -> Result<(), TreeFault> {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.orchestrator.finish_expansion(&mut state.tree)
    }

    pub fn advance_to_expandable_edge(&self) -> Result<ChosenEdge, TreeFault> {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.orchestrator.advance_to_expandable_edge(&state.tree)
    }

    pub fn single_patch_id(&self) -> Option<PatchId> {
        self.lock().orchestrator.single_patch_id()
    }

    pub fn mark_touched(&self) {
        self.lock().orchestrator.mark_touched();
    }
}
