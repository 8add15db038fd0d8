//! Test-only helpers: a scripted suite that emulates the generated
//! dispatcher protocol without any source rewriting, plus config fixtures.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};

use crate::core::outcome::{ExecOutcome, FieldValue};
use crate::core::tree::{PatchId, Verdict};
use crate::harness::{InstrumentedSuite, TestId, TestStatus};
use crate::io::config::{RunConfig, TestConfig, write_config};
use crate::session::Session;

/// What one patch does at the instrumentation point for one call.
#[derive(Debug, Clone)]
pub struct PatchBehavior {
    /// Field writes applied by the patch body.
    pub writes: Vec<(String, FieldValue)>,
    /// How the patched region terminates.
    pub outcome: ExecOutcome,
}

/// Decides the test's final status from the program state after dispatch.
#[derive(Debug, Clone)]
pub enum PassRule {
    Always,
    Never,
    FieldEquals(String, FieldValue),
}

impl PassRule {
    fn evaluate(&self, state: &BTreeMap<String, FieldValue>) -> TestStatus {
        match self {
            PassRule::Always => TestStatus::Passed,
            PassRule::Never => TestStatus::Failed,
            PassRule::FieldEquals(name, expected) => {
                if state.get(name) == Some(expected) {
                    TestStatus::Passed
                } else {
                    TestStatus::Failed
                }
            }
        }
    }
}

/// Script for one test method. The number of instrumentation-point calls per
/// execution is the longest behavior list across patches; a patch with fewer
/// entries repeats its last one.
#[derive(Debug, Clone)]
pub struct ScriptedTest {
    pub initial: BTreeMap<String, FieldValue>,
    behaviors: BTreeMap<PatchId, Vec<PatchBehavior>>,
    pass_rule: PassRule,
    touches: bool,
}

impl ScriptedTest {
    pub fn new(pass_rule: PassRule) -> Self {
        Self {
            initial: BTreeMap::new(),
            behaviors: BTreeMap::new(),
            pass_rule,
            touches: true,
        }
    }

    pub fn initial_field(mut self, name: &str, value: FieldValue) -> Self {
        self.initial.insert(name.to_string(), value);
        self
    }

    pub fn behavior(mut self, patch_id: PatchId, behavior: PatchBehavior) -> Self {
        self.behaviors.entry(patch_id).or_default().push(behavior);
        self
    }

    /// The test never reaches the instrumentation point.
    pub fn untouched(mut self) -> Self {
        self.touches = false;
        self
    }

    fn calls(&self) -> usize {
        self.behaviors
            .values()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
    }

    fn behavior_for(&self, patch_id: PatchId, call: usize) -> Result<&PatchBehavior> {
        let list = self
            .behaviors
            .get(&patch_id)
            .with_context(|| format!("no behavior scripted for patch {patch_id}"))?;
        Ok(list.get(call).unwrap_or_else(|| {
            list.last().expect("behavior lists are never empty")
        }))
    }

    /// Union of every field the modification point may touch, as the static
    /// rewrite would declare it.
    fn declared_fields(&self) -> BTreeSet<String> {
        let mut fields: BTreeSet<String> = self.initial.keys().cloned().collect();
        for list in self.behaviors.values() {
            for behavior in list {
                for (name, _) in &behavior.writes {
                    fields.insert(name.clone());
                }
            }
        }
        fields
    }
}

/// An [`InstrumentedSuite`] that replays scripted behaviors through the real
/// dispatcher protocol: report-before, invoke, report-after with restore,
/// record, close expansion, descend along the chosen edge.
#[derive(Debug, Default)]
pub struct ScriptedSuite {
    tests: BTreeMap<TestId, ScriptedTest>,
    resets: AtomicUsize,
}

impl ScriptedSuite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_test(mut self, class: &str, method: &str, script: ScriptedTest) -> Self {
        self.tests.insert(TestId::new(class, method), script);
        self
    }

    /// How many times the driver re-initialized global state.
    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::Relaxed)
    }

    fn dispatch_once(
        &self,
        script: &ScriptedTest,
        session: &Session,
        state: &mut BTreeMap<String, FieldValue>,
        call: usize,
    ) -> Result<()> {
        let fields = script.declared_fields();
        if session.is_tree_run() {
            session.consistency_check()?;
            if session.node_verdict()? == Verdict::Expanding {
                for patch_id in session.pending_patches()? {
                    let behavior = script.behavior_for(patch_id, call)?;
                    session.begin_invocation()?;
                    for field in &fields {
                        let value = state.get(field).cloned().unwrap_or(FieldValue::Null);
                        session.record_field_before(field, value)?;
                    }
                    // The patch body.
                    for (name, value) in &behavior.writes {
                        state.insert(name.clone(), value.clone());
                    }
                    for field in &fields {
                        let value = state.get(field).cloned().unwrap_or(FieldValue::Null);
                        let restore = session.record_field_after(field, value)?;
                        state.insert(field.clone(), restore);
                    }
                    session.complete_invocation(behavior.outcome.clone(), patch_id)?;
                }
                session.finish_expansion()?;
            }
            // Continue as the representative of the chosen edge.
            let edge = session.advance_to_expandable_edge()?;
            for (name, value) in &edge.record.changed_fields {
                state.insert(name.clone(), value.clone());
            }
        } else {
            session.mark_touched();
            let patch_id = session
                .single_patch_id()
                .context("single run armed without a patch id")?;
            let behavior = script.behavior_for(patch_id, call)?;
            for (name, value) in &behavior.writes {
                state.insert(name.clone(), value.clone());
            }
        }
        Ok(())
    }
}

impl InstrumentedSuite for ScriptedSuite {
    fn reset_globals(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    fn run_test(&self, test: &TestId, session: &Session) -> Result<TestStatus> {
        let script = self
            .tests
            .get(test)
            .with_context(|| format!("unknown test {test}"))?;
        let mut state = script.initial.clone();
        if script.touches {
            for call in 0..script.calls() {
                self.dispatch_once(script, session, &mut state, call)?;
            }
        }
        Ok(script.pass_rule.evaluate(&state))
    }
}

/// A minimal valid config with the given eligibility bitmap and a 5-second
/// timeout per test.
pub fn run_config(
    patch_count: usize,
    tree_eligible: Vec<bool>,
    tests: Vec<(&str, &str)>,
) -> RunConfig {
    RunConfig {
        patch_count,
        use_test_selection: false,
        tree_eligible,
        tests: tests
            .into_iter()
            .map(|(class, method)| TestConfig {
                class: class.to_string(),
                method: method.to_string(),
                timeout_secs: 5,
            })
            .collect(),
    }
}

/// Write a config into a fresh temp dir for CLI and loader tests.
pub fn temp_config(cfg: &RunConfig) -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("tempdir")?;
    let path = dir.path().join("run.toml");
    write_config(&path, cfg)?;
    Ok((dir, path))
}
