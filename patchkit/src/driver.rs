//! Top-level run loop: scores every candidate patch against every test.
//!
//! Per test, tree-eligible patches share executions through the decision
//! tree until it converges; everything else (ineligible patches, or all of
//! them after a tree fault) runs one patch per execution. A patch that fails
//! any test is excluded from all later tests; once every patch has failed,
//! the remaining tests are skipped outright.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::core::tree::Verdict;
use crate::harness::{InstrumentedSuite, TestStatus};
use crate::io::config::{RunConfig, TestConfig};
use crate::io::report::{RunReport, Telemetry, TestTrace, summary_line};
use crate::session::Session;
use crate::worker;

pub struct Driver<S> {
    suite: Arc<S>,
    config: RunConfig,
}

impl<S: InstrumentedSuite + 'static> Driver<S> {
    pub fn new(suite: Arc<S>, config: RunConfig) -> Self {
        Self { suite, config }
    }

    /// Run every test against every still-surviving patch and report one
    /// status per patch id.
    #[instrument(skip_all, fields(patches = self.config.patch_count, tests = self.config.tests.len()))]
    pub fn run(&self) -> RunReport {
        let started_at = Utc::now();
        let mut failed = vec![false; self.config.patch_count];
        let mut telemetry = Telemetry::default();
        let mut tests = Vec::new();

        for (index, test_cfg) in self.config.tests.iter().enumerate() {
            if failed.iter().all(|f| *f) {
                info!("every patch has failed; skipping the remaining tests");
                break;
            }
            info!(
                test = %test_cfg.identity(),
                index,
                timeout_secs = test_cfg.timeout_secs,
                "scoring test"
            );
            tests.push(self.score_test(test_cfg, &mut failed, &mut telemetry));
        }

        let statuses: Vec<TestStatus> = failed
            .iter()
            .map(|f| if *f { TestStatus::Failed } else { TestStatus::Passed })
            .collect();
        info!(summary = %summary_line(&statuses), "run complete");

        RunReport {
            started_at,
            finished_at: Utc::now(),
            statuses,
            telemetry,
            tests,
        }
    }

    fn score_test(
        &self,
        test_cfg: &TestConfig,
        failed: &mut [bool],
        telemetry: &mut Telemetry,
    ) -> TestTrace {
        let test = test_cfg.identity();
        let timeout = Duration::from_secs(test_cfg.timeout_secs);
        let session = Session::new();
        let mut trace = TestTrace {
            class: test_cfg.class.clone(),
            method: test_cfg.method.clone(),
            tree_runs: 0,
            single_runs: 0,
            selection_skips: 0,
            fell_back: false,
            fault: None,
            failed_patches: Vec::new(),
        };

        let mut tree_patches = 0usize;
        for pid in 0..self.config.patch_count {
            if !failed[pid] && self.config.is_tree_eligible(pid) {
                session.seed_root_patch(pid);
                tree_patches += 1;
            }
        }

        if tree_patches > 0 {
            while session.expanding_leaves() > 0 {
                trace.tree_runs += 1;
                telemetry.executions += 1;
                debug!(expanding = session.expanding_leaves(), "tree run");
                self.suite.reset_globals();
                session.begin_tree_run();
                let status = worker::run_test_with_timeout(&self.suite, &test, &session, timeout);
                session.finalize_test_run(status);
                if let Some(fault) = session.fault() {
                    warn!(%test, %fault, "abandoning shared tree; one patch per run from here");
                    trace.fault = Some(fault.to_string());
                    trace.fell_back = true;
                    break;
                }
            }

            if !trace.fell_back {
                debug!(tree = %session.render_tree(), "tree converged");
                match session.harvest() {
                    Ok(summary) => {
                        for pid in summary.failed {
                            if !failed[pid] {
                                debug!(pid, "patch failed by shared tree");
                                failed[pid] = true;
                                trace.failed_patches.push(pid);
                            }
                        }
                        // A tree that converged at the root never reached the
                        // instrumentation point, so its savings belong to the
                        // whole-test accounting, not to sharing.
                        if session.root_verdict() == Verdict::InvokeExpanded {
                            telemetry.shared_savings += summary.shared_savings;
                        } else {
                            telemetry.selection_savings += summary.shared_savings;
                        }
                        if summary.interior_nodes > 1 {
                            telemetry.nontrivial_trees += 1;
                        }
                    }
                    Err(fault) => {
                        warn!(%test, %fault, "harvest found an inconsistent tree");
                        trace.fault = Some(fault.to_string());
                        trace.fell_back = true;
                    }
                }
            }
        }

        // Whole-test verdict feeding the selection gate below. A fallback
        // leaves it undecided.
        let mut root_verdict = if trace.fell_back {
            Verdict::Expanding
        } else {
            session.root_verdict()
        };

        for pid in 0..self.config.patch_count {
            if self.config.is_tree_eligible(pid) && !trace.fell_back {
                continue; // covered by the tree above
            }
            if failed[pid] {
                continue; // already failed an earlier test
            }

            if self.config.use_test_selection && root_verdict.is_terminal() {
                trace.selection_skips += 1;
                telemetry.selection_savings += 1;
                debug!(pid, %root_verdict, "skipped single run; whole-test verdict decides");
                // Only an observed failure transfers to an unseen patch; a
                // passing root says nothing about a patch it never executed.
                if root_verdict == Verdict::Failed {
                    failed[pid] = true;
                    trace.failed_patches.push(pid);
                }
                continue;
            }

            trace.single_runs += 1;
            telemetry.executions += 1;
            debug!(pid, "single run");
            self.suite.reset_globals();
            session.begin_single_run(pid);
            let status = worker::run_test_with_timeout(&self.suite, &test, &session, timeout);
            if status == TestStatus::Failed {
                debug!(pid, "patch failed by single run");
                failed[pid] = true;
                trace.failed_patches.push(pid);
            }
            if !session.touched() {
                // The run never reached the patched region: its outcome is
                // patch-independent and can stand in for the root verdict.
                root_verdict = status.as_verdict();
            }
        }

        trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::outcome::{ExecOutcome, FieldValue};
    use crate::test_support::{PassRule, PatchBehavior, ScriptedSuite, ScriptedTest, run_config};

    fn write_x(value: i64) -> PatchBehavior {
        PatchBehavior {
            writes: vec![("x".to_string(), FieldValue::Int(value))],
            outcome: ExecOutcome::Return(FieldValue::Int(value)),
        }
    }

    #[test]
    fn remaining_tests_are_skipped_once_every_patch_failed() {
        // Test 0 fails both patches; test 1 must never execute.
        let suite = ScriptedSuite::new()
            .with_test(
                "CalcTest",
                "alwaysFails",
                ScriptedTest::new(PassRule::Never)
                    .behavior(0, write_x(1))
                    .behavior(1, write_x(2)),
            )
            .with_test(
                "CalcTest",
                "neverReached",
                ScriptedTest::new(PassRule::Always)
                    .behavior(0, write_x(1))
                    .behavior(1, write_x(2)),
            );
        let config = run_config(
            2,
            vec![true, true],
            vec![("CalcTest", "alwaysFails"), ("CalcTest", "neverReached")],
        );

        let driver = Driver::new(Arc::new(suite), config);
        let report = driver.run();

        assert_eq!(report.summary_line(), "FF");
        assert_eq!(report.tests.len(), 1);
    }

    #[test]
    fn untouched_single_run_feeds_the_selection_gate() {
        // No patch is tree-eligible and the test never reaches the patched
        // region. The first single run fails patch-independently; the gate
        // then fails the rest without running them.
        let suite = ScriptedSuite::new().with_test(
            "CalcTest",
            "brokenSetup",
            ScriptedTest::new(PassRule::Never)
                .untouched()
                .behavior(0, write_x(1))
                .behavior(1, write_x(2))
                .behavior(2, write_x(3)),
        );
        let mut config = run_config(
            3,
            vec![false, false, false],
            vec![("CalcTest", "brokenSetup")],
        );
        config.use_test_selection = true;

        let driver = Driver::new(Arc::new(suite), config);
        let report = driver.run();

        assert_eq!(report.summary_line(), "FFF");
        assert_eq!(report.telemetry.executions, 1);
        assert_eq!(report.telemetry.selection_savings, 2);
        assert_eq!(report.tests[0].single_runs, 1);
        assert_eq!(report.tests[0].selection_skips, 2);
    }

    #[test]
    fn passed_root_skips_but_never_clears_an_unseen_patch() {
        // Same shape, but the untouched run passes: later patches are
        // skipped yet stay unresolved, surviving as Passed only because no
        // test ever failed them.
        let suite = ScriptedSuite::new().with_test(
            "CalcTest",
            "patchIndependentPass",
            ScriptedTest::new(PassRule::Always)
                .untouched()
                .behavior(0, write_x(1))
                .behavior(1, write_x(2)),
        );
        let mut config = run_config(
            2,
            vec![false, false],
            vec![("CalcTest", "patchIndependentPass")],
        );
        config.use_test_selection = true;

        let driver = Driver::new(Arc::new(suite), config);
        let report = driver.run();

        assert_eq!(report.summary_line(), "PP");
        assert_eq!(report.telemetry.executions, 1);
        assert_eq!(report.tests[0].selection_skips, 1);
        assert!(report.tests[0].failed_patches.is_empty());
    }
}
