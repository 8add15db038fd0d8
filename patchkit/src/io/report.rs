//! Run results: per-patch statuses, per-test traces, and the counters that
//! show what the sharing actually bought.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::tree::PatchId;
use crate::harness::TestStatus;

/// Aggregate execution counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Test executions actually performed (tree runs plus single runs).
    pub executions: usize,
    /// Executions avoided because state-equivalent patches shared a path.
    pub shared_savings: usize,
    /// Executions avoided because the whole-test root verdict already
    /// decided the outcome.
    pub selection_savings: usize,
    /// Tests whose tree branched below the root (sharing did real work).
    pub nontrivial_trees: usize,
}

/// What happened while scoring one test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestTrace {
    pub class: String,
    pub method: String,
    pub tree_runs: usize,
    pub single_runs: usize,
    pub selection_skips: usize,
    /// Tree walk was abandoned and every patch re-ran one at a time.
    pub fell_back: bool,
    /// Render of the fault that forced the fallback, if any.
    pub fault: Option<String>,
    /// Patches this test failed, in discovery order.
    pub failed_patches: Vec<PatchId>,
}

/// Final output of a driver run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One status per patch id, in patch-id order.
    pub statuses: Vec<TestStatus>,
    pub telemetry: Telemetry,
    pub tests: Vec<TestTrace>,
}

impl RunReport {
    /// Compact one-line rendering, one character per patch in id order.
    pub fn summary_line(&self) -> String {
        summary_line(&self.statuses)
    }
}

/// `P` for a surviving patch, `F` for a failed one.
pub fn summary_line(statuses: &[TestStatus]) -> String {
    statuses
        .iter()
        .map(|status| match status {
            TestStatus::Passed => 'P',
            TestStatus::Failed => 'F',
        })
        .collect()
}

/// Atomically write the report as pretty JSON.
pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(report).context("serialize report")?;
    buf.push('\n');
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create report dir {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write temp report {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace report {}", path.display()))?;
    Ok(())
}

/// Load a previously written report.
pub fn load_report(path: &Path) -> Result<RunReport> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_line_follows_patch_id_order() {
        let statuses = vec![TestStatus::Passed, TestStatus::Failed, TestStatus::Passed];
        assert_eq!(summary_line(&statuses), "PFP");
    }

    #[test]
    fn report_round_trips_through_json() {
        let report = RunReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            statuses: vec![TestStatus::Failed, TestStatus::Passed],
            telemetry: Telemetry {
                executions: 4,
                shared_savings: 2,
                selection_savings: 1,
                nontrivial_trees: 1,
            },
            tests: vec![TestTrace {
                class: "com.example.CalcTest".to_string(),
                method: "testDivide".to_string(),
                tree_runs: 2,
                single_runs: 1,
                selection_skips: 1,
                fell_back: false,
                fault: None,
                failed_patches: vec![0],
            }],
        };

        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("out").join("report.json");
        write_report(&path, &report).expect("write");
        let loaded = load_report(&path).expect("load");
        assert_eq!(loaded, report);
        assert_eq!(loaded.summary_line(), "FP");
    }
}
