//! Run configuration persisted as TOML.
//!
//! Written once by the pipeline that prepares a run (patch glob, purity
//! analysis, test listing) and loaded once when the driver starts.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::tree::PatchId;
use crate::harness::TestId;

static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*(\.[A-Za-z_$][A-Za-z0-9_$]*)*$").expect("class regex")
});
static METHOD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("method regex"));

/// One test method plus its wall-clock budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestConfig {
    pub class: String,
    pub method: String,
    pub timeout_secs: u64,
}

impl TestConfig {
    pub fn identity(&self) -> TestId {
        TestId::new(self.class.clone(), self.method.clone())
    }
}

/// Everything the driver needs for one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunConfig {
    /// Total number of candidate patches; ids are `0..patch_count`.
    pub patch_count: usize,
    /// Allow the whole-test root verdict to satisfy patches the tree never
    /// saw (only a `Failed` root ever propagates, see the driver).
    pub use_test_selection: bool,
    /// Per patch id: may this patch share executions through the tree?
    /// Computed by the side-effect analysis before any test runs.
    pub tree_eligible: Vec<bool>,
    pub tests: Vec<TestConfig>,
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.patch_count == 0 {
            return Err(anyhow!("patch_count must be > 0"));
        }
        if self.tree_eligible.len() != self.patch_count {
            return Err(anyhow!(
                "tree_eligible has {} entries for {} patches",
                self.tree_eligible.len(),
                self.patch_count
            ));
        }
        for (idx, test) in self.tests.iter().enumerate() {
            if !CLASS_RE.is_match(&test.class) {
                return Err(anyhow!("test #{idx}: invalid class name '{}'", test.class));
            }
            if !METHOD_RE.is_match(&test.method) {
                return Err(anyhow!(
                    "test #{idx}: invalid method name '{}'",
                    test.method
                ));
            }
            if test.timeout_secs == 0 {
                return Err(anyhow!("test #{idx}: timeout_secs must be > 0"));
            }
        }
        Ok(())
    }

    pub fn is_tree_eligible(&self, patch_id: PatchId) -> bool {
        self.tree_eligible.get(patch_id).copied().unwrap_or(false)
    }
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<RunConfig> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write a config file (temp file + rename).
pub fn write_config(path: &Path, cfg: &RunConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RunConfig {
        RunConfig {
            patch_count: 3,
            use_test_selection: true,
            tree_eligible: vec![true, false, true],
            tests: vec![TestConfig {
                class: "com.example.CalcTest".to_string(),
                method: "testDivide".to_string(),
                timeout_secs: 60,
            }],
        }
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("run.toml");
        let cfg = sample();
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn bitmap_length_must_match_patch_count() {
        let mut cfg = sample();
        cfg.tree_eligible.pop();
        let err = cfg.validate().expect_err("short bitmap");
        assert!(err.to_string().contains("tree_eligible"));
    }

    #[test]
    fn rejects_malformed_identities_and_zero_timeouts() {
        let mut cfg = sample();
        cfg.tests[0].class = "com..example".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = sample();
        cfg.tests[0].method = "test divide".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = sample();
        cfg.tests[0].timeout_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn out_of_range_patch_ids_are_never_eligible() {
        let cfg = sample();
        assert!(cfg.is_tree_eligible(0));
        assert!(!cfg.is_tree_eligible(1));
        assert!(!cfg.is_tree_eligible(99));
    }
}
