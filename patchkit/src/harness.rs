//! Seam to the instrumented program under test.
//!
//! The source rewriter (an external collaborator) turns the program plus its
//! candidate patches into a suite whose tests contain one dispatcher call
//! site per modification point. That generated code links this crate and
//! implements [`InstrumentedSuite`]; tests use scripted suites that emulate
//! the dispatcher without any rewriting.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::core::tree::Verdict;
use crate::session::Session;

/// Identity of one test method.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TestId {
    pub class: String,
    pub method: String,
}

impl TestId {
    pub fn new(class: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            method: method.into(),
        }
    }
}

impl std::fmt::Display for TestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.class, self.method)
    }
}

/// Final result of one test execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
}

impl TestStatus {
    pub(crate) fn as_verdict(self) -> Verdict {
        match self {
            TestStatus::Passed => Verdict::Passed,
            TestStatus::Failed => Verdict::Failed,
        }
    }
}

/// Abstraction over the rewritten program under test.
pub trait InstrumentedSuite: Send + Sync {
    /// Re-initialize process-global state the tests depend on. Called before
    /// every execution so repeated runs of one test observe a fresh program.
    fn reset_globals(&self);

    /// Execute one test method to completion, driving the dispatcher
    /// protocol on `session` at the instrumentation point. An `Err` is a
    /// test-level failure (assertion, escaped error, aborted dispatch) and
    /// is scored as `Failed` by the caller.
    fn run_test(&self, test: &TestId, session: &Session) -> Result<TestStatus>;
}
