//! Shared-execution test kit for validating candidate patches.
//!
//! Scoring many candidate patches against one regression suite naively costs
//! one full test execution per patch per test. This crate collapses that:
//! patches whose observable state after the patched region is identical are
//! folded onto one decision-tree path and share the remainder of the test,
//! with a safe one-patch-per-execution fallback whenever the sharing
//! invariants are violated.
//!
//! The architecture enforces a strict separation:
//!
//! - **[`core`]**: pure, deterministic logic (outcomes, records, the decision
//!   tree, verdict harvest). No I/O, fully testable in isolation.
//! - **[`io`]**: configuration and report files.
//! - Orchestration ([`orchestrator`], [`session`], [`worker`], [`driver`])
//!   coordinates core logic with the instrumented program behind the
//!   [`harness::InstrumentedSuite`] seam.
//!
//! The rewritten program under test links this crate, implements
//! `InstrumentedSuite`, and hands a [`driver::Driver`] its run config; the
//! bundled binary only validates and inspects config files.

pub mod core;
pub mod driver;
pub mod exit_codes;
pub mod harness;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod worker;
