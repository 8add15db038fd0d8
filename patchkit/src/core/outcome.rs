//! Invocation outcomes and captured field values.
//!
//! These are the leaves of the state-equivalence key: two patch invocations
//! are indistinguishable to the rest of a test exactly when they changed the
//! same fields to the same values and left the patched region the same way.

use std::fmt;

/// Snapshot of a single field value as reported by the instrumented program.
///
/// Float equality is bitwise so that a NaN-producing patch still keys a memo
/// edge deterministically. Reference-typed values are reduced to `Str`/`Null`
/// by the instrumentation before they reach this crate.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl FieldValue {
    /// Value handed back to the dispatcher when a field had no pre-invocation
    /// baseline (freshly introduced by the patch): primitives roll back to
    /// zero, reference-like values to unset.
    pub fn restore_default(&self) -> FieldValue {
        match self {
            FieldValue::Null | FieldValue::Str(_) => FieldValue::Null,
            FieldValue::Bool(_) => FieldValue::Bool(false),
            FieldValue::Int(_) => FieldValue::Int(0),
            FieldValue::Float(_) => FieldValue::Float(0.0),
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => true,
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a == b,
            (FieldValue::Int(a), FieldValue::Int(b)) => a == b,
            (FieldValue::Float(a), FieldValue::Float(b)) => a.to_bits() == b.to_bits(),
            (FieldValue::Str(a), FieldValue::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for FieldValue {}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Str(v) => write!(f, "{v:?}"),
        }
    }
}

/// How one patch invocation left the instrumentation point.
///
/// `Break`/`Continue`/`Return` are non-local transfers out of the patched
/// region; they are carried as values so the dispatcher can replay the
/// matching local control transfer itself. `Running` is the placeholder an
/// invocation starts in and must be replaced exactly once before the
/// invocation is recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    Running,
    /// Fell through the end of the patched region.
    Finish,
    /// Returned from the enclosing method with this value.
    Return(FieldValue),
    /// An unchecked error escaped; compared by stable description, never by
    /// the error object itself.
    ThrowUnchecked(String),
    Break,
    Continue,
}

impl fmt::Display for ExecOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecOutcome::Running => write!(f, "running"),
            ExecOutcome::Finish => write!(f, "finish"),
            ExecOutcome::Return(value) => write!(f, "return {value}"),
            ExecOutcome::ThrowUnchecked(desc) => write!(f, "throw {desc}"),
            ExecOutcome::Break => write!(f, "break"),
            ExecOutcome::Continue => write!(f, "continue"),
        }
    }
}
