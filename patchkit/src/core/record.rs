//! Invocation records: the state-equivalence key for one patch invocation.

use std::collections::BTreeMap;
use std::fmt;

use crate::core::outcome::{ExecOutcome, FieldValue};

/// The observable effect of one patch invocation: which fields ended up
/// different from the pre-invocation baseline, and how the invocation
/// terminated. Two invocations with equal records are indistinguishable to
/// all code after the instrumentation point and may share one subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRecord {
    pub changed_fields: BTreeMap<String, FieldValue>,
    pub outcome: ExecOutcome,
}

impl fmt::Display for InvocationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.outcome)?;
        let mut first = true;
        for (name, value) in &self.changed_fields {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{name}={value}")?;
        }
        write!(f, "}}")
    }
}

/// Accumulates one in-flight invocation's field reports.
///
/// The baseline map is write-only bookkeeping used to compute the delta and
/// the restore values; it is never part of the equivalence key.
#[derive(Debug, Default)]
pub struct InvokeCapture {
    baseline: BTreeMap<String, FieldValue>,
    changed: BTreeMap<String, FieldValue>,
}

impl InvokeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a field's value before the patch body runs.
    pub fn record_before(&mut self, name: &str, value: FieldValue) {
        self.baseline.insert(name.to_string(), value);
    }

    /// Report a field's value after the patch body ran. Returns the value the
    /// dispatcher must restore before invoking the next sibling patch: the
    /// pre-invocation baseline, or the kind's zero for a freshly introduced
    /// field.
    pub fn record_after(&mut self, name: &str, value: FieldValue) -> FieldValue {
        match self.baseline.get(name) {
            None => {
                // Never seen before the invocation: always a change.
                let restore = value.restore_default();
                self.changed.insert(name.to_string(), value);
                restore
            }
            Some(original) => {
                let restore = original.clone();
                if *original != value {
                    self.changed.insert(name.to_string(), value);
                }
                restore
            }
        }
    }

    /// Close the capture into the equivalence key.
    pub fn into_record(self, outcome: ExecOutcome) -> InvocationRecord {
        InvocationRecord {
            changed_fields: self.changed,
            outcome,
        }
    }
}
