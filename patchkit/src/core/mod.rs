//! Pure, deterministic core: outcomes, records, the decision tree, and the
//! verdict harvest. No I/O and no threading; fully testable in isolation.

pub mod fault;
pub mod harvest;
pub mod invariants;
pub mod outcome;
pub mod record;
pub mod tree;
