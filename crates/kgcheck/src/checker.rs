//! Session consistency checkers.
//!
//! Each client keeps two sets that only ever grow:
//!
//! - [`MonotonicReadChecker`] tracks everything the client has observed and
//!   flags a read that no longer shows some of it.
//! - [`ReadYourWritesChecker`] tracks everything the client has written and
//!   flags a read that does not show all of it.

use kgcheck_types::ItemSet;
use serde::Serialize;

use crate::merge::reflects;

// ============================================================================
// Invariant Result
// ============================================================================

/// Result of an invariant check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantResult {
    /// The invariant holds.
    Ok,
    /// The invariant is violated.
    Violated {
        /// Name of the violated invariant.
        invariant: &'static str,
        /// Description of the violation.
        message: String,
        /// Items expected in the view but absent from it.
        missing: ItemSet,
        /// Additional context.
        context: Vec<(String, String)>,
    },
}

impl InvariantResult {
    /// Returns true if the invariant holds.
    pub fn is_ok(&self) -> bool {
        matches!(self, InvariantResult::Ok)
    }
}

/// Which session guarantee a check covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Guarantee {
    /// Monotonic reads.
    Mrc,
    /// Read your writes.
    Rywc,
}

impl Guarantee {
    pub fn name(self) -> &'static str {
        match self {
            Guarantee::Mrc => "monotonic_reads",
            Guarantee::Rywc => "read_your_writes",
        }
    }
}

impl std::fmt::Display for Guarantee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Invariant Checker Trait
// ============================================================================

/// A per-session consistency check applied to every merged view.
pub trait InvariantChecker {
    /// Returns the name of this checker.
    fn name(&self) -> &'static str;

    /// Checks one merged view. Does not change what the checker expects.
    fn check_view(&mut self, view: &ItemSet) -> InvariantResult;

    /// Number of views checked so far.
    fn checks(&self) -> u64;
}

fn violation(
    invariant: &'static str,
    label: &str,
    expected: &ItemSet,
    view: &ItemSet,
) -> InvariantResult {
    let missing = expected.difference(view);
    let extra = view.difference(expected);
    InvariantResult::Violated {
        invariant,
        message: format!(
            "{} {label} item(s) missing from view: {missing}",
            missing.len()
        ),
        context: vec![
            (label.to_string(), expected.to_string()),
            ("view".to_string(), view.to_string()),
            ("extra".to_string(), extra.to_string()),
        ],
        missing,
    }
}

// ============================================================================
// Monotonic Read Checker
// ============================================================================

/// Verifies that a session never observes less than it already has.
#[derive(Debug, Default)]
pub struct MonotonicReadChecker {
    seen: ItemSet,
    checks: u64,
}

impl MonotonicReadChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a checked view into the observed state.
    pub fn observe(&mut self, view: &ItemSet) {
        self.seen.extend_from(view);
    }

    /// Everything observed so far.
    pub fn seen(&self) -> &ItemSet {
        &self.seen
    }
}

impl InvariantChecker for MonotonicReadChecker {
    fn name(&self) -> &'static str {
        Guarantee::Mrc.name()
    }

    fn check_view(&mut self, view: &ItemSet) -> InvariantResult {
        self.checks += 1;
        if reflects(view, &self.seen) {
            InvariantResult::Ok
        } else {
            violation(self.name(), "seen", &self.seen, view)
        }
    }

    fn checks(&self) -> u64 {
        self.checks
    }
}

// ============================================================================
// Read Your Writes Checker
// ============================================================================

/// Verifies that a session always observes its own writes.
#[derive(Debug, Default)]
pub struct ReadYourWritesChecker {
    written: ItemSet,
    checks: u64,
}

impl ReadYourWritesChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an element this session is writing.
    pub fn record_write(&mut self, element: impl Into<String>) {
        self.written.insert(element);
    }

    /// Everything written so far.
    pub fn written(&self) -> &ItemSet {
        &self.written
    }
}

impl InvariantChecker for ReadYourWritesChecker {
    fn name(&self) -> &'static str {
        Guarantee::Rywc.name()
    }

    fn check_view(&mut self, view: &ItemSet) -> InvariantResult {
        self.checks += 1;
        if reflects(view, &self.written) {
            InvariantResult::Ok
        } else {
            violation(self.name(), "written", &self.written, view)
        }
    }

    fn checks(&self) -> u64 {
        self.checks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> ItemSet {
        items.iter().copied().collect()
    }

    #[test]
    fn test_mrc_accepts_growing_views() {
        let mut mrc = MonotonicReadChecker::new();
        for view in [set(&[]), set(&["a"]), set(&["a", "b"]), set(&["a", "b"])] {
            assert!(mrc.check_view(&view).is_ok());
            mrc.observe(&view);
        }
        assert_eq!(mrc.checks(), 4);
        assert_eq!(mrc.seen(), &set(&["a", "b"]));
    }

    #[test]
    fn test_mrc_flags_shrinking_view() {
        let mut mrc = MonotonicReadChecker::new();
        mrc.observe(&set(&["a", "b"]));

        match mrc.check_view(&set(&["b", "c"])) {
            InvariantResult::Violated {
                invariant,
                missing,
                context,
                ..
            } => {
                assert_eq!(invariant, "monotonic_reads");
                assert_eq!(missing, set(&["a"]));
                assert!(context.contains(&("extra".to_string(), r#"{"c"}"#.to_string())));
            }
            InvariantResult::Ok => panic!("shrinking view accepted"),
        }
    }

    #[test]
    fn test_mrc_check_does_not_observe() {
        let mut mrc = MonotonicReadChecker::new();
        mrc.check_view(&set(&["a"]));
        assert!(mrc.seen().is_empty());
    }

    #[test]
    fn test_rywc_flags_missing_write() {
        let mut rywc = ReadYourWritesChecker::new();
        rywc.record_write("me-1");
        assert!(rywc.check_view(&set(&["me-1", "other-3"])).is_ok());

        rywc.record_write("me-2");
        let result = rywc.check_view(&set(&["me-1"]));
        assert!(matches!(
            result,
            InvariantResult::Violated { invariant: "read_your_writes", ref missing, .. } if *missing == set(&["me-2"])
        ));
    }

    #[test]
    fn test_checks_are_counted() {
        let mut rywc = ReadYourWritesChecker::new();
        rywc.record_write("x");
        rywc.check_view(&ItemSet::new());
        rywc.check_view(&set(&["x"]));

        assert_eq!(rywc.written(), &set(&["x"]));
        assert_eq!(rywc.checks(), 2);
    }
}
