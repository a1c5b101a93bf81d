//! Vector clocks for versioned records.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

/// A vector clock keyed by writer id.
///
/// Missing entries count as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VClock(BTreeMap<String, u64>);

impl VClock {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Increments the entry for `writer`.
    pub fn tick(&mut self, writer: &str) {
        let entry = self.0.entry(writer.to_string()).or_insert(0);
        *entry = entry.saturating_add(1);
    }

    /// Returns the entry for `writer`.
    pub fn get(&self, writer: &str) -> u64 {
        self.0.get(writer).copied().unwrap_or(0)
    }

    /// Pointwise maximum of both clocks.
    pub fn join(&self, other: &VClock) -> VClock {
        let mut out = self.0.clone();
        for (writer, &count) in &other.0 {
            let entry = out.entry(writer.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
        VClock(out)
    }

    /// Returns true if every entry of `other` is at most the matching entry
    /// of `self`, i.e. `self` has seen everything `other` has.
    pub fn dominates(&self, other: &VClock) -> bool {
        other
            .0
            .iter()
            .all(|(writer, &count)| self.get(writer) >= count)
    }
}

impl Display for VClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, (writer, count)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{writer}:{count}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_advances_only_the_writer() {
        let mut clock = VClock::new();
        clock.tick("a");
        clock.tick("a");
        clock.tick("b");

        assert_eq!(clock.get("a"), 2);
        assert_eq!(clock.get("b"), 1);
        assert_eq!(clock.get("c"), 0);
        assert_eq!(clock.to_string(), "[a:2 b:1]");
    }

    #[test]
    fn join_dominates_both_inputs() {
        let mut a = VClock::new();
        a.tick("a");
        let mut b = VClock::new();
        b.tick("b");

        let joined = a.join(&b);
        assert!(joined.dominates(&a));
        assert!(joined.dominates(&b));
        assert!(!a.dominates(&b) && !b.dominates(&a));
        assert!(!a.dominates(&joined));
    }

    #[test]
    fn empty_clock_is_dominated_by_everything() {
        let mut a = VClock::new();
        a.tick("a");

        assert!(a.dominates(&VClock::new()));
        assert!(VClock::new().dominates(&VClock::new()));
        assert!(!VClock::new().dominates(&a));
    }
}
