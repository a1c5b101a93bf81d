//! Structured run events.
//!
//! The verification loop records what it did as values instead of printing
//! progress, so callers (the CLI, tests) decide how to present it.

use std::collections::VecDeque;

use kgcheck_types::ItemSet;
use serde::Serialize;

use crate::bootstrap::BootstrapOutcome;
use crate::checker::Guarantee;

// ============================================================================
// Run Events
// ============================================================================

/// Something the verification loop did or observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// The collection was set up.
    Bootstrapped { outcome: BootstrapOutcome },

    /// An element was added to the record.
    Added { element: String, attempts: u32 },

    /// A read returned more than one version.
    ReadConflict { versions: usize },

    /// Divergent versions were merged and written back.
    Reconciled { view: ItemSet },

    /// Reconciling writes were rejected before the view settled.
    ReconcileRejected { count: u32 },

    /// Monotonic reads held for this step.
    MrcChecked { seen: usize },

    /// Read-your-writes held for this step.
    RywcChecked { written: usize },

    /// A session guarantee was violated.
    Violation {
        guarantee: Guarantee,
        missing: ItemSet,
    },
}

/// A run event tagged with where it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoggedEvent {
    /// Sequential event number.
    pub event_id: u64,
    /// Loop step (0 for bootstrap).
    pub step: u64,
    pub event: RunEvent,
}

// ============================================================================
// Event Log
// ============================================================================

/// Bounded in-memory log of run events.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: VecDeque<LoggedEvent>,
    next_id: u64,
    /// Oldest events are evicted beyond this.
    max_in_memory: usize,
    enabled: bool,
}

impl EventLog {
    /// Creates an enabled event log.
    pub fn new() -> Self {
        Self {
            events: VecDeque::new(),
            next_id: 0,
            max_in_memory: 100_000,
            enabled: true,
        }
    }

    /// Creates a disabled event log (no-op).
    pub fn disabled() -> Self {
        Self {
            events: VecDeque::new(),
            next_id: 0,
            max_in_memory: 0,
            enabled: false,
        }
    }

    #[cfg(test)]
    fn with_capacity_limit(mut self, max_in_memory: usize) -> Self {
        self.max_in_memory = max_in_memory;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Logs an event at the given step.
    pub fn log(&mut self, step: u64, event: RunEvent) {
        if !self.enabled {
            return;
        }

        self.events.push_back(LoggedEvent {
            event_id: self.next_id,
            step,
            event,
        });
        self.next_id += 1;

        if self.events.len() > self.max_in_memory {
            self.events.pop_front();
        }
    }

    /// Returns the number of retained events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoggedEvent> {
        self.events.iter()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
