//! # kgcheck: session-consistency verification for replicated stores
//!
//! `kgcheck` checks a replicated key-value store for two session guarantees
//! while several clients write the same set-valued record concurrently:
//!
//! - **Monotonic reads**: once a client has observed an item it never
//!   observes a state without it.
//! - **Read your writes**: a client always observes its own additions.
//!
//! The store is reached only through [`StoreProxy`](kgcheck_store::StoreProxy),
//! so the same loop runs against the in-memory store in tests and against a
//! remote store through `kgcheck-client`.
//!
//! ## Architecture
//!
//! ```text
//! Verifier ──► bootstrap (once) ──► StoreProxy
//!    │
//!    ├──► OptimisticWriter ──► merge ──► StoreProxy
//!    │
//!    └──► read_and_reconcile ──► merge ──► checkers (MRC, RYWC)
//! ```
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use kgcheck::{Verifier, VerifyConfig};
//! use kgcheck_store::MemoryStore;
//!
//! let store = MemoryStore::new();
//! let config = VerifyConfig::new("c1", "node-a")
//!     .with_iterations(5)
//!     .with_update_percentage(100)
//!     .with_inter_op_delay(Duration::ZERO);
//!
//! let mut verifier = Verifier::new(config, store.session("c1"));
//! let report = verifier.run().unwrap();
//!
//! assert!(report.passed());
//! assert_eq!(report.written.len(), 4);
//! ```

mod bootstrap;
mod checker;
mod error;
mod event;
mod merge;
mod reconcile;
mod retry;
mod verify;
mod writer;

pub use bootstrap::{BootstrapOutcome, BootstrapPolicy, ensure_collection};
pub use checker::{
    Guarantee, InvariantChecker, InvariantResult, MonotonicReadChecker, ReadYourWritesChecker,
};
pub use error::{VerifyError, VerifyResult};
pub use event::{EventLog, LoggedEvent, RunEvent};
pub use merge::{decode_and_merge, merge_versions, reflects};
pub use reconcile::{DEFAULT_RECONCILE_ATTEMPTS, ReconciledRead, read_and_reconcile};
pub use retry::{Retrier, RetryLimit, RetryPolicy};
pub use verify::{
    DEFAULT_COLLECTION, DEFAULT_ITERATIONS, DEFAULT_RECORD, HARNESS_ERROR_EXIT, MAX_VIOLATION_EXIT,
    RunReport, StepOutcome, Verifier, VerifyConfig, Violation, exit_code_for,
};
pub use writer::{OptimisticWriter, WriteReceipt};
