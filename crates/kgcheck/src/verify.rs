//! The consistency verification loop.
//!
//! A [`Verifier`] drives one client session: it bootstraps the shared
//! collection once, then for each step optionally adds an element, reads
//! and reconciles the record, and checks the merged view against the
//! session's monotonic-read and read-your-writes expectations.

use std::thread;
use std::time::Duration;

use kgcheck_store::StoreProxy;
use kgcheck_types::{ClientId, CollectionName, ItemSet, NodeId, RecordId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::bootstrap::{BootstrapOutcome, BootstrapPolicy, ensure_collection};
use crate::checker::{
    Guarantee, InvariantChecker, InvariantResult, MonotonicReadChecker, ReadYourWritesChecker,
};
use crate::error::{VerifyError, VerifyResult};
use crate::event::{EventLog, LoggedEvent, RunEvent};
use crate::reconcile::{DEFAULT_RECONCILE_ATTEMPTS, read_and_reconcile};
use crate::retry::RetryPolicy;
use crate::writer::OptimisticWriter;

/// Collection used when none is configured.
pub const DEFAULT_COLLECTION: &str = "forumkeygroup";

/// Record used when none is configured.
pub const DEFAULT_RECORD: &str = "forumkey";

pub const DEFAULT_ITERATIONS: u64 = 100;

/// Highest exit status that reports a violation count.
pub const MAX_VIOLATION_EXIT: u8 = 254;

/// Exit status for a run the harness could not complete.
pub const HARNESS_ERROR_EXIT: u8 = 255;

/// Maps a total violation count to a process exit status.
pub fn exit_code_for(violations: u64) -> u8 {
    u8::try_from(violations.min(u64::from(MAX_VIOLATION_EXIT))).unwrap_or(MAX_VIOLATION_EXIT)
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for one verification session.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    pub client_id: ClientId,
    /// Node this client registers as a replica of the collection.
    pub node_id: NodeId,
    pub collection: CollectionName,
    pub record: RecordId,
    /// Steps run are `1..iterations`.
    pub iterations: u64,
    /// Chance (0-100) that a step adds an element before reading.
    pub update_percentage: u8,
    /// Pause after every step.
    pub inter_op_delay: Duration,
    /// RNG seed for update decisions. Drawn from entropy when unset.
    pub seed: Option<u64>,
    /// Abort the run at the first violating check.
    pub stop_on_violation: bool,
    /// Pacing and budget for reads and writes.
    pub retry: RetryPolicy,
    pub bootstrap: BootstrapPolicy,
    /// Cap on rejected reconciling writes within one read.
    pub reconcile_max_attempts: u32,
    /// Keep a structured event log in the report.
    pub log_events: bool,
}

impl VerifyConfig {
    pub fn new(client_id: impl Into<ClientId>, node_id: impl Into<NodeId>) -> Self {
        Self {
            client_id: client_id.into(),
            node_id: node_id.into(),
            collection: CollectionName::new(DEFAULT_COLLECTION),
            record: RecordId::new(DEFAULT_RECORD),
            iterations: DEFAULT_ITERATIONS,
            update_percentage: 10,
            inter_op_delay: Duration::from_millis(1),
            seed: None,
            stop_on_violation: true,
            retry: RetryPolicy::default(),
            bootstrap: BootstrapPolicy::default(),
            reconcile_max_attempts: DEFAULT_RECONCILE_ATTEMPTS,
            log_events: true,
        }
    }

    pub fn with_collection(mut self, collection: impl Into<CollectionName>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_record(mut self, record: impl Into<RecordId>) -> Self {
        self.record = record.into();
        self
    }

    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    /// Sets the update chance, clamped to 100.
    pub fn with_update_percentage(mut self, percentage: u8) -> Self {
        self.update_percentage = percentage.min(100);
        self
    }

    pub fn with_inter_op_delay(mut self, delay: Duration) -> Self {
        self.inter_op_delay = delay;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_stop_on_violation(mut self, stop: bool) -> Self {
        self.stop_on_violation = stop;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: BootstrapPolicy) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn with_reconcile_max_attempts(mut self, attempts: u32) -> Self {
        self.reconcile_max_attempts = attempts;
        self
    }

    pub fn with_event_log(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        self
    }
}

// ============================================================================
// Results
// ============================================================================

/// One failed consistency check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub step: u64,
    pub guarantee: Guarantee,
    /// Expected items absent from the view.
    pub missing: ItemSet,
    /// Items in the view the session had not seen or written.
    pub extra: ItemSet,
    pub view: ItemSet,
}

/// What a single step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// Element added at this step, if any.
    pub added: Option<String>,
    /// The merged view the checks ran against.
    pub view: ItemSet,
    /// Violations found at this step.
    pub violations: usize,
}

/// Summary of a verification run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub client_id: ClientId,
    /// Seed of the update decisions, for reproducing the run.
    pub seed: u64,
    pub iterations: u64,
    pub steps: u64,
    pub adds: u64,
    /// Write attempts across all adds, including rejected ones.
    pub write_attempts: u64,
    pub reconciliations: u64,
    pub mrc_checks: u64,
    pub rywc_checks: u64,
    pub violations: Vec<Violation>,
    /// Step at which the run stopped on a violation.
    pub aborted_at: Option<u64>,
    pub bootstrap: Option<BootstrapOutcome>,
    pub seen: ItemSet,
    pub written: ItemSet,
    pub events: Vec<LoggedEvent>,
}

impl RunReport {
    pub fn violation_count(&self) -> u64 {
        self.violations.len() as u64
    }

    pub fn mrc_violations(&self) -> u64 {
        self.count(Guarantee::Mrc)
    }

    pub fn rywc_violations(&self) -> u64 {
        self.count(Guarantee::Rywc)
    }

    /// Returns true if no check failed.
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn exit_code(&self) -> u8 {
        exit_code_for(self.violation_count())
    }

    fn count(&self, guarantee: Guarantee) -> u64 {
        self.violations
            .iter()
            .filter(|v| v.guarantee == guarantee)
            .count() as u64
    }
}

// ============================================================================
// Verifier
// ============================================================================

/// Runs the verification loop for one client session.
#[derive(Debug)]
pub struct Verifier<S> {
    config: VerifyConfig,
    store: S,
    rng: StdRng,
    seed: u64,
    mrc: MonotonicReadChecker,
    rywc: ReadYourWritesChecker,
    events: EventLog,
    violations: Vec<Violation>,
    bootstrap: Option<BootstrapOutcome>,
    steps: u64,
    adds: u64,
    write_attempts: u64,
    reconciliations: u64,
    aborted_at: Option<u64>,
}

impl<S: StoreProxy> Verifier<S> {
    pub fn new(config: VerifyConfig, store: S) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        let events = if config.log_events {
            EventLog::new()
        } else {
            EventLog::disabled()
        };

        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
            config,
            store,
            mrc: MonotonicReadChecker::new(),
            rywc: ReadYourWritesChecker::new(),
            events,
            violations: Vec::new(),
            bootstrap: None,
            steps: 0,
            adds: 0,
            write_attempts: 0,
            reconciliations: 0,
            aborted_at: None,
        }
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Everything this session has observed.
    pub fn seen(&self) -> &ItemSet {
        self.mrc.seen()
    }

    /// Everything this session has added.
    pub fn written(&self) -> &ItemSet {
        self.rywc.written()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Sets up the shared collection.
    ///
    /// An unresolved bootstrap is fatal unless the policy says otherwise,
    /// in which case it is logged and the run proceeds.
    pub fn bootstrap(&mut self) -> VerifyResult<BootstrapOutcome> {
        let (outcome, last) = ensure_collection(
            &mut self.store,
            &self.config.collection,
            &self.config.record,
            &self.config.node_id,
            &self.config.bootstrap,
        );

        if let BootstrapOutcome::Unresolved { attempts } = outcome {
            if self.config.bootstrap.fail_on_unresolved {
                return Err(VerifyError::Bootstrap {
                    collection: self.config.collection.clone(),
                    node: self.config.node_id.clone(),
                    attempts,
                    last,
                });
            }
            warn!(
                client = %self.config.client_id,
                collection = %self.config.collection,
                attempts,
                last_error = ?last.as_ref().map(ToString::to_string),
                "bootstrap unresolved, continuing"
            );
        }

        self.events.log(
            0,
            RunEvent::Bootstrapped {
                outcome: outcome.clone(),
            },
        );
        self.bootstrap = Some(outcome.clone());
        Ok(outcome)
    }

    /// Runs one add/read/check cycle as step `x`.
    ///
    /// The element added, if any, is `"{client_id}-{x}"`.
    pub fn step(&mut self, x: u64) -> VerifyResult<StepOutcome> {
        self.steps += 1;

        let added = if self.should_update() {
            let element = self.config.client_id.element_for_step(x);
            self.rywc.record_write(element.clone());

            let writer =
                OptimisticWriter::new(&self.config.collection, &self.config.record, self.config.retry);
            let receipt = writer.add(&mut self.store, &element)?;

            self.adds += 1;
            self.write_attempts += u64::from(receipt.attempts);
            self.events.log(
                x,
                RunEvent::Added {
                    element: element.clone(),
                    attempts: receipt.attempts,
                },
            );
            Some(element)
        } else {
            None
        };

        let view = self.read_view(x)?;
        let mut found = 0;

        match self.mrc.check_view(&view) {
            InvariantResult::Ok => {
                let seen = self.mrc.seen().len();
                self.events.log(x, RunEvent::MrcChecked { seen });
            }
            InvariantResult::Violated { missing, .. } => {
                let expected = self.mrc.seen().clone();
                self.record_violation(x, Guarantee::Mrc, missing, &expected, &view);
                found += 1;
            }
        }

        if found == 0 || !self.config.stop_on_violation {
            match self.rywc.check_view(&view) {
                InvariantResult::Ok => {
                    let written = self.rywc.written().len();
                    self.events.log(x, RunEvent::RywcChecked { written });
                }
                InvariantResult::Violated { missing, .. } => {
                    let expected = self.rywc.written().clone();
                    self.record_violation(x, Guarantee::Rywc, missing, &expected, &view);
                    found += 1;
                }
            }
        }

        self.mrc.observe(&view);
        debug!(client = %self.config.client_id, step = x, view = %view, "step complete");

        Ok(StepOutcome {
            added,
            view,
            violations: found,
        })
    }

    /// Reads and reconciles the record, returning the merged view.
    pub fn read_view(&mut self, step: u64) -> VerifyResult<ItemSet> {
        let read = read_and_reconcile(
            &mut self.store,
            &self.config.collection,
            &self.config.record,
            &self.config.retry,
            self.config.reconcile_max_attempts,
        )?;

        if read.versions > 1 {
            self.events.log(
                step,
                RunEvent::ReadConflict {
                    versions: read.versions,
                },
            );
        }
        if read.rejected > 0 {
            self.events
                .log(step, RunEvent::ReconcileRejected { count: read.rejected });
        }
        if read.reconciled {
            self.reconciliations += 1;
            self.events.log(
                step,
                RunEvent::Reconciled {
                    view: read.view.clone(),
                },
            );
        }
        Ok(read.view)
    }

    /// Bootstraps, then runs steps `1..iterations`.
    ///
    /// Violations are findings, not errors: they are in the returned report.
    /// An error means the harness could not finish the run.
    #[instrument(skip_all, fields(client = %self.config.client_id, seed = self.seed))]
    pub fn run(&mut self) -> VerifyResult<RunReport> {
        info!(
            collection = %self.config.collection,
            record = %self.config.record,
            iterations = self.config.iterations,
            update_percentage = self.config.update_percentage,
            "starting verification"
        );
        self.bootstrap()?;

        for x in 1..self.config.iterations {
            let outcome = self.step(x)?;
            if outcome.violations > 0 && self.config.stop_on_violation {
                self.aborted_at = Some(x);
                break;
            }
            if !self.config.inter_op_delay.is_zero() {
                thread::sleep(self.config.inter_op_delay);
            }
        }

        let report = self.report();
        info!(
            steps = report.steps,
            adds = report.adds,
            mrc_violations = report.mrc_violations(),
            rywc_violations = report.rywc_violations(),
            "verification finished"
        );
        Ok(report)
    }

    /// Snapshot of the run so far.
    pub fn report(&self) -> RunReport {
        RunReport {
            client_id: self.config.client_id.clone(),
            seed: self.seed,
            iterations: self.config.iterations,
            steps: self.steps,
            adds: self.adds,
            write_attempts: self.write_attempts,
            reconciliations: self.reconciliations,
            mrc_checks: self.mrc.checks(),
            rywc_checks: self.rywc.checks(),
            violations: self.violations.clone(),
            aborted_at: self.aborted_at,
            bootstrap: self.bootstrap.clone(),
            seen: self.mrc.seen().clone(),
            written: self.rywc.written().clone(),
            events: self.events.iter().cloned().collect(),
        }
    }

    fn should_update(&mut self) -> bool {
        self.rng.gen_range(0..100u8) < self.config.update_percentage
    }

    fn record_violation(
        &mut self,
        step: u64,
        guarantee: Guarantee,
        missing: ItemSet,
        expected: &ItemSet,
        view: &ItemSet,
    ) {
        let extra = view.difference(expected);
        error!(
            client = %self.config.client_id,
            step,
            %guarantee,
            missing = %missing,
            extra = %extra,
            view = %view,
            "consistency violation"
        );

        self.events.log(
            step,
            RunEvent::Violation {
                guarantee,
                missing: missing.clone(),
            },
        );
        self.violations.push(Violation {
            step,
            guarantee,
            missing,
            extra,
            view: view.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use kgcheck_store::MemoryStore;
    use test_case::test_case;

    use super::*;

    fn config(id: &str) -> VerifyConfig {
        VerifyConfig::new(id, "n1")
            .with_inter_op_delay(Duration::ZERO)
            .with_retry(RetryPolicy::immediate())
            .with_seed(7)
    }

    #[test_case(0, 0; "zero")]
    #[test_case(1, 1)]
    #[test_case(254, 254)]
    #[test_case(255, 254; "capped")]
    #[test_case(10_000, 254; "far above cap")]
    fn test_exit_code_for(violations: u64, expected: u8) {
        assert_eq!(exit_code_for(violations), expected);
    }

    #[test]
    fn test_zero_percentage_never_writes() {
        let store = MemoryStore::new();
        let mut verifier = Verifier::new(
            config("c").with_iterations(20).with_update_percentage(0),
            store.session("c"),
        );

        let report = verifier.run().unwrap();

        assert_eq!(report.adds, 0);
        assert_eq!(report.steps, 19);
        assert!(report.written.is_empty());
        assert!(report.passed());
    }

    #[test]
    fn test_same_seed_same_decisions() {
        let decisions = |seed| {
            let store = MemoryStore::new();
            let mut verifier = Verifier::new(
                config("c")
                    .with_iterations(40)
                    .with_update_percentage(50)
                    .with_seed(seed),
                store.session("c"),
            );
            verifier.run().unwrap().written
        };

        assert_eq!(decisions(42), decisions(42));
    }

    #[test]
    fn test_percentage_is_clamped() {
        assert_eq!(config("c").with_update_percentage(250).update_percentage, 100);
    }

    #[test]
    fn test_keep_going_counts_every_violation() {
        let store = MemoryStore::new();
        let mut verifier = Verifier::new(
            config("c").with_update_percentage(100).with_stop_on_violation(false),
            store.session("c"),
        );
        verifier.bootstrap().unwrap();
        verifier.step(1).unwrap();

        // Roll the record back to empty behind the session's back.
        store
            .force_value(&verifier.config().collection, &verifier.config().record, &ItemSet::new())
            .unwrap();
        verifier.config.update_percentage = 0;
        let outcome = verifier.step(2).unwrap();

        assert_eq!(outcome.violations, 2);
        let report = verifier.report();
        assert_eq!(report.mrc_violations(), 1);
        assert_eq!(report.rywc_violations(), 1);
        assert_eq!(report.exit_code(), 2);
        assert!(report.aborted_at.is_none());
    }

    #[test]
    fn test_unresolved_bootstrap_can_be_tolerated() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let policy = BootstrapPolicy {
            max_attempts: 2,
            backoff: Duration::ZERO,
            fail_on_unresolved: false,
        };
        let mut verifier = Verifier::new(config("c").with_bootstrap(policy), store.session("c"));

        let outcome = verifier.bootstrap().unwrap();
        assert_eq!(outcome, BootstrapOutcome::Unresolved { attempts: 2 });

        let strict = BootstrapPolicy {
            fail_on_unresolved: true,
            ..policy
        };
        let mut verifier = Verifier::new(config("d").with_bootstrap(strict), store.session("d"));
        assert!(matches!(
            verifier.bootstrap(),
            Err(VerifyError::Bootstrap { attempts: 2, .. })
        ));
    }
}
