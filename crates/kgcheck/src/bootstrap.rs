//! Race-tolerant collection setup.
//!
//! Several clients may start at once against a fresh collection name. Each
//! tries to create the collection; the losers of that race join it as a
//! replica instead. Either way the caller ends up with a collection its node
//! participates in, without any error for the expected race outcomes.

use std::thread;
use std::time::Duration;

use kgcheck_store::{StoreError, StoreProxy, StoreResult};
use kgcheck_types::{CollectionName, ErrorKind, ItemSet, NodeId, RecordId};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Budget for [`ensure_collection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapPolicy {
    /// Create/join rounds before giving up on transient failures.
    pub max_attempts: u32,
    /// Pause between rounds.
    pub backoff: Duration,
    /// Whether an unresolved bootstrap stops the run.
    pub fail_on_unresolved: bool,
}

impl Default for BootstrapPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(10),
            fail_on_unresolved: true,
        }
    }
}

/// How the local node ended up participating in the collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapOutcome {
    /// This client created the collection and seeded the record.
    Created,
    /// The collection existed; the node was added as a replica.
    JoinedAsReplica,
    /// The collection existed and the node already replicated it.
    AlreadyReplica,
    /// Every round failed transiently; the collection state is unknown.
    Unresolved { attempts: u32 },
}

impl BootstrapOutcome {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, BootstrapOutcome::Unresolved { .. })
    }
}

/// Ensures `collection` exists with `node` as a replica.
///
/// The creator also seeds `record` with the empty set, so readers never
/// wait on a record nobody has written. Losing the creation race and finding
/// the node already registered are both success. Transient failures are
/// retried up to `policy.max_attempts` rounds; if none resolves, the
/// outcome is [`BootstrapOutcome::Unresolved`] and the last error is
/// returned alongside it for the caller to report.
///
/// A create that failed transiently may have been applied anyway, with only
/// the answer lost. If a later round then finds the collection existing, the
/// record is seeded before joining, so a collection this node created is
/// never left without a readable record.
pub fn ensure_collection<S: StoreProxy>(
    store: &mut S,
    collection: &CollectionName,
    record: &RecordId,
    node: &NodeId,
    policy: &BootstrapPolicy,
) -> (BootstrapOutcome, Option<StoreError>) {
    let mut last = None;
    let mut created = false;
    // A create that failed transiently may still have been applied.
    let mut create_unanswered = false;
    let mut seeded = false;
    let rounds = policy.max_attempts.max(1);

    for attempt in 1..=rounds {
        if attempt > 1 {
            thread::sleep(policy.backoff);
        }

        if !created {
            match store.create_collection(collection, true, node) {
                Ok(()) => {
                    info!(%collection, %node, "created collection");
                    created = true;
                }
                Err(e) if e.kind().is_transient() => {
                    debug!(%collection, attempt, error = %e, "create failed transiently");
                    create_unanswered = true;
                    last = Some(e);
                    continue;
                }
                Err(e) if create_unanswered && !seeded && e.kind() == ErrorKind::AlreadyExists => {
                    info!(%collection, %node, "collection exists after an unanswered create, seeding record");
                    if let Err(e) = seed(store, collection, record) {
                        warn!(%collection, %record, attempt, error = %e, "seeding record failed");
                        last = Some(e);
                        continue;
                    }
                    seeded = true;
                }
                Err(e) => {
                    debug!(%collection, kind = %e.kind(), reason = e.message(), "create lost, joining as replica");
                }
            }
        }

        if created {
            match seed(store, collection, record) {
                Ok(()) => return (BootstrapOutcome::Created, None),
                Err(e) => {
                    warn!(%collection, %record, attempt, error = %e, "seeding record failed");
                    last = Some(e);
                    continue;
                }
            }
        }

        match store.add_replica(collection, node) {
            Ok(()) => {
                info!(%collection, %node, "joined collection as replica");
                return (BootstrapOutcome::JoinedAsReplica, None);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(%collection, %node, reason = e.message(), "node already a replica");
                return (BootstrapOutcome::AlreadyReplica, None);
            }
            Err(e) => {
                // NotFound means the collection is not there after all, so
                // the next round tries to create it again.
                debug!(%collection, attempt, kind = %e.kind(), error = %e, "add replica failed");
                last = Some(e);
            }
        }
    }

    (BootstrapOutcome::Unresolved { attempts: rounds }, last)
}

/// Writes the empty set to `record`.
///
/// A conflict means another writer got there first, so the record exists.
fn seed<S: StoreProxy>(
    store: &mut S,
    collection: &CollectionName,
    record: &RecordId,
) -> StoreResult<()> {
    match store.update(collection, record, ItemSet::new().encode()) {
        Err(e) if e.kind() == ErrorKind::Conflict => {
            debug!(%collection, %record, "record already written, skipping seed");
            Ok(())
        }
        result => result,
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use kgcheck_store::{MemorySession, MemoryStore};

    use crate::retry::{RetryLimit, RetryPolicy};
    use crate::writer::OptimisticWriter;

    use super::*;

    fn kg() -> CollectionName {
        CollectionName::new("forumkeygroup")
    }

    fn key() -> RecordId {
        RecordId::new("forumkey")
    }

    fn quick() -> BootstrapPolicy {
        BootstrapPolicy {
            backoff: Duration::ZERO,
            ..BootstrapPolicy::default()
        }
    }

    /// Fails every call as unavailable.
    struct Down;

    impl StoreProxy for Down {
        fn create_collection(&mut self, _: &CollectionName, _: bool, _: &NodeId) -> StoreResult<()> {
            Err(StoreError::unavailable("down"))
        }
        fn add_replica(&mut self, _: &CollectionName, _: &NodeId) -> StoreResult<()> {
            Err(StoreError::unavailable("down"))
        }
        fn read(&mut self, _: &CollectionName, _: &RecordId) -> StoreResult<Vec<Bytes>> {
            Err(StoreError::unavailable("down"))
        }
        fn update(&mut self, _: &CollectionName, _: &RecordId, _: Bytes) -> StoreResult<()> {
            Err(StoreError::unavailable("down"))
        }
    }

    #[test]
    fn test_creator_seeds_empty_record() {
        let store = MemoryStore::new();
        let mut session = store.session("a");

        let (outcome, last) = ensure_collection(&mut session, &kg(), &key(), &NodeId::new("n1"), &quick());

        assert_eq!(outcome, BootstrapOutcome::Created);
        assert!(last.is_none());
        assert_eq!(store.payloads(&kg(), &key()), vec![ItemSet::new().encode()]);
    }

    #[test]
    fn test_second_node_joins_as_replica() {
        let store = MemoryStore::new();
        ensure_collection(&mut store.session("a"), &kg(), &key(), &NodeId::new("n1"), &quick());

        let (outcome, _) =
            ensure_collection(&mut store.session("b"), &kg(), &key(), &NodeId::new("n2"), &quick());

        assert_eq!(outcome, BootstrapOutcome::JoinedAsReplica);
        assert_eq!(
            store.replicas(&kg()).unwrap(),
            vec![NodeId::new("n1"), NodeId::new("n2")]
        );
    }

    #[test]
    fn test_repeat_bootstrap_is_idempotent() {
        let store = MemoryStore::new();
        let node = NodeId::new("n1");
        let mut session = store.session("a");

        ensure_collection(&mut session, &kg(), &key(), &node, &quick());
        let (outcome, last) = ensure_collection(&mut session, &kg(), &key(), &node, &quick());

        assert_eq!(outcome, BootstrapOutcome::AlreadyReplica);
        assert!(last.is_none());
        assert_eq!(store.replicas(&kg()).unwrap(), vec![node]);
        assert_eq!(store.payloads(&kg(), &key()).len(), 1);
    }

    #[test]
    fn test_unreachable_store_is_unresolved() {
        let (outcome, last) = ensure_collection(&mut Down, &kg(), &key(), &NodeId::new("n1"), &quick());

        assert_eq!(outcome, BootstrapOutcome::Unresolved { attempts: 5 });
        assert!(!outcome.is_resolved());
        assert_eq!(last.unwrap().kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn test_transient_outage_is_retried() {
        let store = MemoryStore::new();
        let mut session = store.session("a");
        store.set_unavailable(true);

        let handle = {
            let store = store.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                store.set_unavailable(false);
            })
        };
        let policy = BootstrapPolicy {
            max_attempts: 1000,
            backoff: Duration::from_millis(1),
            fail_on_unresolved: true,
        };
        let (outcome, _) = ensure_collection(&mut session, &kg(), &key(), &NodeId::new("n1"), &policy);
        handle.join().unwrap();

        assert_eq!(outcome, BootstrapOutcome::Created);
    }

    /// Fails the first create as unavailable. With `applied` set the
    /// create reaches the store and only the answer is lost.
    struct FirstCreateFails {
        inner: MemorySession,
        applied: bool,
        tripped: bool,
    }

    impl FirstCreateFails {
        fn new(inner: MemorySession, applied: bool) -> Self {
            Self {
                inner,
                applied,
                tripped: false,
            }
        }
    }

    impl StoreProxy for FirstCreateFails {
        fn create_collection(&mut self, name: &CollectionName, mutable: bool, first: &NodeId) -> StoreResult<()> {
            if self.tripped {
                return self.inner.create_collection(name, mutable, first);
            }
            self.tripped = true;
            if self.applied {
                self.inner.create_collection(name, mutable, first)?;
            }
            Err(StoreError::unavailable("read timed out"))
        }
        fn add_replica(&mut self, collection: &CollectionName, node: &NodeId) -> StoreResult<()> {
            self.inner.add_replica(collection, node)
        }
        fn read(&mut self, collection: &CollectionName, record: &RecordId) -> StoreResult<Vec<Bytes>> {
            self.inner.read(collection, record)
        }
        fn update(&mut self, collection: &CollectionName, record: &RecordId, payload: Bytes) -> StoreResult<()> {
            self.inner.update(collection, record, payload)
        }
    }

    #[test]
    fn test_lost_create_answer_still_seeds_record() {
        let store = MemoryStore::new();
        let node = NodeId::new("n1");
        let mut session = FirstCreateFails::new(store.session("a"), true);

        let (outcome, _) = ensure_collection(&mut session, &kg(), &key(), &node, &quick());

        assert_eq!(outcome, BootstrapOutcome::AlreadyReplica);
        assert_eq!(store.replicas(&kg()).unwrap(), vec![node]);
        assert_eq!(store.payloads(&kg(), &key()), vec![ItemSet::new().encode()]);

        let (coll, rec) = (kg(), key());
        let policy = RetryPolicy::immediate().with_limit(RetryLimit::Attempts(5));
        let receipt = OptimisticWriter::new(&coll, &rec, policy)
            .add(&mut session, "a-1")
            .unwrap();
        assert_eq!(receipt.attempts, 1);
    }

    #[test]
    fn test_unanswered_create_keeps_existing_record() {
        let store = MemoryStore::new();
        let mut creator = store.session("a");
        ensure_collection(&mut creator, &kg(), &key(), &NodeId::new("n1"), &quick());
        let written: ItemSet = ["a-1"].into_iter().collect();
        creator.read(&kg(), &key()).unwrap();
        creator.update(&kg(), &key(), written.encode()).unwrap();

        let mut late = FirstCreateFails::new(store.session("b"), false);
        let (outcome, _) = ensure_collection(&mut late, &kg(), &key(), &NodeId::new("n2"), &quick());

        assert_eq!(outcome, BootstrapOutcome::JoinedAsReplica);
        assert_eq!(store.payloads(&kg(), &key()), vec![written.encode()]);
    }
}
