//! Optimistic read-merge-write.

use std::thread;

use kgcheck_store::{StoreError, StoreProxy};
use kgcheck_types::{CollectionName, ErrorKind, ItemSet, RecordId};
use tracing::{debug, trace};

use crate::error::{VerifyError, VerifyResult};
use crate::merge::decode_and_merge;
use crate::retry::RetryPolicy;

/// Result of a successful [`OptimisticWriter::add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    /// Write attempts made, including the one that succeeded.
    pub attempts: u32,
    /// Reads that returned nothing usable and were retried.
    pub empty_reads: u32,
    /// The set that was written.
    pub written: ItemSet,
}

/// Adds elements to a set-valued record despite concurrent writers.
///
/// Each attempt reads every visible version, merges them, inserts the
/// element and writes the result back. A rejected write means another
/// writer got in first, so the attempt starts over with a fresh read.
#[derive(Debug, Clone)]
pub struct OptimisticWriter<'a> {
    collection: &'a CollectionName,
    record: &'a RecordId,
    policy: RetryPolicy,
}

impl<'a> OptimisticWriter<'a> {
    pub fn new(collection: &'a CollectionName, record: &'a RecordId, policy: RetryPolicy) -> Self {
        Self {
            collection,
            record,
            policy,
        }
    }

    /// Adds `element` to the record.
    ///
    /// Read failures, empty reads and rejected writes are all retried under
    /// the writer's policy; only an exhausted budget or an undecodable
    /// version is returned as an error.
    pub fn add<S: StoreProxy>(&self, store: &mut S, element: &str) -> VerifyResult<WriteReceipt> {
        let mut retrier = self.policy.retrier();
        let mut attempts = 0;
        let mut empty_reads = 0;

        loop {
            let failure = match store.read(self.collection, self.record) {
                Ok(versions) if versions.is_empty() => {
                    empty_reads += 1;
                    StoreError::not_found("read returned no versions")
                }
                Ok(versions) => {
                    let mut working = decode_and_merge(&versions)?;
                    working.insert(element);
                    attempts += 1;

                    match store.update(self.collection, self.record, working.encode()) {
                        Ok(()) => {
                            debug!(record = %self.record, element, attempts, "element added");
                            return Ok(WriteReceipt {
                                attempts,
                                empty_reads,
                                written: working,
                            });
                        }
                        Err(e) => e,
                    }
                }
                Err(e) => {
                    if e.kind() == ErrorKind::NotFound {
                        empty_reads += 1;
                    }
                    e
                }
            };

            let Some(delay) = retrier.next_delay(failure.kind()) else {
                return Err(VerifyError::RetriesExhausted {
                    operation: "add",
                    attempts: retrier.failures(),
                    last: failure,
                });
            };
            trace!(record = %self.record, element, kind = %failure.kind(), ?delay, "retrying add");
            thread::sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use kgcheck_store::MemoryStore;
    use kgcheck_types::NodeId;

    use super::*;
    use crate::retry::RetryLimit;

    fn kg() -> CollectionName {
        CollectionName::new("kg")
    }

    fn key() -> RecordId {
        RecordId::new("key")
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        let mut s = store.session("seed");
        s.create_collection(&kg(), true, &NodeId::new("n1")).unwrap();
        s.update(&kg(), &key(), ItemSet::new().encode()).unwrap();
        store
    }

    #[test]
    fn test_add_to_seeded_record() {
        let store = seeded();
        let (coll, rec) = (kg(), key());
        let writer = OptimisticWriter::new(&coll, &rec, RetryPolicy::immediate());

        let receipt = writer.add(&mut store.session("a"), "a-1").unwrap();

        assert_eq!(receipt.attempts, 1);
        assert!(receipt.written.contains("a-1"));
    }

    #[test]
    fn test_rejected_write_is_retried_once() {
        let store = seeded();
        let (coll, rec) = (kg(), key());
        let writer = OptimisticWriter::new(&coll, &rec, RetryPolicy::immediate());
        store.reject_next_updates(1);

        let receipt = writer.add(&mut store.session("a"), "a-1").unwrap();

        assert_eq!(receipt.attempts, 2);
        let stored = ItemSet::decode(&store.payloads(&kg(), &key())[0]).unwrap();
        assert!(stored.contains("a-1"));
    }

    #[test]
    fn test_failed_reads_are_retried() {
        let store = seeded();
        let (coll, rec) = (kg(), key());
        let writer = OptimisticWriter::new(&coll, &rec, RetryPolicy::immediate());
        store.fail_next_reads(3);

        let receipt = writer.add(&mut store.session("a"), "a-1").unwrap();
        assert_eq!(receipt.attempts, 1);
    }

    #[test]
    fn test_missing_record_counts_as_empty_read() {
        let store = MemoryStore::new();
        let mut s = store.session("a");
        s.create_collection(&kg(), true, &NodeId::new("n1")).unwrap();
        let (coll, rec) = (kg(), key());
        let writer = OptimisticWriter::new(
            &coll,
            &rec,
            RetryPolicy::immediate().with_limit(RetryLimit::Attempts(3)),
        );

        let err = writer.add(&mut s, "a-1").unwrap_err();
        match err {
            VerifyError::RetriesExhausted {
                operation,
                attempts,
                last,
            } => {
                assert_eq!(operation, "add");
                assert_eq!(attempts, 3);
                assert_eq!(last.kind(), ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_merges_siblings_before_writing() {
        let store = seeded();
        store
            .inject_sibling(&kg(), &key(), &["x"].into_iter().collect())
            .unwrap();
        let (coll, rec) = (kg(), key());
        let writer = OptimisticWriter::new(&coll, &rec, RetryPolicy::immediate());

        let receipt = writer.add(&mut store.session("a"), "a-1").unwrap();

        assert_eq!(receipt.written, ["a-1", "x"].into_iter().collect::<ItemSet>());
        assert_eq!(store.payloads(&kg(), &key()).len(), 1);
    }
}
