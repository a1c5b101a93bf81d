//! Read-and-reconcile.
//!
//! A read that returns more than one version exposes an unresolved write
//! conflict. The reader merges the versions and writes the union back so
//! later readers see a single version again. If that write is rejected the
//! view it was based on is already stale, so the whole read starts over.

use std::thread;

use bytes::Bytes;
use kgcheck_store::{StoreError, StoreProxy};
use kgcheck_types::{CollectionName, ItemSet, RecordId};
use tracing::{debug, trace};

use crate::error::{VerifyError, VerifyResult};
use crate::merge::decode_and_merge;
use crate::retry::RetryPolicy;

/// Default cap on rejected reconciliation writes within one read.
pub const DEFAULT_RECONCILE_ATTEMPTS: u32 = 100;

/// The merged view produced by [`read_and_reconcile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledRead {
    /// The client's view of the record for this step.
    pub view: ItemSet,
    /// Number of versions in the read the view came from.
    pub versions: usize,
    /// Whether the view was written back as a reconciling version.
    pub reconciled: bool,
    /// Reconciling writes rejected before the view was settled.
    pub rejected: u32,
}

/// Reads the record until at least one version is visible and reconciles
/// divergent versions.
///
/// Read failures follow `read_policy`. Rejected reconciling writes are
/// retried up to `max_reconcile_attempts` times, then reported as
/// [`VerifyError::RetriesExhausted`] so starvation is never mistaken for a
/// consistency violation.
pub fn read_and_reconcile<S: StoreProxy>(
    store: &mut S,
    collection: &CollectionName,
    record: &RecordId,
    read_policy: &RetryPolicy,
    max_reconcile_attempts: u32,
) -> VerifyResult<ReconciledRead> {
    let mut rejected = 0;

    loop {
        let versions = read_versions(store, collection, record, read_policy)?;
        let view = decode_and_merge(&versions)?;

        if versions.len() == 1 {
            return Ok(ReconciledRead {
                view,
                versions: 1,
                reconciled: false,
                rejected,
            });
        }

        debug!(%collection, %record, versions = versions.len(), "divergent versions, reconciling");
        match store.update(collection, record, view.encode()) {
            Ok(()) => {
                return Ok(ReconciledRead {
                    view,
                    versions: versions.len(),
                    reconciled: true,
                    rejected,
                });
            }
            Err(e) => {
                rejected += 1;
                debug!(%collection, %record, rejected, error = %e, "reconciling write rejected, rereading");
                if rejected >= max_reconcile_attempts {
                    return Err(VerifyError::RetriesExhausted {
                        operation: "reconcile",
                        attempts: rejected,
                        last: e,
                    });
                }
                thread::sleep(read_policy.delay_for_attempt(rejected - 1, e.kind()));
            }
        }
    }
}

/// Reads until the store returns at least one version.
fn read_versions<S: StoreProxy>(
    store: &mut S,
    collection: &CollectionName,
    record: &RecordId,
    policy: &RetryPolicy,
) -> VerifyResult<Vec<Bytes>> {
    let mut retrier = policy.retrier();
    loop {
        let failure = match store.read(collection, record) {
            Ok(versions) if !versions.is_empty() => return Ok(versions),
            Ok(_) => StoreError::not_found("read returned no versions"),
            Err(e) => e,
        };

        let Some(delay) = retrier.next_delay(failure.kind()) else {
            return Err(VerifyError::RetriesExhausted {
                operation: "read",
                attempts: retrier.failures(),
                last: failure,
            });
        };
        trace!(%collection, %record, kind = %failure.kind(), ?delay, "retrying read");
        thread::sleep(delay);
    }
}
