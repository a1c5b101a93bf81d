//! Error types for the verification core.
//!
//! A consistency violation is never an error: it is a finding, reported in
//! the [`RunReport`](crate::RunReport). `VerifyError` covers the cases where
//! the harness itself could not do its job.

use kgcheck_store::StoreError;
use kgcheck_types::{CodecError, CollectionName, NodeId};
use thiserror::Error;

/// Result type for verification operations.
pub type VerifyResult<T> = Result<T, VerifyError>;

/// Harness failures.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// A retry loop ran out of budget.
    #[error("{operation} gave up after {attempts} attempt(s), last error: {last}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        last: StoreError,
    },

    /// The collection could neither be created nor joined.
    #[error("could not set up collection {collection} on node {node} after {attempts} attempt(s){}", last_error(.last.as_ref()))]
    Bootstrap {
        collection: CollectionName,
        node: NodeId,
        attempts: u32,
        last: Option<StoreError>,
    },

    /// The store returned a payload that is not an encoded item set.
    #[error("undecodable record version: {0}")]
    Codec(#[from] CodecError),
}

fn last_error(last: Option<&StoreError>) -> String {
    last
        .map(|e| format!(", last error: {e}"))
        .unwrap_or_default()
}
