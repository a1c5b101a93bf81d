//! Client error types.

use kgcheck_store::StoreError;
use kgcheck_types::ErrorKind;
use kgcheck_wire::{RequestId, WireError};
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur talking to a store server.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connecting, reading or writing the socket failed.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The address did not resolve to any socket address.
    #[error("could not resolve address {0}")]
    Resolve(String),

    /// A frame or message could not be decoded.
    #[error("wire protocol error: {0}")]
    Wire(#[from] WireError),

    /// The server answered a different request than the one sent.
    #[error("response id mismatch: expected {expected:?}, got {received:?}")]
    ResponseMismatch {
        expected: RequestId,
        received: RequestId,
    },

    /// The server answered with a body the operation does not produce.
    #[error("unexpected response to {op}")]
    UnexpectedResponse { op: &'static str },

    /// The server rejected the operation.
    #[error("server error ({kind}): {message}")]
    Server { kind: ErrorKind, message: String },
}

impl ClientError {
    /// Classifies this error for the verification core.
    ///
    /// Transport failures are `Unavailable`; protocol confusion is `Unknown`;
    /// server-side errors keep the kind the server reported.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Connection(_) | ClientError::Resolve(_) => ErrorKind::Unavailable,
            ClientError::Wire(_)
            | ClientError::ResponseMismatch { .. }
            | ClientError::UnexpectedResponse { .. } => ErrorKind::Unknown,
            ClientError::Server { kind, .. } => *kind,
        }
    }
}

impl From<ClientError> for StoreError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Server { kind, message } => StoreError::new(kind, message),
            other => StoreError::new(other.kind(), other.to_string()),
        }
    }
}
