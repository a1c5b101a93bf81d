//! Wire protocol error types.

use thiserror::Error;

/// Result type for wire operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors decoding or encoding frames and messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// The frame did not start with the protocol magic.
    #[error("invalid frame magic: {0:02x?}")]
    InvalidMagic([u8; 4]),

    /// The peer speaks a different protocol version.
    #[error("unsupported protocol version {found} (expected {expected})")]
    UnsupportedVersion { found: u8, expected: u8 },

    /// The declared payload length exceeds the limit.
    #[error("frame payload of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    /// The payload could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),
}
