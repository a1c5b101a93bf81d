//! # kgcheck-wire: Binary wire protocol for `kgcheck`
//!
//! The dev store server and the network client exchange length-prefixed
//! frames over TCP. Each frame carries one postcard-encoded [`Request`] or
//! [`Response`].
//!
//! ## Frame layout
//!
//! ```text
//! ┌──────────┬─────────┬────────────┬─────────────────────┐
//! │ "KGCK"   │ version │ length     │ payload             │
//! │ 4 bytes  │ 1 byte  │ 4 bytes BE │ `length` bytes      │
//! └──────────┴─────────┴────────────┴─────────────────────┘
//! ```
//!
//! Frames are decoded incrementally: [`Frame::decode`] returns `Ok(None)`
//! until the buffer holds a complete frame, so callers can feed it whatever
//! the socket produced so far.

mod error;
mod frame;
mod message;

#[cfg(test)]
mod tests;

pub use error::{WireError, WireResult};
pub use frame::{FRAME_HEADER_SIZE, Frame, MAGIC, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};
pub use message::{Request, RequestBody, RequestId, Response, ResponseBody};
