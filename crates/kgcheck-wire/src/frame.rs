//! Length-prefixed frames.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{WireError, WireResult};

/// Protocol magic at the start of every frame.
pub const MAGIC: [u8; 4] = *b"KGCK";

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Size of the frame header: magic, version and payload length.
pub const FRAME_HEADER_SIZE: usize = 4 + 1 + 4;

/// Largest payload a frame may carry (16 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// A single frame on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload: Bytes,
}

impl Frame {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Appends the encoded frame to `dst`.
    ///
    /// Fails without touching `dst` if the payload exceeds
    /// [`MAX_PAYLOAD_SIZE`], since the peer would refuse the frame.
    pub fn encode(&self, dst: &mut BytesMut) -> WireResult<()> {
        let size = self.payload.len();
        if size > MAX_PAYLOAD_SIZE {
            return Err(WireError::FrameTooLarge {
                size,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        dst.reserve(FRAME_HEADER_SIZE + size);
        dst.put_slice(&MAGIC);
        dst.put_u8(PROTOCOL_VERSION);
        // Bounded by MAX_PAYLOAD_SIZE above.
        dst.put_u32(size as u32);
        dst.put_slice(&self.payload);
        Ok(())
    }

    /// Encodes the frame into a fresh buffer.
    pub fn to_bytes(&self) -> WireResult<Bytes> {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + self.payload.len());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decodes one frame from the front of `src`.
    ///
    /// Returns `Ok(None)` and leaves `src` untouched if it does not yet hold
    /// a complete frame. On success the frame's bytes are consumed.
    pub fn decode(src: &mut BytesMut) -> WireResult<Option<Frame>> {
        if src.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&src[..4]);
        if magic != MAGIC {
            return Err(WireError::InvalidMagic(magic));
        }

        let version = src[4];
        if version != PROTOCOL_VERSION {
            return Err(WireError::UnsupportedVersion {
                found: version,
                expected: PROTOCOL_VERSION,
            });
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&src[5..FRAME_HEADER_SIZE]);
        let size = u32::from_be_bytes(len_bytes) as usize;
        if size > MAX_PAYLOAD_SIZE {
            return Err(WireError::FrameTooLarge {
                size,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        if src.len() < FRAME_HEADER_SIZE + size {
            src.reserve(FRAME_HEADER_SIZE + size - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEADER_SIZE);
        let payload = src.split_to(size).freeze();
        Ok(Some(Frame { payload }))
    }
}
