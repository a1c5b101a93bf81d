//! Connection state management.

use std::io::{self, Read, Write};

use bytes::BytesMut;
use kgcheck_store::MemorySession;
use kgcheck_types::ErrorKind;
use kgcheck_wire::{FRAME_HEADER_SIZE, Frame, Request, Response, WireError};
use mio::net::TcpStream;
use mio::{Interest, Token};
use tracing::warn;

use crate::error::ServerResult;

/// State of a client connection.
pub struct Connection {
    pub token: Token,
    pub stream: TcpStream,
    pub read_buf: BytesMut,
    pub write_buf: BytesMut,
    /// The store session serving this connection's requests.
    pub session: MemorySession,
    /// Whether the connection is closing.
    pub closing: bool,
}

impl Connection {
    pub fn new(token: Token, stream: TcpStream, session: MemorySession, buffer_size: usize) -> Self {
        Self {
            token,
            stream,
            read_buf: BytesMut::with_capacity(buffer_size),
            write_buf: BytesMut::with_capacity(buffer_size),
            session,
            closing: false,
        }
    }

    /// Reads data from the socket into the read buffer.
    ///
    /// Returns `true` if the connection is still open.
    pub fn read(&mut self) -> io::Result<bool> {
        let mut temp_buf = [0u8; 4096];

        loop {
            match self.stream.read(&mut temp_buf) {
                Ok(0) => return Ok(false),
                Ok(n) => self.read_buf.extend_from_slice(&temp_buf[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(true),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Writes data from the write buffer to the socket.
    ///
    /// Returns `true` if all data was written.
    pub fn write(&mut self) -> io::Result<bool> {
        while !self.write_buf.is_empty() {
            match self.stream.write(&self.write_buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write to socket",
                    ));
                }
                Ok(n) => {
                    let _ = self.write_buf.split_to(n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Attempts to decode a request from the read buffer.
    pub fn try_decode_request(&mut self) -> ServerResult<Option<Request>> {
        match Frame::decode(&mut self.read_buf)? {
            Some(frame) => Ok(Some(Request::from_frame(&frame)?)),
            None => Ok(None),
        }
    }

    /// Queues a response to be sent.
    pub fn queue_response(&mut self, response: &Response) -> ServerResult<()> {
        encode_response(response, &mut self.write_buf)
    }

    /// Returns the interest flags for this connection.
    pub fn interest(&self) -> Interest {
        if self.write_buf.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        }
    }

    /// Returns true if a complete frame header is buffered.
    pub fn has_pending_data(&self) -> bool {
        self.read_buf.len() >= FRAME_HEADER_SIZE
    }
}

/// Frames `response` into `dst`.
///
/// A response too large for one frame is replaced by an error response
/// with the same id, so the client gets an answer it can decode.
pub fn encode_response(response: &Response, dst: &mut BytesMut) -> ServerResult<()> {
    match response.to_frame()?.encode(dst) {
        Err(WireError::FrameTooLarge { size, max }) => {
            warn!(request_id = response.id.0, size, max, "response exceeds frame limit");
            let refusal = Response::error(
                response.id,
                ErrorKind::Unknown,
                format!("response of {size} bytes exceeds the {max} byte frame limit"),
            );
            refusal.to_frame()?.encode(dst)?;
            Ok(())
        }
        result => Ok(result?),
    }
}
