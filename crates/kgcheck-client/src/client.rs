//! Synchronous store client.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use kgcheck_store::{StoreProxy, StoreResult};
use kgcheck_types::{CollectionName, NodeId, RecordId};
use kgcheck_wire::{Frame, Request, RequestBody, RequestId, Response, ResponseBody};
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// Read timeout (None = block forever).
    pub read_timeout: Option<Duration>,
    /// Write timeout (None = block forever).
    pub write_timeout: Option<Duration>,
    /// Initial capacity of the read buffer.
    pub buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Some(Duration::from_secs(30)),
            write_timeout: Some(Duration::from_secs(30)),
            buffer_size: 64 * 1024,
        }
    }
}

/// Blocking client for a store server.
///
/// The connection is opened lazily and dropped after any transport or
/// protocol failure; the next operation reconnects. A failed operation is
/// never resent by the client itself, retrying is the caller's decision.
#[derive(Debug)]
pub struct Client {
    address: String,
    config: ClientConfig,
    stream: Option<TcpStream>,
    read_buf: BytesMut,
    next_request_id: RequestId,
}

impl Client {
    /// Creates a client for `address` without connecting yet.
    pub fn new(address: impl Into<String>, config: ClientConfig) -> Self {
        let read_buf = BytesMut::with_capacity(config.buffer_size);
        Self {
            address: address.into(),
            config,
            stream: None,
            read_buf,
            next_request_id: RequestId::new(1),
        }
    }

    /// Creates a client and connects immediately.
    pub fn connect(address: impl Into<String>, config: ClientConfig) -> ClientResult<Self> {
        let mut client = Self::new(address, config);
        client.ensure_connected()?;
        Ok(client)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns true if a connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Drops the current connection, if any.
    pub fn disconnect(&mut self) {
        self.stream = None;
        self.read_buf.clear();
    }

    /// Sends one request and waits for its response.
    pub fn send(&mut self, body: RequestBody) -> ClientResult<ResponseBody> {
        let op = body.op_name();
        let result = self.roundtrip(body);
        match &result {
            Err(ClientError::Server { .. }) | Ok(_) => {}
            Err(err) => {
                warn!(address = %self.address, op, error = %err, "dropping connection");
                self.disconnect();
            }
        }
        result
    }

    fn roundtrip(&mut self, body: RequestBody) -> ClientResult<ResponseBody> {
        let id = self.next_request_id;
        self.next_request_id = id.next();

        let op = body.op_name();
        let bytes = Request::new(id, body).to_frame()?.to_bytes()?;
        self.ensure_connected()?;

        let stream = self.stream_mut()?;
        stream.write_all(&bytes)?;
        stream.flush()?;

        let response = self.read_response()?;
        if response.id != id {
            return Err(ClientError::ResponseMismatch {
                expected: id,
                received: response.id,
            });
        }
        debug!(op, request_id = id.0, "response received");

        match response.body {
            ResponseBody::Error { kind, message } => Err(ClientError::Server { kind, message }),
            body => Ok(body),
        }
    }

    fn read_response(&mut self) -> ClientResult<Response> {
        let mut temp_buf = [0u8; 4096];
        loop {
            if let Some(frame) = Frame::decode(&mut self.read_buf)? {
                return Ok(Response::from_frame(&frame)?);
            }

            let stream = self.stream_mut()?;
            let n = stream.read(&mut temp_buf)?;
            if n == 0 {
                return Err(ClientError::Connection(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "server closed the connection",
                )));
            }
            self.read_buf.extend_from_slice(&temp_buf[..n]);
        }
    }

    fn ensure_connected(&mut self) -> ClientResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let addr = self.resolve()?;
        let stream = TcpStream::connect_timeout(&addr, self.config.connect_timeout)?;
        stream.set_read_timeout(self.config.read_timeout)?;
        stream.set_write_timeout(self.config.write_timeout)?;
        stream.set_nodelay(true)?;

        debug!(address = %self.address, "connected");
        self.read_buf.clear();
        self.stream = Some(stream);
        Ok(())
    }

    fn resolve(&self) -> ClientResult<SocketAddr> {
        self.address
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ClientError::Resolve(self.address.clone()))
    }

    fn stream_mut(&mut self) -> ClientResult<&mut TcpStream> {
        self.stream.as_mut().ok_or_else(|| {
            ClientError::Connection(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "not connected",
            ))
        })
    }

    fn expect_done(&mut self, body: RequestBody) -> ClientResult<()> {
        let op = body.op_name();
        match self.send(body)? {
            ResponseBody::Done => Ok(()),
            _ => Err(ClientError::UnexpectedResponse { op }),
        }
    }
}

impl StoreProxy for Client {
    fn create_collection(
        &mut self,
        name: &CollectionName,
        mutable: bool,
        first_node: &NodeId,
    ) -> StoreResult<()> {
        Ok(self.expect_done(RequestBody::CreateCollection {
            name: name.clone(),
            mutable,
            first_node: first_node.clone(),
        })?)
    }

    fn add_replica(&mut self, collection: &CollectionName, node: &NodeId) -> StoreResult<()> {
        Ok(self.expect_done(RequestBody::AddReplica {
            collection: collection.clone(),
            node: node.clone(),
        })?)
    }

    fn read(&mut self, collection: &CollectionName, record: &RecordId) -> StoreResult<Vec<Bytes>> {
        let body = RequestBody::Read {
            collection: collection.clone(),
            record: record.clone(),
        };
        match self.send(body)? {
            ResponseBody::Versions(versions) => Ok(versions),
            _ => Err(ClientError::UnexpectedResponse { op: "read" }.into()),
        }
    }

    fn update(
        &mut self,
        collection: &CollectionName,
        record: &RecordId,
        payload: Bytes,
    ) -> StoreResult<()> {
        Ok(self.expect_done(RequestBody::Update {
            collection: collection.clone(),
            record: record.clone(),
            payload,
        })?)
    }
}
