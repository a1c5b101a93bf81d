//! Request and response messages.

use bytes::Bytes;
use kgcheck_types::{CollectionName, ErrorKind, NodeId, RecordId};
use serde::{Deserialize, Serialize};

use crate::error::WireResult;
use crate::frame::Frame;

/// Correlates a response with the request that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl RequestId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the id that follows this one.
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// One store operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestBody {
    CreateCollection {
        name: CollectionName,
        mutable: bool,
        first_node: NodeId,
    },
    AddReplica {
        collection: CollectionName,
        node: NodeId,
    },
    Read {
        collection: CollectionName,
        record: RecordId,
    },
    Update {
        collection: CollectionName,
        record: RecordId,
        payload: Bytes,
    },
}

impl RequestBody {
    /// Short operation name for logs.
    pub fn op_name(&self) -> &'static str {
        match self {
            RequestBody::CreateCollection { .. } => "create_collection",
            RequestBody::AddReplica { .. } => "add_replica",
            RequestBody::Read { .. } => "read",
            RequestBody::Update { .. } => "update",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub body: RequestBody,
}

impl Request {
    pub fn new(id: RequestId, body: RequestBody) -> Self {
        Self { id, body }
    }

    pub fn to_frame(&self) -> WireResult<Frame> {
        Ok(Frame::new(postcard::to_allocvec(self)?))
    }

    pub fn from_frame(frame: &Frame) -> WireResult<Self> {
        Ok(postcard::from_bytes(&frame.payload)?)
    }
}

/// Outcome of one store operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseBody {
    /// The operation succeeded and returns nothing.
    Done,
    /// Every visible version of the record that was read.
    Versions(Vec<Bytes>),
    /// The operation failed.
    Error { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: RequestId,
    pub body: ResponseBody,
}

impl Response {
    pub fn new(id: RequestId, body: ResponseBody) -> Self {
        Self { id, body }
    }

    /// Creates an error response.
    pub fn error(id: RequestId, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            id,
            body: ResponseBody::Error {
                kind,
                message: message.into(),
            },
        }
    }

    pub fn to_frame(&self) -> WireResult<Frame> {
        Ok(Frame::new(postcard::to_allocvec(self)?))
    }

    pub fn from_frame(frame: &Frame) -> WireResult<Self> {
        Ok(postcard::from_bytes(&frame.payload)?)
    }
}
