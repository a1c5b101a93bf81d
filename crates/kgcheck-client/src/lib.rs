//! # kgcheck-client: RPC client for a `kgcheck` store server
//!
//! This crate provides a synchronous client for the binary wire protocol
//! defined in `kgcheck-wire`. [`Client`] implements
//! [`StoreProxy`](kgcheck_store::StoreProxy), so the verification core can
//! drive a remote store exactly like an in-process one.
//!
//! ## Usage
//!
//! ```ignore
//! use kgcheck_client::{Client, ClientConfig};
//! use kgcheck_store::StoreProxy;
//! use kgcheck_types::{CollectionName, NodeId, RecordId};
//!
//! let mut client = Client::connect("127.0.0.1:7411", ClientConfig::default())?;
//!
//! let kg = CollectionName::new("forumkeygroup");
//! client.create_collection(&kg, true, &NodeId::new("nodeA"))?;
//! let versions = client.read(&kg, &RecordId::new("forumkey"))?;
//! ```
//!
//! ## Failure mapping
//!
//! Transport failures (refused connections, timeouts, resets) surface as
//! `ErrorKind::Unavailable`. The connection is dropped and reopened on the
//! next call.

mod client;
mod error;

pub use client::{Client, ClientConfig};
pub use error::{ClientError, ClientResult};
