//! # kgcheck-store: the store proxy contract
//!
//! The verification core only talks to the replicated store through the
//! [`StoreProxy`] trait: four blocking operations, each failing with a
//! [`StoreError`] tagged by [`ErrorKind`](kgcheck_types::ErrorKind).
//!
//! Implementations:
//! - [`MemorySession`]: one client's view of an in-process [`MemoryStore`]
//!   (used by tests and by the dev server)
//! - `kgcheck_client::Client`: the network client
//!
//! ## Usage
//!
//! ```
//! use kgcheck_store::{MemoryStore, StoreProxy};
//! use kgcheck_types::{CollectionName, ItemSet, NodeId, RecordId};
//!
//! let store = MemoryStore::new();
//! let mut session = store.session("client-a");
//!
//! let kg = CollectionName::new("forumkeygroup");
//! let key = RecordId::new("forumkey");
//! session.create_collection(&kg, true, &NodeId::new("nodeA")).unwrap();
//! session.update(&kg, &key, ItemSet::new().encode()).unwrap();
//!
//! let versions = session.read(&kg, &key).unwrap();
//! assert_eq!(versions.len(), 1);
//! ```

mod clock;
mod error;
mod memory;

use bytes::Bytes;
use kgcheck_types::{CollectionName, NodeId, RecordId};

pub use clock::VClock;
pub use error::{StoreError, StoreResult};
pub use memory::{MemorySession, MemoryStore};

/// Blocking RPC facade over the replicated store.
///
/// Methods take `&mut self` because a proxy may carry per-client session
/// state (a connection, or the versions it last read).
pub trait StoreProxy {
    /// Creates a named collection with `first_node` as its only replica.
    fn create_collection(
        &mut self,
        name: &CollectionName,
        mutable: bool,
        first_node: &NodeId,
    ) -> StoreResult<()>;

    /// Adds `node` as a replica of an existing collection.
    fn add_replica(&mut self, collection: &CollectionName, node: &NodeId) -> StoreResult<()>;

    /// Reads every currently visible version of a record.
    fn read(&mut self, collection: &CollectionName, record: &RecordId) -> StoreResult<Vec<Bytes>>;

    /// Writes a new version of a record.
    fn update(
        &mut self,
        collection: &CollectionName,
        record: &RecordId,
        payload: Bytes,
    ) -> StoreResult<()>;
}

impl<T: StoreProxy + ?Sized> StoreProxy for &mut T {
    fn create_collection(
        &mut self,
        name: &CollectionName,
        mutable: bool,
        first_node: &NodeId,
    ) -> StoreResult<()> {
        (**self).create_collection(name, mutable, first_node)
    }

    fn add_replica(&mut self, collection: &CollectionName, node: &NodeId) -> StoreResult<()> {
        (**self).add_replica(collection, node)
    }

    fn read(&mut self, collection: &CollectionName, record: &RecordId) -> StoreResult<Vec<Bytes>> {
        (**self).read(collection, record)
    }

    fn update(
        &mut self,
        collection: &CollectionName,
        record: &RecordId,
        payload: Bytes,
    ) -> StoreResult<()> {
        (**self).update(collection, record, payload)
    }
}

impl<T: StoreProxy + ?Sized> StoreProxy for Box<T> {
    fn create_collection(
        &mut self,
        name: &CollectionName,
        mutable: bool,
        first_node: &NodeId,
    ) -> StoreResult<()> {
        (**self).create_collection(name, mutable, first_node)
    }

    fn add_replica(&mut self, collection: &CollectionName, node: &NodeId) -> StoreResult<()> {
        (**self).add_replica(collection, node)
    }

    fn read(&mut self, collection: &CollectionName, record: &RecordId) -> StoreResult<Vec<Bytes>> {
        (**self).read(collection, record)
    }

    fn update(
        &mut self,
        collection: &CollectionName,
        record: &RecordId,
        payload: Bytes,
    ) -> StoreResult<()> {
        (**self).update(collection, record, payload)
    }
}
