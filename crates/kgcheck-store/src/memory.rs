//! In-process versioned store.
//!
//! [`MemoryStore`] keeps every collection in a shared map guarded by a
//! mutex. Clients never touch it directly: each gets a [`MemorySession`]
//! that remembers the vector clocks of the versions it last read, the same
//! way a middleware tracks what a client has seen.
//!
//! ## Write semantics
//!
//! An update's clock is the join of the clocks the session last read for
//! that record, ticked by the session's writer id. Stored versions whose
//! clocks are dominated by the new clock are replaced. Versions the session
//! never read are not dominated; depending on the [`ConflictPolicy`] the
//! write is either rejected with `Conflict` or accepted with those versions
//! kept as concurrent siblings.
//!
//! ## Fault injection
//!
//! The store exposes hooks to fail reads, reject updates, inject concurrent
//! siblings and force a record back to an arbitrary value, so the
//! verification core can be driven through every retry and violation path.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use kgcheck_types::{CollectionName, ConflictPolicy, ItemSet, NodeId, RecordId};
use tracing::{debug, trace};

use crate::{StoreError, StoreProxy, StoreResult, VClock};

// ============================================================================
// Shared State
// ============================================================================

#[derive(Debug, Clone)]
struct StoredVersion {
    clock: VClock,
    payload: Bytes,
}

#[derive(Debug)]
struct Collection {
    mutable: bool,
    replicas: BTreeSet<NodeId>,
    records: HashMap<RecordId, Vec<StoredVersion>>,
}

#[derive(Debug, Default)]
struct Faults {
    failing_reads: u32,
    rejected_updates: u32,
    unavailable: bool,
}

#[derive(Debug, Default)]
struct State {
    collections: HashMap<CollectionName, Collection>,
    faults: Faults,
    next_session: u64,
    next_injected: u64,
}

impl State {
    fn collection(&self, name: &CollectionName) -> StoreResult<&Collection> {
        self.collections
            .get(name)
            .ok_or_else(|| StoreError::not_found(format!("collection {name} does not exist")))
    }

    fn collection_mut(&mut self, name: &CollectionName) -> StoreResult<&mut Collection> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| StoreError::not_found(format!("collection {name} does not exist")))
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.faults.unavailable {
            return Err(StoreError::unavailable("store is unavailable"));
        }
        Ok(())
    }
}

// ============================================================================
// Memory Store
// ============================================================================

/// Shared in-process store. Cloning yields another handle to the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    policy: ConflictPolicy,
}

impl MemoryStore {
    /// Creates an empty store that rejects conflicting writes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with the given conflict policy.
    pub fn with_policy(policy: ConflictPolicy) -> Self {
        Self {
            state: Arc::default(),
            policy,
        }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Opens a new client session.
    ///
    /// The writer id used in vector clocks is `label` suffixed with a
    /// per-store sequence number, so two sessions never share a clock entry
    /// even if they share a label.
    pub fn session(&self, label: impl Into<String>) -> MemorySession {
        let seq = {
            let mut state = self.lock();
            state.next_session += 1;
            state.next_session
        };
        MemorySession {
            store: self.clone(),
            writer: format!("{}#{seq}", label.into()),
            known: HashMap::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------------
    // Fault injection
    // ------------------------------------------------------------------------

    /// Makes the next `count` reads (from any session) fail as `Unavailable`.
    pub fn fail_next_reads(&self, count: u32) {
        self.lock().faults.failing_reads = count;
    }

    /// Makes the next `count` updates (from any session) fail as `Conflict`.
    pub fn reject_next_updates(&self, count: u32) {
        self.lock().faults.rejected_updates = count;
    }

    /// Makes every operation fail as `Unavailable` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().faults.unavailable = unavailable;
    }

    /// Adds a version that is concurrent with every stored version.
    ///
    /// Creates the record if it does not exist. The collection must exist.
    pub fn inject_sibling(
        &self,
        collection: &CollectionName,
        record: &RecordId,
        items: &ItemSet,
    ) -> StoreResult<()> {
        let mut state = self.lock();
        state.next_injected += 1;
        let writer = format!("injected#{}", state.next_injected);

        let mut clock = VClock::new();
        clock.tick(&writer);

        let versions = state
            .collection_mut(collection)?
            .records
            .entry(record.clone())
            .or_default();
        versions.push(StoredVersion {
            clock,
            payload: items.encode(),
        });
        debug!(%collection, %record, %items, "injected sibling version");
        Ok(())
    }

    /// Replaces every version of a record with a single version holding
    /// `items`, stamped so that it supersedes everything stored before.
    ///
    /// Used to simulate a store that rolls back to an older state.
    pub fn force_value(
        &self,
        collection: &CollectionName,
        record: &RecordId,
        items: &ItemSet,
    ) -> StoreResult<()> {
        let mut state = self.lock();
        state.next_injected += 1;
        let writer = format!("forced#{}", state.next_injected);

        let versions = state
            .collection_mut(collection)?
            .records
            .entry(record.clone())
            .or_default();
        let mut clock = versions
            .iter()
            .fold(VClock::new(), |acc, v| acc.join(&v.clock));
        clock.tick(&writer);

        *versions = vec![StoredVersion {
            clock,
            payload: items.encode(),
        }];
        debug!(%collection, %record, %items, "forced record value");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    pub fn has_collection(&self, collection: &CollectionName) -> bool {
        self.lock().collections.contains_key(collection)
    }

    /// Returns the replicas of a collection, sorted.
    pub fn replicas(&self, collection: &CollectionName) -> Option<Vec<NodeId>> {
        self.lock()
            .collections
            .get(collection)
            .map(|c| c.replicas.iter().cloned().collect())
    }

    /// Returns the raw payloads currently stored for a record.
    pub fn payloads(&self, collection: &CollectionName, record: &RecordId) -> Vec<Bytes> {
        self.lock()
            .collections
            .get(collection)
            .and_then(|c| c.records.get(record))
            .map(|versions| versions.iter().map(|v| v.payload.clone()).collect())
            .unwrap_or_default()
    }
}

// ============================================================================
// Memory Session
// ============================================================================

/// One client's connection to a [`MemoryStore`].
#[derive(Debug)]
pub struct MemorySession {
    store: MemoryStore,
    writer: String,
    known: HashMap<(CollectionName, RecordId), Vec<VClock>>,
}

impl MemorySession {
    /// Returns the writer id this session stamps its versions with.
    pub fn writer(&self) -> &str {
        &self.writer
    }

    /// Returns the store this session belongs to.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

impl StoreProxy for MemorySession {
    fn create_collection(
        &mut self,
        name: &CollectionName,
        mutable: bool,
        first_node: &NodeId,
    ) -> StoreResult<()> {
        let mut state = self.store.lock();
        state.check_available()?;

        if state.collections.contains_key(name) {
            return Err(StoreError::already_exists(format!(
                "collection {name} already exists"
            )));
        }

        state.collections.insert(
            name.clone(),
            Collection {
                mutable,
                replicas: BTreeSet::from([first_node.clone()]),
                records: HashMap::new(),
            },
        );
        debug!(collection = %name, node = %first_node, mutable, "created collection");
        Ok(())
    }

    fn add_replica(&mut self, collection: &CollectionName, node: &NodeId) -> StoreResult<()> {
        let mut state = self.store.lock();
        state.check_available()?;

        let coll = state.collection_mut(collection)?;
        if !coll.replicas.insert(node.clone()) {
            return Err(StoreError::already_exists(format!(
                "node {node} is already a replica of {collection}"
            )));
        }
        debug!(%collection, %node, "added replica");
        Ok(())
    }

    fn read(&mut self, collection: &CollectionName, record: &RecordId) -> StoreResult<Vec<Bytes>> {
        let mut state = self.store.lock();
        state.check_available()?;

        if state.faults.failing_reads > 0 {
            state.faults.failing_reads -= 1;
            return Err(StoreError::unavailable("injected read failure"));
        }

        let versions = state
            .collection(collection)?
            .records
            .get(record)
            .filter(|versions| !versions.is_empty())
            .ok_or_else(|| {
                StoreError::not_found(format!("record {record} in {collection} has no versions"))
            })?;

        let clocks = versions.iter().map(|v| v.clock.clone()).collect();
        let payloads = versions.iter().map(|v| v.payload.clone()).collect();
        drop(state);

        self.known
            .insert((collection.clone(), record.clone()), clocks);
        Ok(payloads)
    }

    fn update(
        &mut self,
        collection: &CollectionName,
        record: &RecordId,
        payload: Bytes,
    ) -> StoreResult<()> {
        let policy = self.store.policy;
        let key = (collection.clone(), record.clone());

        let mut clock = self
            .known
            .get(&key)
            .map(|clocks| clocks.iter().fold(VClock::new(), |acc, c| acc.join(c)))
            .unwrap_or_default();
        clock.tick(&self.writer);

        let mut state = self.store.lock();
        state.check_available()?;

        if state.faults.rejected_updates > 0 {
            state.faults.rejected_updates -= 1;
            return Err(StoreError::conflict("injected update rejection"));
        }

        let coll = state.collection_mut(collection)?;
        let exists = coll.records.get(record).is_some_and(|v| !v.is_empty());
        if !coll.mutable && exists {
            return Err(StoreError::conflict(format!(
                "record {record} in immutable collection {collection} cannot be changed"
            )));
        }

        let versions = coll.records.entry(record.clone()).or_default();
        let siblings: Vec<StoredVersion> = versions
            .iter()
            .filter(|v| !clock.dominates(&v.clock))
            .cloned()
            .collect();

        if !siblings.is_empty() && policy == ConflictPolicy::Reject {
            return Err(StoreError::conflict(format!(
                "record {record} has {} version(s) this session has not read",
                siblings.len()
            )));
        }

        trace!(%collection, %record, %clock, siblings = siblings.len(), "storing version");
        *versions = siblings;
        versions.push(StoredVersion {
            clock: clock.clone(),
            payload,
        });
        drop(state);

        self.known.insert(key, vec![clock]);
        Ok(())
    }
}
