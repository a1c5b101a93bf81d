//! End-to-end tests: network clients against a running dev server.

use std::net::SocketAddr;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use kgcheck::{RetryPolicy, Verifier, VerifyConfig};

use kgcheck_client::{Client, ClientConfig};
use kgcheck_server::{Server, ServerConfig, ServerResult, ShutdownHandle};
use kgcheck_store::{MemoryStore, StoreProxy};
use kgcheck_types::{CollectionName, ConflictPolicy, ErrorKind, ItemSet, NodeId, RecordId};

struct Running {
    addr: SocketAddr,
    store: MemoryStore,
    shutdown: ShutdownHandle,
    thread: Option<JoinHandle<ServerResult<()>>>,
}

impl Running {
    fn start() -> Self {
        Self::start_with(ConflictPolicy::Reject)
    }

    fn start_with(policy: ConflictPolicy) -> Self {
        let config = ServerConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)))
            .with_conflict_policy(policy);
        let server = Server::bind_fresh(config).unwrap();
        let store = server.store().clone();
        let addr = server.local_addr();
        let shutdown = server.shutdown_handle();
        let thread = thread::spawn(move || server.run());
        Self {
            addr,
            store,
            shutdown,
            thread: Some(thread),
        }
    }

    fn client(&self) -> Client {
        Client::connect(self.addr.to_string(), ClientConfig::default()).unwrap()
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        self.shutdown.shutdown();
        if let Some(thread) = self.thread.take() {
            thread.join().unwrap().unwrap();
        }
    }
}

fn kg() -> CollectionName {
    CollectionName::new("forumkeygroup")
}

fn key() -> RecordId {
    RecordId::new("forumkey")
}

#[test]
fn create_replicate_update_read() {
    let server = Running::start();
    let mut a = server.client();
    let mut b = server.client();

    a.create_collection(&kg(), true, &NodeId::new("nodeA")).unwrap();
    b.add_replica(&kg(), &NodeId::new("nodeB")).unwrap();

    let written: ItemSet = ["a-1"].into_iter().collect();
    a.update(&kg(), &key(), written.encode()).unwrap();

    let versions = b.read(&kg(), &key()).unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(ItemSet::decode(&versions[0]).unwrap(), written);
    assert_eq!(
        server.store.replicas(&kg()).unwrap(),
        vec![NodeId::new("nodeA"), NodeId::new("nodeB")]
    );
}

#[test]
fn errors_cross_the_wire_with_their_kind() {
    let server = Running::start();
    let mut client = server.client();

    let err = client.read(&kg(), &key()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    client
        .create_collection(&kg(), true, &NodeId::new("nodeA"))
        .unwrap();
    let err = client
        .create_collection(&kg(), true, &NodeId::new("nodeA"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[test]
fn each_connection_is_its_own_session() {
    let server = Running::start();
    let mut a = server.client();
    let mut b = server.client();

    a.create_collection(&kg(), true, &NodeId::new("nodeA")).unwrap();
    a.update(&kg(), &key(), ItemSet::new().encode()).unwrap();

    a.read(&kg(), &key()).unwrap();
    b.read(&kg(), &key()).unwrap();
    a.update(&kg(), &key(), ["a-1"].into_iter().collect::<ItemSet>().encode())
        .unwrap();

    // b read before a's write, so its write is stale.
    let err = b
        .update(&kg(), &key(), ["b-1"].into_iter().collect::<ItemSet>().encode())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[test]
fn stopped_server_is_unavailable() {
    let first = Running::start();
    let addr = first.addr;
    let mut client = Client::new(addr.to_string(), ClientConfig::default());
    client
        .create_collection(&kg(), true, &NodeId::new("nodeA"))
        .unwrap();
    drop(first);

    let err = client.read(&kg(), &key()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert!(!client.is_connected());
}

#[test]
fn keep_siblings_server_returns_concurrent_versions() {
    let server = Running::start_with(ConflictPolicy::KeepSiblings);
    let mut a = server.client();
    let mut b = server.client();

    a.create_collection(&kg(), true, &NodeId::new("nodeA")).unwrap();
    a.update(&kg(), &key(), ["a"].into_iter().collect::<ItemSet>().encode())
        .unwrap();
    b.update(&kg(), &key(), ["b"].into_iter().collect::<ItemSet>().encode())
        .unwrap();

    assert_eq!(a.read(&kg(), &key()).unwrap().len(), 2);
}

#[test]
fn verifiers_pass_over_tcp() {
    let server = Running::start();

    let handles: Vec<_> = ["c1", "c2"]
        .into_iter()
        .enumerate()
        .map(|(i, id)| {
            let client = server.client();
            thread::spawn(move || {
                let config = VerifyConfig::new(id, format!("node{i}"))
                    .with_iterations(20)
                    .with_update_percentage(50)
                    .with_inter_op_delay(Duration::ZERO)
                    .with_retry(RetryPolicy::fixed(Duration::from_millis(1)))
                    .with_seed(i as u64);
                Verifier::new(config, client).run().unwrap()
            })
        })
        .collect();

    for handle in handles {
        let report = handle.join().unwrap();
        assert!(report.passed(), "{:?}", report.violations);
        assert_eq!(report.steps, 19);
    }
}
