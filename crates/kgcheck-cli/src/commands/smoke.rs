//! Smoke command - point-to-point replication check.
//!
//! Creates a fresh collection on the source node, adds the replica node,
//! writes through the source and reads back through the replica. Every
//! failed check is counted; the count is the exit status.

use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use clap::Args;
use kgcheck::{RetryLimit, RetryPolicy, decode_and_merge, exit_code_for};
use kgcheck_client::{Client, ClientConfig};
use kgcheck_store::{StoreError, StoreProxy, StoreResult};
use kgcheck_types::{CollectionName, ErrorKind, ItemSet, NodeId, RecordId};
use tracing::debug;

use crate::style::{print_error, print_labeled, print_spacer, print_success};

#[derive(Args, Debug)]
pub struct SmokeArgs {
    /// Address of the node the collection is created on.
    #[arg(long)]
    pub source: String,

    /// Node id of the source node.
    #[arg(long, default_value = "nodeA")]
    pub source_node: String,

    /// Address of the replica node.
    #[arg(long)]
    pub replica: String,

    /// Node id of the replica node.
    #[arg(long)]
    pub replica_node: String,

    /// Collection to create (defaults to a fresh, timestamped name).
    #[arg(long)]
    pub collection: Option<String>,

    /// How long to wait for the write to reach the replica, in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    pub wait_ms: u64,
}

/// Tallies check results.
#[derive(Default)]
struct Checks {
    errors: u64,
}

impl Checks {
    fn expect_ok<T>(&mut self, what: &str, result: StoreResult<T>) -> Option<T> {
        match result {
            Ok(value) => {
                print_success(what);
                Some(value)
            }
            Err(e) => {
                self.errors += 1;
                print_error(&format!("{what}: {e}"));
                None
            }
        }
    }

    fn expect_kind<T>(&mut self, what: &str, expected: ErrorKind, result: StoreResult<T>) {
        match result {
            Err(e) if e.kind() == expected => print_success(what),
            Err(e) => {
                self.errors += 1;
                print_error(&format!("{what}: expected {expected}, got {e}"));
            }
            Ok(_) => {
                self.errors += 1;
                print_error(&format!("{what}: expected {expected}, got success"));
            }
        }
    }
}

pub fn run(args: &SmokeArgs) -> Result<u8> {
    let collection = CollectionName::new(args.collection.clone().unwrap_or_else(fresh_name));
    let record = RecordId::new("smoke");
    let replica_node = NodeId::new(args.replica_node.as_str());

    let mut source = Client::new(args.source.as_str(), ClientConfig::default());
    let mut replica = Client::new(args.replica.as_str(), ClientConfig::default());

    print_labeled("Source", &args.source);
    print_labeled("Replica", &format!("{} ({})", args.replica, replica_node));
    print_labeled("Collection", collection.as_str());
    print_spacer();

    let mut checks = Checks::default();

    checks.expect_ok(
        "create collection on source",
        source.create_collection(&collection, true, &NodeId::new(args.source_node.as_str())),
    );
    checks.expect_ok("add replica", source.add_replica(&collection, &replica_node));
    checks.expect_kind(
        "adding the replica twice is rejected",
        ErrorKind::AlreadyExists,
        source.add_replica(&collection, &replica_node),
    );

    let written: ItemSet = ["smoke-1"].into_iter().collect();
    checks.expect_ok(
        "write through source",
        source.update(&collection, &record, written.encode()),
    );

    let read = read_replicated(&mut replica, &collection, &record, &written, args.wait_ms);
    if let Some(view) = checks.expect_ok("read through replica", read) {
        if view == written {
            print_success(&format!("replica returned {view}"));
        } else {
            checks.errors += 1;
            print_error(&format!("replica returned {view}, expected {written}"));
        }
    }

    print_spacer();
    if checks.errors == 0 {
        print_success("replication smoke test passed");
    } else {
        print_error(&format!("{} check(s) failed", checks.errors));
    }
    Ok(exit_code_for(checks.errors))
}

/// Polls the replica until it returns `expected` or the wait is over,
/// returning the last view it saw.
fn read_replicated<S: StoreProxy>(
    replica: &mut S,
    collection: &CollectionName,
    record: &RecordId,
    expected: &ItemSet,
    wait_ms: u64,
) -> StoreResult<ItemSet> {
    let mut retrier = RetryPolicy::fixed(Duration::from_millis(50))
        .with_limit(RetryLimit::Deadline(Duration::from_millis(wait_ms)))
        .retrier();

    loop {
        let result = replica.read(collection, record).and_then(|versions| {
            decode_and_merge(&versions).map_err(|e| StoreError::unknown(e.to_string()))
        });

        let kind = match &result {
            Ok(view) if view == expected => return result,
            Ok(_) => ErrorKind::NotFound,
            Err(e) => e.kind(),
        };
        match retrier.next_delay(kind) {
            Some(delay) => {
                debug!(attempt = retrier.failures(), %kind, "waiting for replication");
                thread::sleep(delay);
            }
            None => return result,
        }
    }
}

fn fresh_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis());
    format!("smoke-{millis}")
}
