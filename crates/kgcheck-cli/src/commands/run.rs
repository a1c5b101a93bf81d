//! Run command - drives one or more verification sessions.

use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Args;
use kgcheck::{RunReport, Verifier, exit_code_for};
use kgcheck_client::{Client, ClientConfig};
use kgcheck_config::KgcheckConfig;
use kgcheck_store::{MemoryStore, StoreProxy};
use tracing::info;

use crate::style::banner::print_banner;
use crate::style::{
    print_error, print_info_table, print_spacer, print_verdict, print_violation, print_warn,
    report_table,
};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Client id; prefixes every element this client adds.
    #[arg(long)]
    pub id: Option<String>,

    /// Node registered as a replica of the collection.
    #[arg(long)]
    pub node_id: Option<String>,

    /// Store server address.
    #[arg(long, conflicts_with = "memory")]
    pub host: Option<String>,

    /// Run against an in-process store instead of a server.
    #[arg(long)]
    pub memory: bool,

    /// Number of iterations (steps run are 1..ops).
    #[arg(long)]
    pub ops: Option<u64>,

    /// Chance (0-100) that a step adds an element.
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub update_percentage: Option<u8>,

    /// Pause between steps in milliseconds.
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Seed for update decisions (client k uses seed + k).
    #[arg(long)]
    pub seed: Option<u64>,

    /// Concurrent sessions to run.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub clients: Option<u32>,

    /// Collection (keygroup) name.
    #[arg(long)]
    pub collection: Option<String>,

    /// Record id within the collection.
    #[arg(long)]
    pub record: Option<String>,

    /// Keep running after a violation and count every one.
    #[arg(long)]
    pub keep_going: bool,

    /// Print the reports as JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut KgcheckConfig) {
        let client = &mut config.client;
        if let Some(id) = &self.id {
            client.id.clone_from(id);
        }
        if let Some(node_id) = &self.node_id {
            client.node_id.clone_from(node_id);
        }
        if self.memory {
            client.host = None;
        } else if let Some(host) = &self.host {
            client.host = Some(host.clone());
        }
        if let Some(collection) = &self.collection {
            client.collection.clone_from(collection);
        }
        if let Some(record) = &self.record {
            client.record.clone_from(record);
        }

        let run = &mut config.run;
        if let Some(ops) = self.ops {
            run.iterations = ops;
        }
        if let Some(percentage) = self.update_percentage {
            run.update_percentage = percentage;
        }
        if let Some(delay) = self.delay_ms {
            run.inter_op_delay_ms = delay;
        }
        if let Some(seed) = self.seed {
            run.seed = Some(seed);
        }
        if let Some(clients) = self.clients {
            run.clients = clients;
        }
        if self.keep_going {
            run.stop_on_violation = false;
        }
    }
}

/// Where sessions connect to.
enum Backend {
    Memory(MemoryStore),
    Remote { address: String, config: ClientConfig },
}

impl Backend {
    fn from_config(config: &KgcheckConfig) -> Self {
        match &config.client.host {
            Some(address) => Backend::Remote {
                address: address.clone(),
                config: ClientConfig {
                    connect_timeout: Duration::from_millis(config.client.connect_timeout_ms),
                    read_timeout: Some(Duration::from_millis(config.client.read_timeout_ms)),
                    write_timeout: Some(Duration::from_millis(config.client.write_timeout_ms)),
                    ..ClientConfig::default()
                },
            },
            None => Backend::Memory(MemoryStore::with_policy(config.server.conflict_policy)),
        }
    }

    fn describe(&self) -> String {
        match self {
            Backend::Memory(store) => format!("in-memory ({})", store.policy()),
            Backend::Remote { address, .. } => address.clone(),
        }
    }

    fn open(&self, client_id: &str) -> Box<dyn StoreProxy + Send> {
        match self {
            Backend::Memory(store) => Box::new(store.session(client_id)),
            Backend::Remote { address, config } => {
                Box::new(Client::new(address.clone(), config.clone()))
            }
        }
    }
}

/// Runs the sessions and returns the exit status for their violations.
pub fn run(project: &Path, args: RunArgs) -> Result<u8> {
    let mut config = super::load_config(project)?;
    args.apply(&mut config);
    config.validate().context("Invalid run options")?;

    let backend = Backend::from_config(&config);
    let sessions = session_ids(&config);

    if !args.json {
        print_banner();
        print_info_table(&[
            ("Store", backend.describe()),
            ("Collection", config.client.collection.clone()),
            ("Record", config.client.record.clone()),
            ("Clients", sessions.len().to_string()),
            ("Iterations", config.run.iterations.to_string()),
            ("Update chance", format!("{}%", config.run.update_percentage)),
        ]);
        print_spacer();
    }

    let results: Vec<(String, Result<RunReport, String>)> = thread::scope(|scope| {
        let handles: Vec<_> = sessions
            .iter()
            .map(|(k, client_id, node_id)| {
                let mut verify = config.verify_config(client_id);
                verify.node_id = node_id.as_str().into();
                if let Some(seed) = config.run.seed {
                    verify.seed = Some(seed.wrapping_add(*k));
                }
                let store = backend.open(client_id);
                let handle = scope.spawn(move || Verifier::new(verify, store).run());
                (client_id.clone(), handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(client_id, handle)| {
                let result = match handle.join() {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(_) => Err("session thread panicked".to_string()),
                };
                (client_id, result)
            })
            .collect()
    });

    let mut reports = Vec::new();
    let mut failures = Vec::new();
    for (client_id, result) in results {
        match result {
            Ok(report) => reports.push(report),
            Err(e) => failures.push(format!("{client_id}: {e}")),
        }
    }

    let total: u64 = reports.iter().map(RunReport::violation_count).sum();
    info!(clients = reports.len(), violations = total, "run complete");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_summary(&reports);
    }

    if !failures.is_empty() {
        for failure in &failures {
            print_error(failure);
        }
        bail!("{} of {} session(s) could not complete", failures.len(), sessions.len());
    }

    Ok(exit_code_for(total))
}

/// (index, client id, node id) for every session to start.
fn session_ids(config: &KgcheckConfig) -> Vec<(u64, String, String)> {
    let count = u64::from(config.run.clients);
    if count == 1 {
        return vec![(0, config.client.id.clone(), config.client.node_id.clone())];
    }
    (0..count)
        .map(|k| {
            (
                k,
                format!("{}{k}", config.client.id),
                format!("{}{k}", config.client.node_id),
            )
        })
        .collect()
}

fn print_summary(reports: &[RunReport]) {
    if reports.is_empty() {
        return;
    }
    println!("{}", report_table(reports));
    print_spacer();

    let steps: u64 = reports.iter().map(|r| r.steps).sum();
    let mrc: u64 = reports.iter().map(RunReport::mrc_violations).sum();
    let rywc: u64 = reports.iter().map(RunReport::rywc_violations).sum();
    println!("  MRC violations:  {mrc}/{steps}");
    println!("  RYWC violations: {rywc}/{steps}");
    print_spacer();

    for report in reports {
        for violation in &report.violations {
            print_violation(report.client_id.as_str(), violation);
        }
        if let Some(step) = report.aborted_at {
            print_warn(&format!("{} stopped at step {step}", report.client_id));
        }
    }

    print_verdict(reports.iter().all(RunReport::passed));
}
