//! kgcheck command line.
//!
//! Probes a replicated key-value store for monotonic reads and
//! read-your-writes while several clients write the same record.
//!
//! # Quick Start
//!
//! ```bash
//! # Start a dev store server
//! kgcheck serve --address 7411
//!
//! # Run four concurrent sessions against it (new terminal)
//! kgcheck run --host 127.0.0.1:7411 --clients 4 --ops 1000
//!
//! # Or run entirely in memory
//! kgcheck run --memory --ops 100 --update-percentage 50
//! ```
//!
//! The exit status of `run` is the number of violations found (capped at
//! 254); 255 means the run itself could not be completed.

mod commands;
mod style;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kgcheck::HARNESS_ERROR_EXIT;
use tracing_subscriber::EnvFilter;

/// kgcheck - session consistency checks for replicated key-value stores.
#[derive(Parser)]
#[command(name = "kgcheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding kgcheck.toml / kgcheck.local.toml.
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output (also honors NO_COLOR).
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Run the consistency verification loop.
    Run(commands::run::RunArgs),

    /// Start a development store server.
    Serve(commands::serve::ServeArgs),

    /// Check point-to-point replication between two store nodes.
    Smoke(commands::smoke::SmokeArgs),

    /// Configuration commands.
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration.
    Show {
        /// Output format (toml, json).
        #[arg(short, long, default_value = "toml")]
        format: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    style::set_no_color(cli.no_color || std::env::var_os("NO_COLOR").is_some());
    init_logging(cli.verbose);

    match dispatch(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            style::print_error(&format!("{e:#}"));
            ExitCode::from(HARNESS_ERROR_EXIT)
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(!style::no_color())
        .init();
}

fn dispatch(cli: Cli) -> Result<u8> {
    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(0)
        }
        Commands::Run(args) => commands::run::run(&cli.project, args),
        Commands::Serve(args) => commands::serve::run(&cli.project, &args),
        Commands::Smoke(args) => commands::smoke::run(&args),
        Commands::Config(ConfigCommands::Show { format }) => {
            commands::config::show(&cli.project, &format)?;
            Ok(0)
        }
    }
}
