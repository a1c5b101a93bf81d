//! Serve command - runs the development store server.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Args;
use kgcheck_server::{Server, ServerConfig};
use kgcheck_types::ConflictPolicy;
use tracing::info;

use crate::style::banner::print_banner;
use crate::style::{print_labeled, print_spacer, print_success};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind to (port only: 7411, or full: 127.0.0.1:7411).
    #[arg(short, long)]
    pub address: Option<String>,

    /// How writes that do not supersede every stored version are handled
    /// (reject, keep-siblings).
    #[arg(long)]
    pub conflict_policy: Option<ConflictPolicy>,

    /// Maximum number of concurrent connections.
    #[arg(long)]
    pub max_connections: Option<usize>,
}

pub fn run(project: &Path, args: &ServeArgs) -> Result<u8> {
    let config = super::load_config(project)?;

    let address = args
        .address
        .as_deref()
        .unwrap_or(&config.server.bind_address);
    let bind_addr = parse_address(address)?;
    let policy = args
        .conflict_policy
        .unwrap_or(config.server.conflict_policy);
    let max_connections = args
        .max_connections
        .unwrap_or(config.server.max_connections);

    let server_config = ServerConfig::new(bind_addr)
        .with_max_connections(max_connections)
        .with_conflict_policy(policy);
    let server = Server::bind_fresh(server_config).context("Failed to start server")?;

    print_banner();
    print_labeled("Listening on", &server.local_addr().to_string());
    print_labeled("Conflict policy", policy.name());
    print_labeled("Max connections", &max_connections.to_string());
    print_spacer();
    println!("Server is ready. Press Ctrl+C to stop.");

    let shutdown = server.shutdown_handle();
    ctrlc::set_handler(move || {
        info!("interrupt received, shutting down");
        shutdown.shutdown();
    })
    .context("Failed to install Ctrl+C handler")?;

    server.run().context("Server error during operation")?;

    print_spacer();
    print_success("Server stopped gracefully.");
    Ok(0)
}

/// Parses an address string into a `SocketAddr`.
///
/// Accepts:
/// - Port only: "7411" -> "127.0.0.1:7411"
/// - Full address: "127.0.0.1:7411"
/// - IPv6: `[::1]:7411`
fn parse_address(address: &str) -> Result<SocketAddr> {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(port) = address.parse::<u16>() {
        return Ok(SocketAddr::from(([127, 0, 0, 1], port)));
    }

    bail!(
        "Invalid address '{address}'. Use a port (e.g., '7411') or full address (e.g., '127.0.0.1:7411')"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(
            parse_address("7411").unwrap(),
            SocketAddr::from(([127, 0, 0, 1], 7411))
        );
        assert_eq!(
            parse_address("0.0.0.0:9000").unwrap(),
            SocketAddr::from(([0, 0, 0, 0], 9000))
        );
        assert!(parse_address("[::1]:7411").unwrap().is_ipv6());
        assert!(parse_address("not-an-address").is_err());
    }
}
