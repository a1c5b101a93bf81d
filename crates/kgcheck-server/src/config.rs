//! Server configuration.

use std::net::SocketAddr;

use kgcheck_types::ConflictPolicy;

/// Default address of the dev store server.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:7411";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum number of concurrent connections.
    pub max_connections: usize,
    /// Read and write buffer size per connection.
    pub buffer_size: usize,
    /// How the served store handles writes that do not supersede every
    /// stored version.
    pub conflict_policy: ConflictPolicy,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: impl Into<SocketAddr>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            ..Self::default()
        }
    }

    /// Sets the maximum number of concurrent connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the per-connection buffer size.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 7411)),
            max_connections: 256,
            buffer_size: 64 * 1024, // 64 KiB
            conflict_policy: ConflictPolicy::default(),
        }
    }
}
