//! # kgcheck-server: development store server
//!
//! Serves an in-process [`MemoryStore`](kgcheck_store::MemoryStore) over the
//! binary wire protocol defined in `kgcheck-wire`, so verification clients
//! can be pointed at a real socket without a replicated store deployment.
//!
//! ## Architecture
//!
//! The server uses `mio` for non-blocking I/O with a poll-based event loop
//! on a single thread.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    kgcheck-server                       │
//! │  ┌─────────────┐   ┌─────────────┐   ┌───────────────┐  │
//! │  │  Listener   │ → │ Connections │ → │    Handler    │  │
//! │  │  (TCP)      │   │ (mio poll)  │   │ (→ session)   │  │
//! │  └─────────────┘   └─────────────┘   └───────────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use kgcheck_server::{Server, ServerConfig};
//! use kgcheck_store::MemoryStore;
//!
//! let server = Server::bind(ServerConfig::default(), MemoryStore::new())?;
//! let shutdown = server.shutdown_handle();
//! std::thread::spawn(move || server.run());
//! // ...
//! shutdown.shutdown();
//! ```

mod config;
mod connection;
mod error;
mod handler;
mod server;

pub use config::{DEFAULT_BIND_ADDR, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use server::{Server, ShutdownHandle};
