//! The poll-based server loop.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use kgcheck_store::MemoryStore;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::{ServerError, ServerResult};
use crate::handler;

const LISTENER_TOKEN: Token = Token(0);
const WAKER_TOKEN: Token = Token(1);
const FIRST_CONNECTION_TOKEN: usize = 2;

const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Stops a running [`Server`] from another thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    /// Requests shutdown and wakes the event loop.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "failed to wake server loop");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Serves a [`MemoryStore`] over the wire protocol.
///
/// Each accepted connection gets its own store session, so the server
/// behaves like one store node with many independent clients.
pub struct Server {
    config: ServerConfig,
    store: MemoryStore,
    poll: Poll,
    listener: TcpListener,
    local_addr: SocketAddr,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    shutdown: ShutdownHandle,
}

impl Server {
    /// Binds the listener and serves a fresh store using the configured
    /// conflict policy.
    pub fn bind_fresh(config: ServerConfig) -> ServerResult<Self> {
        let store = MemoryStore::with_policy(config.conflict_policy);
        Self::bind(config, store)
    }

    /// Binds the listener. The server does not accept connections until
    /// [`Server::run`] is called.
    pub fn bind(config: ServerConfig, store: MemoryStore) -> ServerResult<Self> {
        let poll = Poll::new()?;
        let mut listener =
            TcpListener::bind(config.bind_addr).map_err(|source| ServerError::BindFailed {
                addr: config.bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
        let shutdown = ShutdownHandle {
            flag: Arc::new(AtomicBool::new(false)),
            waker,
        };

        info!(address = %local_addr, policy = %store.policy(), "store server listening");
        Ok(Self {
            config,
            store,
            poll,
            listener,
            local_addr,
            connections: HashMap::new(),
            next_token: FIRST_CONNECTION_TOKEN,
            shutdown,
        })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Returns a handle to the served store.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Runs the event loop until shutdown is requested.
    pub fn run(mut self) -> ServerResult<()> {
        let mut events = Events::with_capacity(256);

        while !self.shutdown.is_shutdown() {
            match self.poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            for event in &events {
                match event.token() {
                    LISTENER_TOKEN => self.accept()?,
                    WAKER_TOKEN => {}
                    token => self.service(token, event.is_readable(), event.is_writable()),
                }
            }
        }

        info!(
            connections = self.connections.len(),
            "store server shutting down"
        );
        Ok(())
    }

    fn accept(&mut self) -> ServerResult<()> {
        loop {
            match self.listener.accept() {
                Ok((mut stream, addr)) => {
                    if self.connections.len() >= self.config.max_connections {
                        warn!(%addr, max = self.config.max_connections, "rejecting connection");
                        drop(stream);
                        continue;
                    }

                    let token = Token(self.next_token);
                    self.next_token += 1;
                    self.poll
                        .registry()
                        .register(&mut stream, token, Interest::READABLE)?;

                    let session = self.store.session(format!("conn-{}", token.0));
                    debug!(%addr, token = token.0, writer = session.writer(), "accepted connection");
                    self.connections.insert(
                        token,
                        Connection::new(token, stream, session, self.config.buffer_size),
                    );
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => {
                    error!(error = %e, "accept failed");
                    return Ok(());
                }
            }
        }
    }

    fn service(&mut self, token: Token, readable: bool, writable: bool) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        if let Err(e) = Self::process(conn, readable, writable) {
            debug!(token = conn.token.0, error = %e, "connection error");
            conn.closing = true;
            conn.write_buf.clear();
        }

        if !(conn.closing && conn.write_buf.is_empty()) {
            let interest = conn.interest();
            if let Err(e) = self
                .poll
                .registry()
                .reregister(&mut conn.stream, token, interest)
            {
                warn!(token = token.0, error = %e, "reregister failed");
            }
            return;
        }

        if let Some(mut conn) = self.connections.remove(&token) {
            let _ = self.poll.registry().deregister(&mut conn.stream);
            debug!(token = token.0, "connection closed");
        }
    }

    fn process(conn: &mut Connection, readable: bool, writable: bool) -> ServerResult<()> {
        if readable && !conn.read()? {
            conn.closing = true;
        }

        while conn.has_pending_data() {
            let Some(request) = conn.try_decode_request()? else {
                break;
            };
            let response = handler::handle(&mut conn.session, request);
            conn.queue_response(&response)?;
        }

        if writable || !conn.write_buf.is_empty() {
            conn.write()?;
        }
        Ok(())
    }
}
