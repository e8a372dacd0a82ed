//! ChatServer event loop
//!
//! One thread owns the mio `Poll`, the listening socket, every client
//! connection and the user registry. Readiness events are routed to the
//! accept, read and write handlers; because nothing runs concurrently the
//! registry needs no locking.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use mio::net::TcpListener;
use mio::{Events, Poll, Token, Waker};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::connection::{Connection, Phase, Watch};
use crate::dispatcher::{self, Outcome};
use crate::error::{ConnectionError, ServerError};
use crate::protocol;
use crate::registry::Registry;
use crate::types::ConnectionId;

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const FIRST_CONNECTION_ID: usize = 2;

const HANDSHAKE_OK: &[u8] = b"OK\n";
const HANDSHAKE_EXIST: &[u8] = b"EXIST\n";
const PARSE_FAILURE_NOTICE: &str = "An error has occurred while parsing the command";

/// Stops a running [`ChatServer`] from another thread
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    /// Wake the event loop and make `run` return
    pub fn shutdown(&self) -> std::io::Result<()> {
        self.waker.wake()
    }
}

/// The chat server
///
/// Owns all state; drive it with [`ChatServer::run`].
pub struct ChatServer {
    poll: Poll,
    listener: TcpListener,
    local_addr: SocketAddr,
    waker: Arc<Waker>,
    /// Accepted sockets, named or still in the handshake
    connections: HashMap<ConnectionId, Connection>,
    registry: Registry,
    next_id: usize,
    max_record_len: usize,
    events_capacity: usize,
}

impl ChatServer {
    /// Bind the listening socket and set up the poll
    pub fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        let addr = config.addr()?;
        let mut listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Watch::AcceptOnly.interest())?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);

        info!("Chat server listening on {}", local_addr);

        Ok(Self {
            poll,
            listener,
            local_addr,
            waker,
            connections: HashMap::new(),
            registry: Registry::new(),
            next_id: FIRST_CONNECTION_ID,
            max_record_len: config.max_record_len,
            events_capacity: config.events_capacity.max(1),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            waker: Arc::clone(&self.waker),
        }
    }

    /// Run the event loop
    ///
    /// Returns only after a [`ShutdownHandle::shutdown`] or if the poll
    /// itself fails. Per-connection failures never end the loop.
    pub fn run(mut self) -> Result<(), ServerError> {
        info!("ChatServer started");
        let mut events = Events::with_capacity(self.events_capacity);

        loop {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                error!("Poll failed: {}", e);
                self.close_all();
                return Err(e.into());
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept(),
                    WAKER => {
                        info!("ChatServer shutting down");
                        self.close_all();
                        return Ok(());
                    }
                    token => {
                        let id = ConnectionId::from(token);
                        if event.is_readable() || event.is_read_closed() || event.is_error() {
                            self.handle_readable(id);
                        }
                        if event.is_writable() {
                            self.handle_writable(id);
                        }
                        self.rearm_pending();
                    }
                }
            }
        }
    }

    /// Accept every pending connection on the listener
    fn accept(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer_addr)) => {
                    let id = ConnectionId(self.next_id);
                    self.next_id += 1;
                    match Connection::register(
                        self.poll.registry(),
                        id,
                        stream,
                        peer_addr,
                        self.max_record_len,
                    ) {
                        Ok(conn) => {
                            info!("New connection {} from {}", id, peer_addr);
                            self.connections.insert(id, conn);
                        }
                        Err(e) => warn!("Failed to register connection from {}: {}", peer_addr, e),
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset
                    ) =>
                {
                    warn!("Transient accept error: {}", e);
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    break;
                }
            }
        }
        debug!(
            "Total connections: {}, Total users: {}",
            self.connections.len(),
            self.registry.len()
        );
    }

    /// Read from a connection and handle every complete record
    ///
    /// Records that arrived before the peer closed are still handled.
    fn handle_readable(&mut self, id: ConnectionId) {
        let Some(conn) = self.connections.get_mut(&id) else {
            return;
        };
        let status = conn.read();

        loop {
            // A record handler may have closed the connection.
            let Some(conn) = self.connections.get_mut(&id) else {
                return;
            };
            let record = match conn.next_record() {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => {
                    self.teardown(id, e);
                    return;
                }
            };
            match conn.phase() {
                Phase::Handshake => self.handle_handshake(id, record),
                Phase::Active => self.handle_record(id, record),
            }
        }

        if let Err(e) = status {
            self.teardown(id, e);
        }
    }

    /// First record of a connection: the requested display name
    fn handle_handshake(&mut self, id: ConnectionId, record: String) {
        let name = record.trim().to_string();
        if let Err(reason) = self.registry.check_available(&name) {
            info!("Rejecting name {:?} on {}: {}", name, id, reason);
            if let Some(mut conn) = self.connections.remove(&id) {
                if let Err(e) = conn.write(HANDSHAKE_EXIST) {
                    debug!("Could not send EXIST to {}: {}", id, e);
                }
                conn.close(self.poll.registry());
            }
            return;
        }

        let Some(conn) = self.connections.get_mut(&id) else {
            return;
        };
        conn.set_phase(Phase::Active);
        let peer_addr = conn.peer_addr();
        if let Err(e) = conn.write(HANDSHAKE_OK) {
            self.teardown(id, e);
            return;
        }

        self.registry.add_connection(id, name.clone());
        info!("Connection {} ({}) joined as '{}'", id, peer_addr, name);
        dispatcher::announce(&mut self.registry, format!("{} has joined the chat!", name));
    }

    /// Steady-state record: decode and dispatch
    fn handle_record(&mut self, id: ConnectionId, record: String) {
        let Some(user) = self.registry.name_for_connection(id).map(str::to_string) else {
            return;
        };
        if record.trim().is_empty() {
            return;
        }
        debug!("Received {} from '{}'", record, user);

        match protocol::decode(&record, &user) {
            Ok(cmd) => {
                if let Outcome::Disconnect(conn) = dispatcher::dispatch(&mut self.registry, cmd) {
                    self.close_connection(conn);
                }
            }
            Err(e) => {
                warn!("Invalid command from '{}': {}", user, e);
                dispatcher::reply(&mut self.registry, &user, PARSE_FAILURE_NOTICE);
            }
        }
    }

    /// Drain the user's queue into the socket
    fn handle_writable(&mut self, id: ConnectionId) {
        let Some(conn) = self.connections.get_mut(&id) else {
            return;
        };
        if conn.phase() != Phase::Active {
            return;
        }

        match drain_queue(conn, &mut self.registry) {
            Ok(true) => self.set_watch(id, Watch::ReadOnly),
            Ok(false) => {}
            Err(e) => self.teardown(id, e),
        }
    }

    /// Watch every user with undelivered output for writability
    fn rearm_pending(&mut self) {
        let mut failed = Vec::new();
        for id in self.registry.connections() {
            let Some(conn) = self.connections.get_mut(&id) else {
                continue;
            };
            if conn.watch() == Watch::ReadWrite {
                continue;
            }
            if conn.has_pending_output() || self.registry.has_pending(id) {
                if let Err(e) = conn.set_watch(self.poll.registry(), Watch::ReadWrite) {
                    failed.push((id, e));
                }
            }
        }
        for (id, e) in failed {
            self.teardown(id, e.into());
        }
    }

    fn set_watch(&mut self, id: ConnectionId, watch: Watch) {
        let Some(conn) = self.connections.get_mut(&id) else {
            return;
        };
        if let Err(e) = conn.set_watch(self.poll.registry(), watch) {
            self.teardown(id, e.into());
        }
    }

    /// Drop a connection after a transport failure
    fn teardown(&mut self, id: ConnectionId, err: ConnectionError) {
        match err {
            ConnectionError::Closed => info!("Connection {} closed by peer", id),
            e => warn!("Connection {} failed: {}", id, e),
        }
        self.close_connection(id);
    }

    /// Unregister and close a connection and forget its user
    fn close_connection(&mut self, id: ConnectionId) {
        if let Some(conn) = self.connections.remove(&id) {
            conn.close(self.poll.registry());
        }
        if let Some(user) = self.registry.remove_connection(id) {
            info!("User '{}' disconnected", user.name);
        }
        debug!(
            "Total connections: {}, Total users: {}",
            self.connections.len(),
            self.registry.len()
        );
    }

    fn close_all(&mut self) {
        let ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        for id in ids {
            self.close_connection(id);
        }
        if let Err(e) = self.poll.registry().deregister(&mut self.listener) {
            warn!("Failed to deregister listener: {}", e);
        }
    }
}

/// Write queued messages until the queue is empty or the socket would block
///
/// Returns true when everything was written.
fn drain_queue(conn: &mut Connection, registry: &mut Registry) -> Result<bool, ConnectionError> {
    loop {
        if !conn.flush()? {
            return Ok(false);
        }
        let Some(msg) = registry.dequeue_next(conn.id()) else {
            return Ok(true);
        };
        debug!("Writing {} to {}", msg, conn.id());
        conn.queue(msg.to_line().as_bytes());
    }
}
