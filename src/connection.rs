//! Non-blocking client connection
//!
//! Wraps one mio `TcpStream` with an inbound line buffer and an outbound
//! byte buffer. mio readiness is edge-triggered, so `read` and `flush`
//! keep going until the socket reports `WouldBlock`.

use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;

use mio::net::TcpStream;
use mio::{Interest, Registry};
use tracing::{debug, trace, warn};

use crate::error::ConnectionError;
use crate::types::ConnectionId;

const READ_CHUNK: usize = 4096;

/// Which readiness events a socket is watched for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watch {
    /// The listening socket
    AcceptOnly,
    /// Established connection with nothing to send
    ReadOnly,
    /// Established connection with queued output
    ReadWrite,
}

impl Watch {
    pub fn interest(self) -> Interest {
        match self {
            Watch::AcceptOnly | Watch::ReadOnly => Interest::READABLE,
            Watch::ReadWrite => Interest::READABLE | Interest::WRITABLE,
        }
    }
}

/// Which handler a connection's records go to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the display name
    Handshake,
    /// Named user exchanging command envelopes
    Active,
}

/// Splits an inbound byte stream into newline-terminated records
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    /// Length of the unterminated tail of `buf`
    partial_len: usize,
    max_record_len: usize,
}

impl LineBuffer {
    pub fn new(max_record_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            partial_len: 0,
            max_record_len,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.partial_len = match bytes.iter().rposition(|&b| b == b'\n') {
            Some(pos) => bytes.len() - pos - 1,
            None => self.partial_len + bytes.len(),
        };
        self.buf.extend_from_slice(bytes);
    }

    /// True once the unterminated tail is longer than a record may be
    pub fn is_overflowing(&self) -> bool {
        self.partial_len > self.max_record_len
    }

    /// Pop the next complete record, without its line terminator
    ///
    /// Fails once an unterminated record grows past the limit.
    pub fn next_record(&mut self) -> Result<Option<String>, ConnectionError> {
        let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
            if self.is_overflowing() {
                return Err(ConnectionError::RecordTooLong {
                    limit: self.max_record_len,
                });
            }
            return Ok(None);
        };

        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }
}

/// One accepted client socket
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    stream: TcpStream,
    peer_addr: SocketAddr,
    phase: Phase,
    watch: Watch,
    inbound: LineBuffer,
    outbound: Vec<u8>,
}

impl Connection {
    /// Register a freshly accepted stream as `ReadOnly` in the handshake phase
    pub fn register(
        registry: &Registry,
        id: ConnectionId,
        mut stream: TcpStream,
        peer_addr: SocketAddr,
        max_record_len: usize,
    ) -> io::Result<Self> {
        let watch = Watch::ReadOnly;
        registry.register(&mut stream, id.token(), watch.interest())?;
        Ok(Self {
            id,
            stream,
            peer_addr,
            phase: Phase::Handshake,
            watch,
            inbound: LineBuffer::new(max_record_len),
            outbound: Vec::new(),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn watch(&self) -> Watch {
        self.watch
    }

    /// Re-arm the socket for a different set of readiness events
    pub fn set_watch(&mut self, registry: &Registry, watch: Watch) -> io::Result<()> {
        if self.watch != watch {
            registry.reregister(&mut self.stream, self.id.token(), watch.interest())?;
            trace!("Connection {} now watched {:?}", self.id, watch);
            self.watch = watch;
        }
        Ok(())
    }

    /// Read everything available into the inbound buffer
    ///
    /// Returns the number of bytes read. An orderly shutdown by the peer is
    /// `Closed`; bytes received before it stay buffered. Stops early with
    /// `RecordTooLong` as soon as an unterminated record passes the limit.
    pub fn read(&mut self) -> Result<usize, ConnectionError> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut total = 0;
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(ConnectionError::Closed),
                Ok(n) => {
                    self.inbound.extend(&chunk[..n]);
                    total += n;
                    if self.inbound.is_overflowing() {
                        return Err(ConnectionError::RecordTooLong {
                            limit: self.inbound.max_record_len,
                        });
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        debug!("Read {} bytes from {}", total, self.id);
        Ok(total)
    }

    pub fn next_record(&mut self) -> Result<Option<String>, ConnectionError> {
        self.inbound.next_record()
    }

    /// Append bytes to the outbound buffer without touching the socket
    pub fn queue(&mut self, bytes: &[u8]) {
        self.outbound.extend_from_slice(bytes);
    }

    /// Queue bytes and push out as much as the socket accepts
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        self.queue(bytes);
        self.flush().map(|_| ())
    }

    /// Write buffered bytes until drained or the socket would block
    ///
    /// Returns true once the outbound buffer is empty.
    pub fn flush(&mut self) -> Result<bool, ConnectionError> {
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => return Err(io::Error::from(ErrorKind::WriteZero).into()),
                Ok(n) => {
                    self.outbound.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }

    pub fn has_pending_output(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Deregister from the poll and close the socket
    pub fn close(mut self, registry: &Registry) {
        if let Err(e) = registry.deregister(&mut self.stream) {
            warn!("Failed to deregister {} ({}): {}", self.id, self.peer_addr, e);
        }
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        debug!("Closed connection {} ({})", self.id, self.peer_addr);
    }
}
