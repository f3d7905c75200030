//! Transport provider abstraction.
//!
//! The benchmark roles never touch sockets directly. They drive a provider
//! through one of two traits:
//! - `StreamTransport`: listen queue, accept, read, write, connect, disconnect
//! - `DatagramTransport`: bind, send_to, recv_from, close
//!
//! Every operation behaves like a blocking call: the role awaits it to
//! completion before issuing the next one, so each role has exactly one
//! operation in flight. Timeouts are `Option<Duration>`, with `NO_TIMEOUT`
//! meaning "wait forever".

pub mod net;

#[cfg(test)]
pub(crate) mod mock;

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

pub use net::{MonotonicClock, TokioTransport};

/// Block until the operation completes or fails.
pub const NO_TIMEOUT: Option<Duration> = None;

/// Errors reported by a transport provider.
#[derive(Debug)]
pub enum TransportError {
    /// The peer closed the connection.
    Closed,
    /// The operation did not complete within the requested timeout.
    TimedOut,
    /// An address string could not be parsed.
    AddrParse(String),
    /// Any other I/O failure.
    Io(io::Error),
}

impl TransportError {
    /// Whether this error is the peer's orderly close rather than a failure.
    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::Closed)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Closed => write!(f, "connection closed by peer"),
            TransportError::TimedOut => write!(f, "operation timed out"),
            TransportError::AddrParse(s) => write!(f, "invalid address '{s}'"),
            TransportError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        TransportError::Io(e)
    }
}

/// Parse a textual IPv4 or IPv6 address.
pub fn parse_address(s: &str) -> Result<IpAddr, TransportError> {
    s.trim()
        .parse()
        .map_err(|_| TransportError::AddrParse(s.to_string()))
}

/// Connection-oriented transport (TCP-like).
#[allow(async_fn_in_trait)]
pub trait StreamTransport {
    /// Listen queue holding inbound connections until accepted.
    type Queue;
    /// One established connection.
    type Conn;

    /// Create a listen queue bound to `local` holding at most `depth`
    /// pending connections.
    async fn listen(&mut self, local: SocketAddr, depth: u32)
        -> Result<Self::Queue, TransportError>;

    /// Wait for the next inbound connection.
    async fn accept(
        &mut self,
        queue: &mut Self::Queue,
        timeout: Option<Duration>,
    ) -> Result<Self::Conn, TransportError>;

    /// Read into `buf`. A peer close is reported as `TransportError::Closed`.
    async fn read(
        &mut self,
        conn: &mut Self::Conn,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError>;

    /// Write from `buf`, returning the number of bytes the transport took.
    async fn write(&mut self, conn: &mut Self::Conn, buf: &[u8]) -> Result<usize, TransportError>;

    /// Open a connection to `remote` from an ephemeral local port.
    async fn connect(&mut self, remote: SocketAddr) -> Result<Self::Conn, TransportError>;

    /// Release a connection. Consumes the handle so it cannot be used again.
    async fn disconnect(&mut self, conn: Self::Conn);
}

/// Connectionless transport (UDP-like).
#[allow(async_fn_in_trait)]
pub trait DatagramTransport {
    type Socket;

    async fn bind(&mut self, local: SocketAddr) -> Result<Self::Socket, TransportError>;

    async fn send_to(
        &mut self,
        sock: &mut Self::Socket,
        buf: &[u8],
        remote: SocketAddr,
    ) -> Result<usize, TransportError>;

    async fn recv_from(
        &mut self,
        sock: &mut Self::Socket,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<(usize, SocketAddr), TransportError>;

    async fn close(&mut self, sock: Self::Socket);
}

/// Monotonic microsecond clock.
pub trait Clock {
    fn now_micros(&self) -> u64;
}
