//! TCP drain server.
//!
//! Accepts one connection at a time and reads from it until the peer goes
//! away, discarding everything it receives. Only then is the next
//! connection accepted. The loop has no exit: accept failures are logged
//! and retried, read failures end the current connection only.

use crate::config::Config;
use crate::throughput::ThroughputReport;
use crate::transport::{self, Clock, StreamTransport, TransportError, NO_TIMEOUT};
use bytes::BytesMut;
use std::fmt;
use std::net::SocketAddr;
use tracing::{debug, error, info, warn};

/// Where the server is in its accept/drain cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    Listening,
    /// Waiting for the next inbound connection.
    Accepting,
    /// Reading from the single accepted connection.
    Draining,
}

/// Server instance
pub struct Server<T, C> {
    transport: T,
    clock: C,
    config: Config,
    state: ServerState,
}

impl<T: StreamTransport, C: Clock> Server<T, C> {
    pub fn new(transport: T, clock: C, config: Config) -> Self {
        Server {
            transport,
            clock,
            config,
            state: ServerState::Idle,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Create the listen queue and serve connections forever.
    ///
    /// Returns only if the listen queue cannot be created.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        let local = self.local_addr()?;
        let depth = self.config.queue_depth;

        self.state = ServerState::Listening;
        let mut queue = match self.transport.listen(local, depth).await {
            Ok(queue) => queue,
            Err(e) => {
                error!(address = %local, error = %e, "Error creating listening queue");
                self.state = ServerState::Idle;
                return Err(ServerError::Listen(e));
            }
        };
        info!(address = %local, queue_depth = depth, "Listening");

        let mut buffer = BytesMut::zeroed(self.config.read_buffer_size);

        loop {
            self.serve_one(&mut queue, &mut buffer).await;
        }
    }

    /// Accept a single connection and drain it to completion.
    async fn serve_one(&mut self, queue: &mut T::Queue, buffer: &mut [u8]) {
        self.state = ServerState::Accepting;
        let mut conn = match self.transport.accept(queue, NO_TIMEOUT).await {
            Ok(conn) => conn,
            Err(e) => {
                error!(error = %e, "Error accepting new connection");
                return;
            }
        };

        self.state = ServerState::Draining;
        info!("Reading data");
        let started_us = self.clock.now_micros();
        let (received, reason) = self.drain(&mut conn, buffer).await;
        let report = ThroughputReport {
            bytes: received,
            elapsed_us: self.clock.now_micros().wrapping_sub(started_us),
        };

        self.transport.disconnect(conn).await;

        if reason.is_closed() {
            info!(
                bytes = report.bytes,
                elapsed_us = report.elapsed_us,
                mbps = %format_args!("{:.4}", report.mbps()),
                "Disconnected"
            );
        } else {
            warn!(
                bytes = report.bytes,
                elapsed_us = report.elapsed_us,
                mbps = %format_args!("{:.4}", report.mbps()),
                error = %reason,
                "Disconnected"
            );
        }
    }

    /// Read until the transport reports an error, returning the byte count
    /// and the error that ended the connection.
    async fn drain(&mut self, conn: &mut T::Conn, buffer: &mut [u8]) -> (u64, TransportError) {
        let mut received = 0u64;
        loop {
            match self.transport.read(conn, buffer, NO_TIMEOUT).await {
                Ok(n) => {
                    received += n as u64;
                }
                Err(e) => {
                    debug!(received, "Read loop finished");
                    return (received, e);
                }
            }
        }
    }

    fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        let ip = transport::parse_address(&self.config.listen_host).map_err(ServerError::Address)?;
        Ok(SocketAddr::new(ip, self.config.listen_port))
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

/// Server setup errors
#[derive(Debug)]
pub enum ServerError {
    Address(TransportError),
    Listen(TransportError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Address(e) => write!(f, "Invalid listen address: {e}"),
            ServerError::Listen(e) => write!(f, "Error creating listening queue: {e}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Address(e) | ServerError::Listen(e) => Some(e),
        }
    }
}
