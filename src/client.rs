//! TCP streaming client.
//!
//! Connects to the server, sends a short greeting, then writes the filler
//! buffer back to back for as long as the transport accepts it, reporting
//! the send rate once per interval.
//!
//! The connection is disconnected exactly once on every path after a
//! successful connect. A failed greeting ends the session before any
//! filler data is sent.

use crate::config::Config;
use crate::throughput::ThroughputMeter;
use crate::transport::{self, Clock, StreamTransport, TransportError};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::net::SocketAddr;
use tracing::{debug, error, info};

/// Client lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Connecting,
    Connected,
    Streaming,
    Terminated,
}

/// Client instance
pub struct Client<T, C> {
    transport: T,
    clock: C,
    config: Config,
    state: ClientState,
}

impl<T: StreamTransport, C: Clock> Client<T, C> {
    pub fn new(transport: T, clock: C, config: Config) -> Self {
        Client {
            transport,
            clock,
            config,
            state: ClientState::Idle,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Run one session: connect, greet, stream.
    ///
    /// On success returns the byte count of the last write. Streaming only
    /// ends successfully when a byte limit is configured.
    pub async fn run(&mut self) -> Result<usize, ClientError> {
        let remote = match self.remote_addr() {
            Ok(remote) => remote,
            Err(e) => {
                self.state = ClientState::Terminated;
                return Err(e);
            }
        };

        self.state = ClientState::Connecting;
        let mut conn = match self.transport.connect(remote).await {
            Ok(conn) => conn,
            Err(e) => {
                error!(remote = %remote, error = %e, "Error connecting");
                self.state = ClientState::Terminated;
                return Err(ClientError::Connect(e));
            }
        };
        self.state = ClientState::Connected;
        info!(remote = %remote, "Connected");

        let result = self.session(&mut conn).await;

        self.transport.disconnect(conn).await;
        self.state = ClientState::Terminated;
        debug!("Disconnected");

        result
    }

    async fn session(&mut self, conn: &mut T::Conn) -> Result<usize, ClientError> {
        let greeting = greeting_bytes(&self.config.greeting);
        info!(greeting = %self.config.greeting, "Sending greeting");
        if let Err(e) = self.transport.write(conn, &greeting).await {
            error!(error = %e, "Errored on greeting write");
            return Err(ClientError::Handshake(e));
        }

        self.state = ClientState::Streaming;
        self.stream(conn).await
    }

    async fn stream(&mut self, conn: &mut T::Conn) -> Result<usize, ClientError> {
        let filler = filler_buffer(self.config.filler_byte, self.config.write_buffer_size);
        let mut meter = ThroughputMeter::new(self.config.report_interval_us, self.clock.now_micros());
        let mut total: u64 = 0;

        loop {
            if let Some(report) = meter.poll(self.clock.now_micros()) {
                info!(
                    bytes = report.bytes,
                    elapsed_us = report.elapsed_us,
                    mbps = %format_args!("{:.4}", report.mbps()),
                    "send speed"
                );
            }

            let written = match self.transport.write(conn, &filler).await {
                Ok(n) => n,
                Err(e) => {
                    error!(
                        total,
                        unreported = meter.pending_bytes(),
                        error = %e,
                        "Errored on write"
                    );
                    return Err(ClientError::Write(e));
                }
            };
            meter.record(written);
            total += written as u64;

            if let Some(limit) = self.config.max_bytes {
                if total >= limit {
                    info!(total, "Byte limit reached");
                    return Ok(written);
                }
            }
        }
    }

    fn remote_addr(&self) -> Result<SocketAddr, ClientError> {
        let ip = transport::parse_address(&self.config.remote_host).map_err(ClientError::Address)?;
        Ok(SocketAddr::new(ip, self.config.remote_port))
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

/// The greeting as sent on the wire, NUL-terminated.
fn greeting_bytes(greeting: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(greeting.len() + 1);
    buf.put_slice(greeting.as_bytes());
    buf.put_u8(0);
    buf.freeze()
}

/// An immutable buffer of `len` copies of `byte`.
fn filler_buffer(byte: u8, len: usize) -> Bytes {
    Bytes::from(vec![byte; len])
}

/// Client session errors, by the phase that failed.
#[derive(Debug)]
pub enum ClientError {
    Address(TransportError),
    Connect(TransportError),
    Handshake(TransportError),
    Write(TransportError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Address(e) => write!(f, "Invalid remote address: {e}"),
            ClientError::Connect(e) => write!(f, "Error connecting: {e}"),
            ClientError::Handshake(e) => write!(f, "Error sending greeting: {e}"),
            ClientError::Write(e) => write!(f, "Errored on write: {e}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Address(e)
            | ClientError::Connect(e)
            | ClientError::Handshake(e)
            | ClientError::Write(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{io_error, Call, MockStream, StepClock};
    use std::io::ErrorKind;

    fn client(mock: MockStream) -> Client<MockStream, StepClock> {
        Client::new(mock, StepClock::new(500_000), Config::default())
    }

    #[test]
    fn test_greeting_is_nul_terminated() {
        assert_eq!(&greeting_bytes("Hello!")[..], b"Hello!\0");
        assert_eq!(greeting_bytes("Hello!").len(), 7);
    }

    #[tokio::test]
    async fn test_connects_to_configured_remote() {
        let mut mock = MockStream::new();
        mock.writes.push_back(Ok(7));
        mock.writes.push_back(Err(io_error(ErrorKind::BrokenPipe)));
        let mut client = client(mock);

        let _ = client.run().await;

        let expected: SocketAddr = "192.168.1.102:12344".parse().unwrap();
        assert_eq!(client.transport().calls[0], Call::Connect(expected));
        assert_eq!(client.transport().payloads[0], b"Hello!\0");
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let mut mock = MockStream::new();
        mock.connect_error = Some(io_error(ErrorKind::ConnectionRefused));
        let mut client = client(mock);

        assert!(matches!(client.run().await, Err(ClientError::Connect(_))));
        assert_eq!(client.state(), ClientState::Terminated);

        let mock = client.transport();
        assert_eq!(mock.calls.len(), 1);
        assert_eq!(mock.write_calls(), 0);
        assert_eq!(mock.disconnects(), 0);
    }

    #[tokio::test]
    async fn test_bad_remote_host() {
        let config = Config {
            remote_host: "192.168.1".to_string(),
            ..Config::default()
        };
        let mut client = Client::new(MockStream::new(), StepClock::new(1), config);

        assert!(matches!(client.run().await, Err(ClientError::Address(_))));
        assert!(client.transport().calls.is_empty());
    }

    #[tokio::test]
    async fn test_greeting_failure_aborts_session() {
        let mut mock = MockStream::new();
        mock.writes.push_back(Err(io_error(ErrorKind::BrokenPipe)));
        let mut client = client(mock);

        assert!(matches!(client.run().await, Err(ClientError::Handshake(_))));
        assert_eq!(client.state(), ClientState::Terminated);

        let mock = client.transport();
        assert_eq!(mock.write_calls(), 1);
        assert_eq!(mock.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_mid_stream() {
        let mut mock = MockStream::new();
        mock.writes.push_back(Ok(7));
        for _ in 0..4 {
            mock.writes.push_back(Ok(2048));
        }
        mock.writes.push_back(Err(io_error(ErrorKind::ConnectionReset)));
        let mut client = client(mock);

        assert!(matches!(client.run().await, Err(ClientError::Write(_))));
        assert_eq!(client.state(), ClientState::Terminated);

        let mock = client.transport();
        // greeting plus five filler writes, the last one failing
        assert_eq!(mock.write_calls(), 6);
        assert_eq!(mock.count(|c| *c == Call::Write(1, 2048)), 5);
        assert_eq!(mock.disconnects(), 1);
        assert_eq!(mock.calls.last(), Some(&Call::Disconnect(1)));
        assert_eq!(mock.live(), 0);
    }

    #[tokio::test]
    async fn test_filler_content_is_constant() {
        let config = Config {
            max_bytes: Some(64 * 2048),
            ..Config::default()
        };
        let mut client = Client::new(MockStream::new(), StepClock::new(700_000), config);

        assert_eq!(client.run().await.unwrap(), 2048);

        let payloads = &client.transport().payloads;
        assert_eq!(payloads.len(), 65);
        for payload in &payloads[1..] {
            assert_eq!(payload.len(), 2048);
            assert!(payload.iter().all(|&b| b == 97));
        }
    }

    #[tokio::test]
    async fn test_byte_limit_ends_stream() {
        let config = Config {
            max_bytes: Some(5000),
            write_buffer_size: 1000,
            filler_byte: b'z',
            ..Config::default()
        };
        let mut mock = MockStream::new();
        mock.writes.push_back(Ok(7));
        mock.writes.push_back(Ok(1000));
        mock.writes.push_back(Ok(600)); // short write still counts what was taken
        let mut client = Client::new(mock, StepClock::new(1), config);

        assert_eq!(client.run().await.unwrap(), 1000);

        let mock = client.transport();
        // 1000 + 600 + 1000 * 4 = 5600 >= 5000 after six filler writes
        assert_eq!(mock.write_calls(), 7);
        assert_eq!(mock.disconnects(), 1);
        assert!(mock.payloads[1].iter().all(|&b| b == b'z'));
    }
}
