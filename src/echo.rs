//! UDP echo roles.
//!
//! - Server: bind the listen endpoint and send every datagram back to
//!   whoever sent it. Receive errors are skipped, send errors are logged.
//! - Client: send the NUL-terminated greeting once per interval and wait a
//!   bounded time for the echo. A failed send ends the client.

use crate::config::Config;
use crate::transport::{parse_address, DatagramTransport, TransportError, NO_TIMEOUT};
use bytes::BytesMut;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Echo datagrams forever. Returns only if the socket cannot be bound.
pub async fn run_server<T: DatagramTransport>(
    transport: &mut T,
    config: &Config,
) -> Result<(), EchoError> {
    let ip = parse_address(&config.listen_host).map_err(EchoError::Address)?;
    let local = SocketAddr::new(ip, config.listen_port);

    let mut sock = match transport.bind(local).await {
        Ok(sock) => sock,
        Err(e) => {
            error!(address = %local, error = %e, "Error creating UDP sock");
            return Err(EchoError::Bind(e));
        }
    };
    info!(address = %local, "UDP echo listening");

    let mut buf = BytesMut::zeroed(config.udp_buffer_size);
    loop {
        let (n, remote) = match transport.recv_from(&mut sock, &mut buf, NO_TIMEOUT).await {
            Ok(received) => received,
            Err(e) => {
                debug!(error = %e, "Receive failed");
                continue;
            }
        };
        debug!(peer = %remote, len = n, "Received a message");

        if let Err(e) = transport.send_to(&mut sock, &buf[..n], remote).await {
            warn!(peer = %remote, error = %e, "Error sending reply");
        }
    }
}

/// Send the greeting and wait for its echo, round after round.
///
/// Runs forever unless `rounds` is configured, in which case the number of
/// echoes received is returned.
pub async fn run_client<T: DatagramTransport>(
    transport: &mut T,
    config: &Config,
) -> Result<u64, EchoError> {
    let ip = parse_address(&config.remote_host).map_err(EchoError::Address)?;
    let remote = SocketAddr::new(ip, config.remote_port);
    let local = SocketAddr::new(unspecified_like(ip), 0);

    let mut sock = match transport.bind(local).await {
        Ok(sock) => sock,
        Err(e) => {
            error!(address = %local, error = %e, "Error creating UDP sock");
            return Err(EchoError::Bind(e));
        }
    };

    let mut message = BytesMut::with_capacity(config.greeting.len() + 1);
    message.extend_from_slice(config.greeting.as_bytes());
    message.extend_from_slice(&[0]);

    let timeout = Some(Duration::from_millis(config.udp_timeout_ms));
    let interval = Duration::from_millis(config.udp_interval_ms);
    let mut buf = BytesMut::zeroed(config.udp_buffer_size);
    let mut round = 0u64;
    let mut echoes = 0u64;

    while config.rounds.map_or(true, |limit| round < limit) {
        round += 1;

        if let Err(e) = transport.send_to(&mut sock, &message, remote).await {
            error!(peer = %remote, error = %e, "Error sending message");
            transport.close(sock).await;
            return Err(EchoError::Send(e));
        }

        match transport.recv_from(&mut sock, &mut buf, timeout).await {
            Ok((n, from)) => {
                echoes += 1;
                info!(
                    peer = %from,
                    message = %String::from_utf8_lossy(&buf[..n]),
                    "Received message"
                );
            }
            Err(TransportError::TimedOut) => warn!(round, "Timed out"),
            Err(e) => warn!(round, error = %e, "Error receiving message"),
        }

        tokio::time::sleep(interval).await;
    }

    transport.close(sock).await;
    Ok(echoes)
}

fn unspecified_like(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

/// UDP echo errors
#[derive(Debug)]
pub enum EchoError {
    Address(TransportError),
    Bind(TransportError),
    Send(TransportError),
}

impl fmt::Display for EchoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EchoError::Address(e) => write!(f, "Invalid address: {e}"),
            EchoError::Bind(e) => write!(f, "Error creating UDP sock: {e}"),
            EchoError::Send(e) => write!(f, "Error sending message: {e}"),
        }
    }
}

impl std::error::Error for EchoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EchoError::Address(e) | EchoError::Bind(e) | EchoError::Send(e) => Some(e),
        }
    }
}
