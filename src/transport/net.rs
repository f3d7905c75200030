//! Tokio-backed transport provider.
//!
//! Listeners are built through socket2 so the kernel backlog matches the
//! requested queue depth, then handed to tokio.

use crate::transport::{Clock, DatagramTransport, StreamTransport, TransportError};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::Instant;
use tracing::{debug, trace};

/// Transport provider over tokio sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTransport;

impl StreamTransport for TokioTransport {
    type Queue = TcpListener;
    type Conn = TcpStream;

    async fn listen(&mut self, local: SocketAddr, depth: u32) -> Result<TcpListener, TransportError> {
        let listener = create_listener(local, depth)?;
        Ok(TcpListener::from_std(listener)?)
    }

    async fn accept(
        &mut self,
        queue: &mut TcpListener,
        timeout: Option<Duration>,
    ) -> Result<TcpStream, TransportError> {
        let (stream, peer) = with_timeout(timeout, queue.accept()).await??;
        debug!(peer = %peer, "Accepted connection");
        Ok(stream)
    }

    async fn read(
        &mut self,
        conn: &mut TcpStream,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError> {
        match with_timeout(timeout, conn.read(buf)).await?? {
            0 if !buf.is_empty() => Err(TransportError::Closed),
            n => Ok(n),
        }
    }

    async fn write(&mut self, conn: &mut TcpStream, buf: &[u8]) -> Result<usize, TransportError> {
        Ok(conn.write(buf).await?)
    }

    async fn connect(&mut self, remote: SocketAddr) -> Result<TcpStream, TransportError> {
        let stream = TcpStream::connect(remote).await?;
        debug!(peer = %remote, local = ?stream.local_addr().ok(), "Connected");
        Ok(stream)
    }

    async fn disconnect(&mut self, mut conn: TcpStream) {
        if let Err(e) = conn.shutdown().await {
            trace!(error = %e, "Shutdown on disconnect failed");
        }
    }
}

impl DatagramTransport for TokioTransport {
    type Socket = UdpSocket;

    async fn bind(&mut self, local: SocketAddr) -> Result<UdpSocket, TransportError> {
        Ok(UdpSocket::bind(local).await?)
    }

    async fn send_to(
        &mut self,
        sock: &mut UdpSocket,
        buf: &[u8],
        remote: SocketAddr,
    ) -> Result<usize, TransportError> {
        Ok(sock.send_to(buf, remote).await?)
    }

    async fn recv_from(
        &mut self,
        sock: &mut UdpSocket,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<(usize, SocketAddr), TransportError> {
        Ok(with_timeout(timeout, sock.recv_from(buf)).await??)
    }

    async fn close(&mut self, sock: UdpSocket) {
        drop(sock);
    }
}

/// Clock counting microseconds since its creation.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

async fn with_timeout<F: Future>(
    timeout: Option<Duration>,
    fut: F,
) -> Result<F::Output, TransportError> {
    match timeout {
        None => Ok(fut.await),
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| TransportError::TimedOut),
    }
}

fn create_listener(addr: SocketAddr, depth: u32) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(depth.min(i32::MAX as u32) as i32)?;

    Ok(socket.into())
}
