//! Scripted transport providers for unit tests.
//!
//! Each provider pops results from per-operation scripts and records every
//! call it receives. Exhausted scripts fall back to a fixed behavior noted
//! on each field.

use crate::transport::{Clock, DatagramTransport, StreamTransport, TransportError};
use std::cell::Cell;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

/// One recorded call on `MockStream`. Connection ids are assigned in
/// creation order starting at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Listen(SocketAddr, u32),
    Accept,
    Read(u64),
    Write(u64, usize),
    Connect(SocketAddr),
    Disconnect(u64),
}

#[derive(Debug)]
pub(crate) struct MockConn {
    id: u64,
}

#[derive(Default)]
pub(crate) struct MockStream {
    /// Error returned by `listen`, if any.
    pub listen_error: Option<TransportError>,
    /// `Ok(())` yields a new connection. Exhausted: pends forever.
    pub accepts: VecDeque<Result<(), TransportError>>,
    /// Error returned by `connect`, if any.
    pub connect_error: Option<TransportError>,
    /// Exhausted: `Err(Closed)`.
    pub reads: VecDeque<Result<usize, TransportError>>,
    /// Exhausted: the whole buffer is written.
    pub writes: VecDeque<Result<usize, TransportError>>,
    pub calls: Vec<Call>,
    /// Payload of every write call, in order.
    pub payloads: Vec<Vec<u8>>,
    /// Accepts issued while a connection was still open.
    pub overlapping_accepts: usize,
    pub max_live: usize,
    live: usize,
    next_id: u64,
}

impl MockStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn disconnects(&self) -> usize {
        self.count(|c| matches!(c, Call::Disconnect(_)))
    }

    pub fn write_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::Write(..)))
    }

    pub fn live(&self) -> usize {
        self.live
    }

    fn open(&mut self) -> MockConn {
        self.next_id += 1;
        self.live += 1;
        self.max_live = self.max_live.max(self.live);
        MockConn { id: self.next_id }
    }
}

impl StreamTransport for MockStream {
    type Queue = ();
    type Conn = MockConn;

    async fn listen(&mut self, local: SocketAddr, depth: u32) -> Result<(), TransportError> {
        self.calls.push(Call::Listen(local, depth));
        match self.listen_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn accept(
        &mut self,
        _queue: &mut (),
        _timeout: Option<Duration>,
    ) -> Result<MockConn, TransportError> {
        self.calls.push(Call::Accept);
        if self.live > 0 {
            self.overlapping_accepts += 1;
        }
        match self.accepts.pop_front() {
            Some(Ok(())) => Ok(self.open()),
            Some(Err(e)) => Err(e),
            None => std::future::pending().await,
        }
    }

    async fn read(
        &mut self,
        conn: &mut MockConn,
        buf: &mut [u8],
        _timeout: Option<Duration>,
    ) -> Result<usize, TransportError> {
        self.calls.push(Call::Read(conn.id));
        match self.reads.pop_front() {
            Some(Ok(n)) => Ok(n.min(buf.len())),
            Some(Err(e)) => Err(e),
            None => Err(TransportError::Closed),
        }
    }

    async fn write(&mut self, conn: &mut MockConn, buf: &[u8]) -> Result<usize, TransportError> {
        self.calls.push(Call::Write(conn.id, buf.len()));
        self.payloads.push(buf.to_vec());
        self.writes.pop_front().unwrap_or(Ok(buf.len()))
    }

    async fn connect(&mut self, remote: SocketAddr) -> Result<MockConn, TransportError> {
        self.calls.push(Call::Connect(remote));
        match self.connect_error.take() {
            Some(e) => Err(e),
            None => Ok(self.open()),
        }
    }

    async fn disconnect(&mut self, conn: MockConn) {
        self.calls.push(Call::Disconnect(conn.id));
        self.live -= 1;
    }
}

#[derive(Default)]
pub(crate) struct MockDatagram {
    pub bind_error: Option<TransportError>,
    /// Exhausted: pends forever.
    pub recvs: VecDeque<Result<(Vec<u8>, SocketAddr), TransportError>>,
    /// Exhausted: the whole buffer is sent.
    pub sends: VecDeque<Result<usize, TransportError>>,
    pub binds: Vec<SocketAddr>,
    pub sent: Vec<(Vec<u8>, SocketAddr)>,
    pub recv_timeouts: Vec<Option<Duration>>,
    pub closes: usize,
}

impl MockDatagram {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DatagramTransport for MockDatagram {
    type Socket = ();

    async fn bind(&mut self, local: SocketAddr) -> Result<(), TransportError> {
        self.binds.push(local);
        match self.bind_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn send_to(
        &mut self,
        _sock: &mut (),
        buf: &[u8],
        remote: SocketAddr,
    ) -> Result<usize, TransportError> {
        self.sent.push((buf.to_vec(), remote));
        self.sends.pop_front().unwrap_or(Ok(buf.len()))
    }

    async fn recv_from(
        &mut self,
        _sock: &mut (),
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<(usize, SocketAddr), TransportError> {
        self.recv_timeouts.push(timeout);
        match self.recvs.pop_front() {
            Some(Ok((data, from))) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok((n, from))
            }
            Some(Err(e)) => Err(e),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self, _sock: ()) {
        self.closes += 1;
    }
}

/// Clock that advances by a fixed step on every reading.
pub(crate) struct StepClock {
    now: Cell<u64>,
    step: u64,
}

impl StepClock {
    pub fn new(step: u64) -> Self {
        Self {
            now: Cell::new(0),
            step,
        }
    }
}

impl Clock for StepClock {
    fn now_micros(&self) -> u64 {
        let now = self.now.get();
        self.now.set(now + self.step);
        now
    }
}

pub(crate) fn io_error(kind: io::ErrorKind) -> TransportError {
    TransportError::Io(io::Error::from(kind))
}
