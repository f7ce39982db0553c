//! Per-peer connection state and the handle to its transport.

use bytes::Bytes;
use log::trace;
use shared::{CharIndex, FrameBuffer, MapId, ServerCommand};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

/// Monotonic, never reused.
pub type ConnectionId = u64;

/// Sending side of a connection's socket.
///
/// Bytes go to a writer task over an unbounded channel; the close signal
/// tells the reader task to stop. Dropping the transport releases both, so
/// the writer drains what was queued and then shuts the socket down.
#[derive(Debug)]
pub struct Transport {
    outgoing: mpsc::UnboundedSender<Bytes>,
    closer: Option<oneshot::Sender<()>>,
}

/// The other ends of a [`Transport`], held by the socket tasks.
#[derive(Debug)]
pub struct TransportHandle {
    pub outgoing: mpsc::UnboundedReceiver<Bytes>,
    pub closed: oneshot::Receiver<()>,
}

impl Transport {
    pub fn pair() -> (Transport, TransportHandle) {
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (closer, closed) = oneshot::channel();
        (
            Transport {
                outgoing,
                closer: Some(closer),
            },
            TransportHandle {
                outgoing: outgoing_rx,
                closed,
            },
        )
    }

    /// Queues bytes for the writer. Returns false once the writer is gone.
    pub fn send(&self, bytes: Bytes) -> bool {
        self.outgoing.send(bytes).is_ok()
    }

    pub fn close(&mut self) {
        if let Some(closer) = self.closer.take() {
            let _ = closer.send(());
        }
    }
}

pub struct Connection {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    pub inbound: FrameBuffer,
    pub outbound: FrameBuffer,
    pub last_activity: Instant,
    /// Set once login succeeds.
    pub player: Option<CharIndex>,
    /// Dispatch is suspended until this map finishes loading.
    pub parked_on: Option<MapId>,
    close_requested: bool,
    closing: bool,
    transport: Transport,
}

impl Connection {
    pub fn new(id: ConnectionId, addr: SocketAddr, transport: Transport) -> Self {
        Self {
            id,
            addr,
            inbound: FrameBuffer::new(),
            outbound: FrameBuffer::new(),
            last_activity: Instant::now(),
            player: None,
            parked_on: None,
            close_requested: false,
            closing: false,
            transport,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.player.is_some()
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// Asks the server to tear this connection down once the current
    /// command finishes.
    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    pub fn send(&mut self, command: &ServerCommand) {
        command.write(&mut self.outbound);
    }

    /// Hands everything in the outbound buffer to the transport.
    pub fn flush(&mut self) {
        if self.outbound.is_empty() {
            return;
        }
        let bytes = self.outbound.take_all();
        trace!("Connection {}: flushing {} bytes", self.id, bytes.len());
        if !self.transport.send(bytes) {
            trace!("Connection {}: writer already gone", self.id);
        }
    }

    /// Flushes pending output and releases the transport. Returns false if
    /// the connection was already closing.
    pub fn close(&mut self) -> bool {
        if self.closing {
            return false;
        }
        self.closing = true;
        self.flush();
        self.transport.close();
        true
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("player", &self.player)
            .field("parked_on", &self.parked_on)
            .field("pending_in", &self.inbound.len())
            .field("pending_out", &self.outbound.len())
            .finish()
    }
}
