//! In-process transport.
//!
//! [`MemoryTransport`] plays the handler side, [`MemoryPeer`] plays the edge
//! server: it injects request frames and observes published response frames.
//! Handy for tests and for embedding a handler without any sockets.
//!
//! # Example
//!
//! ```
//! use edgewire::transport::{InboundSocket, MemoryTransport, Transport};
//!
//! let (mut transport, peer) = MemoryTransport::pair();
//! let (mut inbound, _outbound) = transport.connect().unwrap();
//!
//! peer.deliver(&b"srv 1 / 0:,0:,"[..]).unwrap();
//! assert_eq!(&inbound.receive().unwrap()[..], b"srv 1 / 0:,0:,");
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use super::{InboundSocket, OutboundSocket, Transport};
use crate::error::{HandlerError, Result};

enum Signal {
    Frame(Bytes),
    Terminate,
}

#[derive(Default)]
struct Shared {
    terminated: AtomicBool,
    fail_sends: AtomicBool,
}

/// Handler side of an in-process transport.
pub struct MemoryTransport {
    inbound_tx: mpsc::UnboundedSender<Signal>,
    inbound_rx: Option<mpsc::UnboundedReceiver<Signal>>,
    outbound_tx: Option<mpsc::UnboundedSender<Bytes>>,
    shared: Arc<Shared>,
    unreachable: Option<String>,
}

/// Edge-server side of an in-process transport.
pub struct MemoryPeer {
    inbound_tx: mpsc::UnboundedSender<Signal>,
    outbound_rx: mpsc::UnboundedReceiver<Bytes>,
    shared: Arc<Shared>,
}

impl MemoryTransport {
    /// Create a connected transport/peer pair.
    pub fn pair() -> (Self, MemoryPeer) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());

        let transport = Self {
            inbound_tx: inbound_tx.clone(),
            inbound_rx: Some(inbound_rx),
            outbound_tx: Some(outbound_tx),
            shared: shared.clone(),
            unreachable: None,
        };
        let peer = MemoryPeer {
            inbound_tx,
            outbound_rx,
            shared,
        };
        (transport, peer)
    }

    /// Create a transport whose `connect` always fails for `endpoint`.
    pub fn unreachable(endpoint: impl Into<String>) -> Self {
        let (mut transport, _peer) = Self::pair();
        transport.unreachable = Some(endpoint.into());
        transport
    }
}

impl Transport for MemoryTransport {
    type Inbound = MemoryInbound;
    type Outbound = MemoryOutbound;

    fn connect(&mut self) -> Result<(MemoryInbound, MemoryOutbound)> {
        if let Some(endpoint) = &self.unreachable {
            return Err(HandlerError::Connect {
                endpoint: endpoint.clone(),
                reason: "connection refused".to_string(),
            });
        }

        let (Some(rx), Some(tx)) = (self.inbound_rx.take(), self.outbound_tx.take()) else {
            return Err(HandlerError::Transport("already connected".to_string()));
        };

        let inbound = MemoryInbound {
            rx,
            shared: self.shared.clone(),
        };
        let outbound = MemoryOutbound {
            tx,
            shared: self.shared.clone(),
        };
        Ok((inbound, outbound))
    }

    fn terminate(&mut self) -> Result<()> {
        if !self.shared.terminated.swap(true, Ordering::SeqCst) {
            // Receiver may already be gone; nothing left to wake then.
            let _ = self.inbound_tx.send(Signal::Terminate);
        }
        Ok(())
    }
}

/// Receiving half of a [`MemoryTransport`].
pub struct MemoryInbound {
    rx: mpsc::UnboundedReceiver<Signal>,
    shared: Arc<Shared>,
}

impl InboundSocket for MemoryInbound {
    fn receive(&mut self) -> Result<Bytes> {
        if self.shared.terminated.load(Ordering::SeqCst) {
            return Err(HandlerError::Terminated);
        }
        match self.rx.blocking_recv() {
            Some(Signal::Frame(frame)) => Ok(frame),
            Some(Signal::Terminate) | None => Err(HandlerError::Terminated),
        }
    }
}

/// Sending half of a [`MemoryTransport`].
pub struct MemoryOutbound {
    tx: mpsc::UnboundedSender<Bytes>,
    shared: Arc<Shared>,
}

impl OutboundSocket for MemoryOutbound {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        if self.shared.terminated.load(Ordering::SeqCst) {
            return Err(HandlerError::Terminated);
        }
        if self.shared.fail_sends.load(Ordering::SeqCst) {
            return Err(HandlerError::Transport("peer rejected frame".to_string()));
        }
        // Like PUB with no subscriber: frames to a gone peer are dropped.
        let _ = self.tx.send(Bytes::copy_from_slice(frame));
        Ok(())
    }
}

impl MemoryPeer {
    /// Inject an inbound frame.
    pub fn deliver(&self, frame: impl Into<Bytes>) -> Result<()> {
        self.inbound_tx
            .send(Signal::Frame(frame.into()))
            .map_err(|_| HandlerError::Closed)
    }

    /// Wait for the next published frame.
    ///
    /// Returns `None` once the sending half is gone and everything was read.
    pub async fn next_sent(&mut self) -> Option<Bytes> {
        self.outbound_rx.recv().await
    }

    /// Take a published frame if one is waiting.
    pub fn try_next_sent(&mut self) -> Option<Bytes> {
        self.outbound_rx.try_recv().ok()
    }

    /// Make every later send fail with a transport error.
    pub fn fail_sends(&self) {
        self.shared.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Check if the transport was terminated.
    pub fn is_terminated(&self) -> bool {
        self.shared.terminated.load(Ordering::SeqCst)
    }
}
