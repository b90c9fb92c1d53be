//! Handler - the two pipelines between a transport and the application.
//!
//! A [`Handler`] owns one [`Transport`] and, once started, two blocking
//! tasks:
//! - the read loop: transport → [`Request::decode`] → inbound channel
//! - the write loop: outbound channel → [`Response`] encoding → transport
//!
//! The application reads with [`Handler::recv`] and writes with
//! [`Handler::send`] or any number of cloned [`Responder`]s.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ─start()─► Connected ─► Running ─shutdown()─► ShuttingDown ─► Closed
//! ```
//!
//! `recv`, `send` and `responder` start the handler on first use.
//!
//! # Example
//!
//! ```ignore
//! use edgewire::{AddressRegistry, Handler, Response};
//!
//! let registry = AddressRegistry::default();
//! let address = registry.get_handler_address("app")?;
//! let mut handler = Handler::connect(&address).await?;
//!
//! while let Some(request) = handler.recv().await? {
//!     handler.send(Response::to(&request).body("hello")).await?;
//! }
//! handler.shutdown().await?;
//! ```

mod responder;
mod stats;

pub use responder::Responder;
pub use stats::HandlerStats;

pub(crate) use stats::Counters;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::address::HandlerAddress;
use crate::config::{HandlerConfig, MalformedFramePolicy};
use crate::error::{HandlerError, Result};
use crate::protocol::{Request, Response};
use crate::reader::spawn_reader_task;
use crate::transport::{Transport, ZmqTransport};
use crate::writer::{spawn_writer_task, Outbound};

/// Lifecycle state of a [`Handler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// Constructed; no socket opened yet.
    Uninitialized,
    /// Transport connected, loops not spawned yet.
    Connected,
    /// Both loops running.
    Running,
    /// `shutdown()` in progress.
    ShuttingDown,
    /// Everything released. Terminal.
    Closed,
}

/// Builder for configuring and creating a [`Handler`].
#[derive(Debug, Clone, Default)]
pub struct HandlerBuilder {
    config: HandlerConfig,
}

impl HandlerBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: HandlerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the inbound (request) channel capacity.
    ///
    /// Default: 1024
    pub fn inbound_capacity(mut self, capacity: usize) -> Self {
        self.config.inbound_capacity = capacity;
        self
    }

    /// Set the outbound (response) channel capacity.
    ///
    /// Default: 1024
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.config.outbound_capacity = capacity;
        self
    }

    /// Set how many client ids go into one outbound frame.
    ///
    /// Default: 128
    pub fn max_clients_per_frame(mut self, max: usize) -> Self {
        self.config.max_clients_per_frame = max;
        self
    }

    /// Set what the read loop does with undecodable frames.
    ///
    /// Default: [`MalformedFramePolicy::Skip`]
    pub fn malformed_frames(mut self, policy: MalformedFramePolicy) -> Self {
        self.config.malformed_frames = policy;
        self
    }

    /// Set ZeroMQ socket linger. Only used by [`connect`](Self::connect).
    pub fn zmq_linger(mut self, linger: Duration) -> Self {
        self.config.zmq_linger = Some(linger);
        self
    }

    /// Build an unstarted handler over `transport`.
    pub fn build<T: Transport>(self, transport: T) -> Handler<T> {
        Handler::with_config(transport, self.config)
    }

    /// Build a ZeroMQ handler for `address` and start it.
    pub async fn connect(self, address: &HandlerAddress) -> Result<Handler<ZmqTransport>> {
        let transport = ZmqTransport::for_address(address).linger(self.config.zmq_linger);
        let mut handler = self.build(transport);
        handler.start().await?;
        Ok(handler)
    }
}

/// A handler bound to one transport.
pub struct Handler<T: Transport = ZmqTransport> {
    config: HandlerConfig,
    state: HandlerState,
    transport: Option<T>,
    inbound: Option<mpsc::Receiver<Request>>,
    outbound: Option<mpsc::Sender<Outbound>>,
    closed: Arc<AtomicBool>,
    reader: Option<JoinHandle<Result<()>>>,
    writer: Option<JoinHandle<Result<()>>>,
    counters: Arc<Counters>,
}

impl Handler<ZmqTransport> {
    /// Create a new handler builder.
    pub fn builder() -> HandlerBuilder {
        HandlerBuilder::new()
    }

    /// Connect a ZeroMQ handler to `address` with default configuration.
    pub async fn connect(address: &HandlerAddress) -> Result<Self> {
        HandlerBuilder::new().connect(address).await
    }
}

impl<T: Transport> Handler<T> {
    /// Create an unstarted handler with default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, HandlerConfig::default())
    }

    /// Create an unstarted handler.
    pub fn with_config(transport: T, config: HandlerConfig) -> Self {
        Self {
            config,
            state: HandlerState::Uninitialized,
            transport: Some(transport),
            inbound: None,
            outbound: None,
            closed: Arc::new(AtomicBool::new(false)),
            reader: None,
            writer: None,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Connect the transport and spawn both loops.
    ///
    /// No-op when already running. Any failure leaves the handler `Closed`.
    pub async fn start(&mut self) -> Result<()> {
        self.ensure_started()
    }

    fn ensure_started(&mut self) -> Result<()> {
        match self.state {
            HandlerState::Uninitialized => {}
            HandlerState::Connected | HandlerState::Running => return Ok(()),
            HandlerState::ShuttingDown | HandlerState::Closed => return Err(HandlerError::Closed),
        }

        if let Err(e) = self.try_start() {
            tracing::error!("Handler failed to start: {}", e);
            self.state = HandlerState::Closed;
            self.transport = None;
            return Err(e);
        }
        Ok(())
    }

    fn try_start(&mut self) -> Result<()> {
        self.config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| HandlerError::Transport(format!("no tokio runtime: {}", e)))?;
        let transport = self.transport.as_mut().ok_or(HandlerError::Closed)?;

        let (inbound_socket, outbound_socket) = transport.connect()?;
        self.state = HandlerState::Connected;

        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.inbound_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_capacity);

        self.reader = Some(spawn_reader_task(
            &runtime,
            inbound_socket,
            inbound_tx,
            self.config.malformed_frames,
            self.counters.clone(),
        ));
        self.writer = Some(spawn_writer_task(
            &runtime,
            outbound_socket,
            outbound_rx,
            self.config.max_clients_per_frame,
            self.counters.clone(),
        ));
        self.inbound = Some(inbound_rx);
        self.outbound = Some(outbound_tx);
        self.state = HandlerState::Running;

        tracing::debug!("Handler running");
        Ok(())
    }

    /// Receive the next request.
    ///
    /// Returns `Ok(None)` once the inbound side is closed, either by
    /// [`shutdown`](Self::shutdown) or because the read loop stopped. In the
    /// latter case `shutdown()` reports why.
    pub async fn recv(&mut self) -> Result<Option<Request>> {
        if self.state == HandlerState::Uninitialized {
            self.ensure_started()?;
        }
        match self.inbound.as_mut() {
            Some(rx) => Ok(rx.recv().await),
            None => Ok(None),
        }
    }

    /// Queue a response for publishing.
    pub async fn send(&mut self, response: Response) -> Result<()> {
        self.responder()?.send(response).await
    }

    /// Get a cloneable response sink.
    pub fn responder(&mut self) -> Result<Responder> {
        self.ensure_started()?;
        let tx = self.outbound.as_ref().ok_or(HandlerError::Closed)?;
        Ok(Responder::new(tx.clone(), self.closed.clone()))
    }

    /// Stop both loops and release the transport.
    ///
    /// Responses queued before this call are published first. Requests not
    /// yet received are discarded. Returns the first error a loop failed
    /// with, so a clean stop can be told apart from a failed handler.
    /// Calling it again is a no-op.
    pub async fn shutdown(&mut self) -> Result<()> {
        match self.state {
            HandlerState::ShuttingDown | HandlerState::Closed => return Ok(()),
            HandlerState::Uninitialized => {
                self.transport = None;
                self.state = HandlerState::Closed;
                return Ok(());
            }
            HandlerState::Connected | HandlerState::Running => {}
        }

        self.state = HandlerState::ShuttingDown;
        tracing::debug!("Handler shutting down");
        let mut first_error = None;

        // 1. Outbound: refuse new responses, flush queued ones.
        self.closed.store(true, Ordering::Release);
        if let Some(tx) = self.outbound.take() {
            let _ = tx.send(Outbound::Close).await;
        }
        if let Some(writer) = self.writer.take() {
            keep_first(&mut first_error, join(writer).await);
        }

        // 2. Inbound: unblock the read loop and discard pending requests.
        if let Some(mut rx) = self.inbound.take() {
            rx.close();
            let mut discarded = 0usize;
            while rx.try_recv().is_ok() {
                discarded += 1;
            }
            if discarded > 0 {
                tracing::debug!(discarded, "Discarded unreceived requests");
            }
        }

        // 3. Transport: terminate, which stops a blocked receive.
        if let Some(mut transport) = self.transport.take() {
            let result = tokio::task::spawn_blocking(move || transport.terminate()).await;
            keep_first(&mut first_error, result.map_err(HandlerError::from).and_then(|r| r));
        }
        if let Some(reader) = self.reader.take() {
            keep_first(&mut first_error, join(reader).await);
        }

        self.state = HandlerState::Closed;
        tracing::debug!("Handler closed");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> HandlerState {
        self.state
    }

    /// Frame counters so far.
    pub fn stats(&self) -> HandlerStats {
        self.counters.snapshot()
    }

    /// Active configuration.
    #[inline]
    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }
}

impl<T: Transport> Drop for Handler<T> {
    fn drop(&mut self) {
        if !matches!(self.state, HandlerState::Connected | HandlerState::Running) {
            return;
        }
        tracing::warn!("Handler dropped without shutdown, tearing down in background");

        self.closed.store(true, Ordering::Release);
        if let Some(mut rx) = self.inbound.take() {
            rx.close();
        }

        let outbound = self.outbound.take();
        let Some(mut transport) = self.transport.take() else {
            return;
        };
        // Terminate can block until both loops release their sockets.
        let spawned = std::thread::Builder::new()
            .name("edgewire-teardown".to_string())
            .spawn(move || {
                if let Some(tx) = outbound {
                    let _ = tx.blocking_send(Outbound::Close);
                }
                if let Err(e) = transport.terminate() {
                    tracing::warn!("Background teardown failed: {}", e);
                }
            });
        if let Err(e) = spawned {
            tracing::warn!("Could not spawn teardown thread: {}", e);
        }
    }
}

async fn join(task: JoinHandle<Result<()>>) -> Result<()> {
    task.await?
}

fn keep_first(slot: &mut Option<HandlerError>, result: Result<()>) {
    if let Err(e) = result {
        if slot.is_none() {
            *slot = Some(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::build_request_frame;
    use crate::transport::MemoryTransport;

    #[test]
    fn test_builder_settings() {
        let builder = Handler::builder()
            .inbound_capacity(8)
            .outbound_capacity(16)
            .max_clients_per_frame(4)
            .malformed_frames(MalformedFramePolicy::Fatal)
            .zmq_linger(Duration::from_millis(5));
        let (transport, _peer) = MemoryTransport::pair();
        let handler = builder.build(transport);

        assert_eq!(handler.state(), HandlerState::Uninitialized);
        assert_eq!(handler.config().inbound_capacity, 8);
        assert_eq!(handler.config().outbound_capacity, 16);
        assert_eq!(handler.config().max_clients_per_frame, 4);
        assert_eq!(handler.config().malformed_frames, MalformedFramePolicy::Fatal);
        assert_eq!(handler.config().zmq_linger, Some(Duration::from_millis(5)));
    }

    #[tokio::test]
    async fn test_start_transitions_to_running() {
        let (transport, _peer) = MemoryTransport::pair();
        let mut handler = Handler::new(transport);

        handler.start().await.unwrap();
        assert_eq!(handler.state(), HandlerState::Running);

        // Starting twice is fine.
        handler.start().await.unwrap();
        handler.shutdown().await.unwrap();
        assert_eq!(handler.state(), HandlerState::Closed);
    }

    #[tokio::test]
    async fn test_invalid_config_closes() {
        let (transport, _peer) = MemoryTransport::pair();
        let mut handler = Handler::builder().inbound_capacity(0).build(transport);

        assert!(matches!(handler.start().await, Err(HandlerError::Config(_))));
        assert_eq!(handler.state(), HandlerState::Closed);
        assert!(matches!(handler.start().await, Err(HandlerError::Closed)));
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let (transport, _peer) = MemoryTransport::pair();
        let mut handler = Handler::new(transport);

        handler.shutdown().await.unwrap();
        assert_eq!(handler.state(), HandlerState::Closed);
        assert!(handler.recv().await.unwrap().is_none());
        assert!(handler.responder().is_err());
    }

    #[tokio::test]
    async fn test_stats_count_frames() {
        let (transport, mut peer) = MemoryTransport::pair();
        let mut handler = Handler::new(transport);

        peer.deliver(build_request_frame("srv", 1, "/", "", b"hi"))
            .unwrap();
        peer.deliver(&b"nonsense"[..]).unwrap();
        peer.deliver(build_request_frame("srv", 2, "/", "", b""))
            .unwrap();

        let first = handler.recv().await.unwrap().unwrap();
        let second = handler.recv().await.unwrap().unwrap();
        assert_eq!(first.client_id(), 1);
        assert_eq!(second.client_id(), 2);

        handler.send(Response::to(&first)).await.unwrap();
        peer.next_sent().await.unwrap();
        handler.shutdown().await.unwrap();

        let stats = handler.stats();
        assert_eq!(stats.received_frames, 3);
        assert_eq!(stats.malformed_frames, 1);
        assert_eq!(stats.sent_frames, 1);
    }

    #[test]
    fn test_keep_first() {
        let mut slot = None;
        keep_first(&mut slot, Ok(()));
        keep_first(&mut slot, Err(HandlerError::Closed));
        keep_first(&mut slot, Err(HandlerError::Terminated));
        assert!(matches!(slot, Some(HandlerError::Closed)));
    }
}
