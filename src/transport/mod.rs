//! Transport module - the socket pair a handler talks through.
//!
//! A transport is connected once and yields two halves:
//! - an [`InboundSocket`] the read loop blocks on (PULL side)
//! - an [`OutboundSocket`] the write loop publishes through (PUB side)
//!
//! Each half is owned by exactly one loop. [`Transport::terminate`] is the
//! only way to unblock a pending `receive`, which then fails with
//! [`HandlerError::Terminated`](crate::error::HandlerError::Terminated).
//!
//! Provides:
//! - [`ZmqTransport`] for talking to a real edge server
//! - [`MemoryTransport`] and its [`MemoryPeer`] for in-process use

mod memory;
mod zeromq;

pub use self::memory::{MemoryInbound, MemoryOutbound, MemoryPeer, MemoryTransport};
pub use self::zeromq::{ZmqInbound, ZmqOutbound, ZmqTransport};

use bytes::Bytes;

use crate::error::Result;

/// Connects and tears down the socket pair.
pub trait Transport: Send + 'static {
    /// Receiving half.
    type Inbound: InboundSocket;
    /// Sending half.
    type Outbound: OutboundSocket;

    /// Open both sockets. Called at most once per handler.
    fn connect(&mut self) -> Result<(Self::Inbound, Self::Outbound)>;

    /// Tear down the transport, failing any blocked `receive` with
    /// `Terminated`. May block until both halves are dropped.
    fn terminate(&mut self) -> Result<()>;
}

/// Blocking receive of one whole frame.
pub trait InboundSocket: Send + 'static {
    /// Wait for the next frame.
    fn receive(&mut self) -> Result<Bytes>;
}

/// Blocking send of one whole frame.
pub trait OutboundSocket: Send + 'static {
    /// Publish a frame.
    fn send(&mut self, frame: &[u8]) -> Result<()>;
}
