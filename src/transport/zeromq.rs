//! ZeroMQ transport.
//!
//! - PULL socket connected to the pull endpoint (requests in)
//! - PUB socket with the handler identity, connected to the publish
//!   endpoint (responses out)
//!
//! # Example
//!
//! ```ignore
//! use edgewire::transport::{Transport, ZmqTransport};
//!
//! let mut transport = ZmqTransport::new(
//!     "tcp://127.0.0.1:10070",
//!     "tcp://127.0.0.1:10071",
//!     identity,
//! );
//! let (inbound, outbound) = transport.connect()?;
//! ```

use std::time::Duration;

use bytes::Bytes;

use super::{InboundSocket, OutboundSocket, Transport};
use crate::address::HandlerAddress;
use crate::error::{HandlerError, Result};

/// Transport over a pair of ZeroMQ sockets.
///
/// Nothing is opened until [`connect`](Transport::connect).
pub struct ZmqTransport {
    pull_endpoint: String,
    publish_endpoint: String,
    identity: String,
    linger: Option<Duration>,
    context: Option<zmq::Context>,
}

impl ZmqTransport {
    /// Create a transport for explicit endpoints.
    pub fn new(
        pull_endpoint: impl Into<String>,
        publish_endpoint: impl Into<String>,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            pull_endpoint: pull_endpoint.into(),
            publish_endpoint: publish_endpoint.into(),
            identity: identity.into(),
            linger: None,
            context: None,
        }
    }

    /// Create a transport for a registry address.
    pub fn for_address(address: &HandlerAddress) -> Self {
        Self::new(
            &address.pull_endpoint,
            &address.publish_endpoint,
            &address.identity,
        )
    }

    /// Set socket linger (how long unsent frames are kept on close).
    pub fn linger(mut self, linger: Option<Duration>) -> Self {
        self.linger = linger;
        self
    }

    /// Identity set on the PUB socket.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    fn linger_ms(&self) -> Option<i32> {
        self.linger
            .map(|d| i32::try_from(d.as_millis()).unwrap_or(i32::MAX))
    }

    fn open(
        &self,
        context: &zmq::Context,
        kind: zmq::SocketType,
        endpoint: &str,
        identity: Option<&str>,
    ) -> Result<zmq::Socket> {
        let connect_err = |e: zmq::Error| HandlerError::Connect {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        };

        let socket = context.socket(kind).map_err(connect_err)?;
        if let Some(identity) = identity {
            socket.set_identity(identity.as_bytes()).map_err(connect_err)?;
        }
        if let Some(ms) = self.linger_ms() {
            socket.set_linger(ms).map_err(connect_err)?;
        }
        socket.connect(endpoint).map_err(connect_err)?;
        Ok(socket)
    }
}

impl Transport for ZmqTransport {
    type Inbound = ZmqInbound;
    type Outbound = ZmqOutbound;

    fn connect(&mut self) -> Result<(ZmqInbound, ZmqOutbound)> {
        if self.context.is_some() {
            return Err(HandlerError::Transport("already connected".to_string()));
        }

        let context = zmq::Context::new();
        let pull = self.open(&context, zmq::PULL, &self.pull_endpoint, None)?;
        let publish = self.open(
            &context,
            zmq::PUB,
            &self.publish_endpoint,
            Some(&self.identity),
        )?;

        tracing::debug!(
            pull = %self.pull_endpoint,
            publish = %self.publish_endpoint,
            identity = %self.identity,
            "ZeroMQ sockets connected"
        );

        self.context = Some(context);
        Ok((ZmqInbound { socket: pull }, ZmqOutbound { socket: publish }))
    }

    fn terminate(&mut self) -> Result<()> {
        let Some(mut context) = self.context.take() else {
            return Ok(());
        };

        loop {
            match context.destroy() {
                Ok(()) => break,
                Err(zmq::Error::EINTR) => continue,
                Err(e) => return Err(HandlerError::Zmq(e)),
            }
        }

        tracing::debug!(identity = %self.identity, "ZeroMQ context terminated");
        Ok(())
    }
}

/// PULL half.
pub struct ZmqInbound {
    socket: zmq::Socket,
}

impl InboundSocket for ZmqInbound {
    fn receive(&mut self) -> Result<Bytes> {
        self.socket
            .recv_bytes(0)
            .map(Bytes::from)
            .map_err(runtime_error)
    }
}

/// PUB half.
pub struct ZmqOutbound {
    socket: zmq::Socket,
}

impl OutboundSocket for ZmqOutbound {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.socket.send(frame, 0).map_err(runtime_error)
    }
}

fn runtime_error(e: zmq::Error) -> HandlerError {
    match e {
        zmq::Error::ETERM => HandlerError::Terminated,
        other => HandlerError::Zmq(other),
    }
}
