//! Error types for edgewire.

use thiserror::Error;

/// Main error type for all handler operations.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Malformed inbound frame (bad integer, truncated buffer, invalid JSON, ...).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Response that cannot be encoded (e.g. no client ids).
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Socket setup failed while connecting the transport.
    #[error("Failed to connect {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    /// Transport failure after setup.
    #[error("Transport error: {0}")]
    Transport(String),

    /// ZeroMQ error during send/receive.
    #[error("ZeroMQ error: {0}")]
    Zmq(#[from] zmq::Error),

    /// The transport context was torn down. Loops treat this as a clean exit.
    #[error("Transport terminated")]
    Terminated,

    /// The handler (or one of its channels) is closed.
    #[error("Handler closed")]
    Closed,

    /// Address registry failure (exhausted port range, poisoned lock).
    #[error("Address registry error: {0}")]
    Registry(String),

    /// The OS randomness source failed while generating an identity.
    #[error("Randomness source failed: {0}")]
    Entropy(#[from] rand::Error),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A pipeline task panicked or was cancelled.
    #[error("Handler task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl HandlerError {
    /// True for the graceful termination signal.
    pub fn is_terminated(&self) -> bool {
        matches!(self, HandlerError::Terminated)
    }

    /// True if this error came from decoding a malformed frame.
    pub fn is_malformed_frame(&self) -> bool {
        matches!(self, HandlerError::Protocol(_))
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        HandlerError::Protocol(msg.into())
    }
}

/// Result type alias using HandlerError.
pub type Result<T> = std::result::Result<T, HandlerError>;
