//! Configuration for handlers and the address registry.
//!
//! Both config structs deserialize with serde (missing fields take the
//! defaults) and can be read from `EDGEWIRE_*` environment variables.
//!
//! | Variable | Field |
//! |---|---|
//! | `EDGEWIRE_INBOUND_CAPACITY` | [`HandlerConfig::inbound_capacity`] |
//! | `EDGEWIRE_OUTBOUND_CAPACITY` | [`HandlerConfig::outbound_capacity`] |
//! | `EDGEWIRE_MAX_CLIENTS_PER_FRAME` | [`HandlerConfig::max_clients_per_frame`] |
//! | `EDGEWIRE_MALFORMED_FRAMES` (`skip`/`fatal`) | [`HandlerConfig::malformed_frames`] |
//! | `EDGEWIRE_ZMQ_LINGER_MS` | [`HandlerConfig::zmq_linger`] |
//! | `EDGEWIRE_HOST` | [`RegistryConfig::host`] |
//! | `EDGEWIRE_BASE_PORT` | [`RegistryConfig::base_port`] |

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HandlerError, Result};
use crate::protocol::MAX_CLIENTS_PER_FRAME;

/// Default inbound (request) channel capacity.
pub const DEFAULT_INBOUND_CAPACITY: usize = 1024;

/// Default outbound (response) channel capacity.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 1024;

/// Default host used in registry endpoints.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// First pull port handed out by the registry.
pub const DEFAULT_BASE_PORT: u16 = 10070;

/// What the read loop does with a frame it cannot decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedFramePolicy {
    /// Log, count and keep reading.
    #[default]
    Skip,
    /// Stop the read loop; the error is reported by `shutdown()`.
    Fatal,
}

impl FromStr for MalformedFramePolicy {
    type Err = HandlerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "fatal" => Ok(Self::Fatal),
            other => Err(HandlerError::Config(format!(
                "unknown malformed frame policy '{}'",
                other
            ))),
        }
    }
}

/// Handler pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Decoded requests buffered before the read loop waits for the consumer.
    pub inbound_capacity: usize,
    /// Responses buffered before senders wait for the write loop.
    pub outbound_capacity: usize,
    /// Client ids per outbound frame; larger fan-outs are split.
    pub max_clients_per_frame: usize,
    /// Read loop behavior on undecodable frames.
    pub malformed_frames: MalformedFramePolicy,
    /// ZeroMQ linger applied to both sockets.
    #[serde(with = "linger_ms")]
    pub zmq_linger: Option<Duration>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            max_clients_per_frame: MAX_CLIENTS_PER_FRAME,
            malformed_frames: MalformedFramePolicy::default(),
            zmq_linger: None,
        }
    }
}

impl HandlerConfig {
    /// Defaults overridden by `EDGEWIRE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = parse_var(&lookup, "EDGEWIRE_INBOUND_CAPACITY")? {
            config.inbound_capacity = v;
        }
        if let Some(v) = parse_var(&lookup, "EDGEWIRE_OUTBOUND_CAPACITY")? {
            config.outbound_capacity = v;
        }
        if let Some(v) = parse_var(&lookup, "EDGEWIRE_MAX_CLIENTS_PER_FRAME")? {
            config.max_clients_per_frame = v;
        }
        if let Some(v) = parse_var(&lookup, "EDGEWIRE_MALFORMED_FRAMES")? {
            config.malformed_frames = v;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "EDGEWIRE_ZMQ_LINGER_MS")? {
            config.zmq_linger = Some(Duration::from_millis(ms));
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipelines cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.inbound_capacity == 0 || self.outbound_capacity == 0 {
            return Err(HandlerError::Config(
                "channel capacities must be positive".to_string(),
            ));
        }
        if self.max_clients_per_frame == 0 || self.max_clients_per_frame > MAX_CLIENTS_PER_FRAME {
            return Err(HandlerError::Config(format!(
                "max clients per frame must be within 1..={}",
                MAX_CLIENTS_PER_FRAME
            )));
        }
        Ok(())
    }
}

/// Address allocation settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Host placed in every `tcp://<host>:<port>` endpoint.
    pub host: String,
    /// Pull port of the first registered handler.
    pub base_port: u16,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            base_port: DEFAULT_BASE_PORT,
        }
    }
}

impl RegistryConfig {
    /// Defaults overridden by `EDGEWIRE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(host) = lookup("EDGEWIRE_HOST") {
            let host = host.trim();
            if host.is_empty() {
                return Err(HandlerError::Config("EDGEWIRE_HOST is empty".to_string()));
            }
            config.host = host.to_string();
        }
        if let Some(port) = parse_var(&lookup, "EDGEWIRE_BASE_PORT")? {
            config.base_port = port;
        }
        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| HandlerError::Config(format!("invalid value for {}: '{}'", name, raw)))
}

/// `Option<Duration>` as optional milliseconds.
mod linger_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
