//! # edgewire
//!
//! Handler protocol layer for applications sitting behind a front-end edge
//! server that speaks ZeroMQ.
//!
//! The edge server pushes each HTTP request as one frame on a PULL socket
//! and subscribes to a PUB socket for responses. This crate decodes the
//! former, encodes the latter and runs both directions as independent
//! pipelines so a slow consumer never stalls publishing.
//!
//! ## Architecture
//!
//! - **Addressing**: [`AddressRegistry`] hands out `(pull, publish, identity)`
//!   triples per handler name
//! - **Wire format**: [`Request`] / [`Response`] frame codec
//! - **Transport**: [`ZmqTransport`](transport::ZmqTransport) or the
//!   in-process [`MemoryTransport`](transport::MemoryTransport)
//! - **Pipelines**: [`Handler`] with its read and write loops
//!
//! ## Example
//!
//! ```ignore
//! use edgewire::{AddressRegistry, Handler, Response};
//!
//! #[tokio::main]
//! async fn main() -> edgewire::Result<()> {
//!     let registry = AddressRegistry::default();
//!     let address = registry.get_handler_address("app")?;
//!     let mut handler = Handler::connect(&address).await?;
//!
//!     while let Some(request) = handler.recv().await? {
//!         if request.is_disconnect() {
//!             continue;
//!         }
//!         let reply = Response::to(&request).body(request.body_bytes());
//!         handler.send(reply).await?;
//!     }
//!
//!     handler.shutdown().await
//! }
//! ```

pub mod address;
pub mod config;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod transport;

mod reader;
mod writer;

pub use address::{generate_identity, AddressRegistry, HandlerAddress};
pub use config::{HandlerConfig, MalformedFramePolicy, RegistryConfig};
pub use error::{HandlerError, Result};
pub use handler::{Handler, HandlerBuilder, HandlerState, HandlerStats, Responder};
pub use protocol::{Request, Response};
