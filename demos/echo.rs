//! Echo Handler - simple request/response example.
//!
//! This example demonstrates:
//! - Allocating a handler address from the registry
//! - Connecting a handler to an edge server over ZeroMQ
//! - Echoing each request body back to its client
//!
//! Point the edge server's handler config at the printed endpoints, e.g.
//!
//! ```text
//! send_spec  = tcp://127.0.0.1:10070
//! recv_spec  = tcp://127.0.0.1:10071
//! send_ident = <identity printed below>
//! ```
//!
//! Run with `RUST_LOG=edgewire=debug` to see the pipelines start and stop.

use edgewire::{AddressRegistry, Handler, HandlerConfig, RegistryConfig, Response};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let registry = AddressRegistry::new(RegistryConfig::from_env()?);
    let address = registry.get_handler_address("echo")?;
    tracing::info!(
        pull = %address.pull_endpoint,
        publish = %address.publish_endpoint,
        identity = %address.identity,
        "Echo handler address"
    );

    let mut handler = Handler::builder()
        .config(HandlerConfig::from_env()?)
        .connect(&address)
        .await?;

    loop {
        let request = tokio::select! {
            request = handler.recv() => request?,
            _ = tokio::signal::ctrl_c() => break,
        };
        // Inbound side closed: the read loop stopped.
        let Some(request) = request else { break };

        if request.is_disconnect() {
            tracing::debug!(client_id = request.client_id(), "Client disconnected");
            continue;
        }

        let response = Response::to(&request)
            .header("Content-Type", "application/octet-stream")
            .body(request.body_bytes());
        handler.send(response).await?;
    }

    handler.shutdown().await?;
    Ok(())
}
