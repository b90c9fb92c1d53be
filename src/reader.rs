//! Read loop: pulls raw frames, decodes them and hands requests to the
//! consumer through the inbound channel.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::MalformedFramePolicy;
use crate::error::{HandlerError, Result};
use crate::handler::Counters;
use crate::protocol::Request;
use crate::transport::InboundSocket;

/// Spawn the read loop on the blocking pool.
pub(crate) fn spawn_reader_task<I>(
    runtime: &Handle,
    socket: I,
    tx: mpsc::Sender<Request>,
    policy: MalformedFramePolicy,
    counters: Arc<Counters>,
) -> JoinHandle<Result<()>>
where
    I: InboundSocket,
{
    runtime.spawn_blocking(move || read_loop(socket, tx, policy, &counters))
}

/// Runs until the transport is terminated, the consumer side is closed, or
/// a fatal error occurs.
fn read_loop<I: InboundSocket>(
    mut socket: I,
    tx: mpsc::Sender<Request>,
    policy: MalformedFramePolicy,
    counters: &Counters,
) -> Result<()> {
    tracing::debug!("Read loop started");

    loop {
        let raw = match socket.receive() {
            Ok(raw) => raw,
            Err(HandlerError::Terminated) => {
                tracing::debug!("Read loop stopped by transport termination");
                return Ok(());
            }
            Err(e) => {
                tracing::error!("Read loop error: {}", e);
                return Err(e);
            }
        };
        counters.received.fetch_add(1, Ordering::Relaxed);

        let request = match Request::decode(raw) {
            Ok(request) => request,
            Err(e) => {
                counters.malformed.fetch_add(1, Ordering::Relaxed);
                match policy {
                    MalformedFramePolicy::Skip => {
                        tracing::warn!("Skipping malformed frame: {}", e);
                        continue;
                    }
                    MalformedFramePolicy::Fatal => {
                        tracing::error!("Malformed frame: {}", e);
                        return Err(e);
                    }
                }
            }
        };

        if tx.blocking_send(request).is_err() {
            tracing::debug!("Read loop stopped, inbound channel closed");
            return Ok(());
        }
    }
}
