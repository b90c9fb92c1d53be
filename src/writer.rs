//! Dedicated writer task publishing responses.
//!
//! Every [`Responder`](crate::handler::Responder) and the handler itself feed
//! one bounded channel; a single blocking task owns the outbound socket, so
//! no lock is ever taken around it.
//!
//! # Architecture
//!
//! ```text
//! Responder 1 ─┐
//! Responder 2 ─┼─► mpsc::Sender<Outbound> ─► Writer Task ─► PUB socket
//! Handler     ─┘
//! ```
//!
//! The loop stops on [`Outbound::Close`], after everything queued before it
//! was published. The channel is then closed and anything that raced in
//! behind the marker is dropped and counted as discarded.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{HandlerError, Result};
use crate::handler::Counters;
use crate::protocol::Response;
use crate::transport::OutboundSocket;

/// Item on the outbound channel.
#[derive(Debug)]
pub(crate) enum Outbound {
    /// Publish a response.
    Response(Response),
    /// Stop after everything queued so far.
    Close,
}

/// Spawn the write loop on the blocking pool.
pub(crate) fn spawn_writer_task<O>(
    runtime: &Handle,
    socket: O,
    rx: mpsc::Receiver<Outbound>,
    max_clients_per_frame: usize,
    counters: Arc<Counters>,
) -> JoinHandle<Result<()>>
where
    O: OutboundSocket,
{
    runtime.spawn_blocking(move || write_loop(socket, rx, max_clients_per_frame, &counters))
}

/// Main writer loop - encodes responses and publishes the frames.
fn write_loop<O: OutboundSocket>(
    mut socket: O,
    mut rx: mpsc::Receiver<Outbound>,
    max_clients_per_frame: usize,
    counters: &Counters,
) -> Result<()> {
    tracing::debug!("Write loop started");

    while let Some(Outbound::Response(response)) = rx.blocking_recv() {
        let frames = match response.encode_frames(max_clients_per_frame) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(server_id = %response.server_id, "Dropping response: {}", e);
                continue;
            }
        };

        for frame in frames {
            match socket.send(&frame) {
                Ok(()) => {
                    counters.sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(HandlerError::Terminated) => {
                    tracing::debug!("Write loop stopped by transport termination");
                    return Ok(());
                }
                Err(e) => {
                    tracing::error!("Write loop error: {}", e);
                    return Err(e);
                }
            }
        }
    }

    // Late senders get `Closed`; whatever slipped in behind `Close` is counted.
    rx.close();
    let mut discarded = 0u64;
    while let Some(item) = rx.blocking_recv() {
        if matches!(item, Outbound::Response(_)) {
            discarded += 1;
        }
    }
    if discarded > 0 {
        counters.discarded.fetch_add(discarded, Ordering::Relaxed);
        tracing::warn!(discarded, "Discarded responses queued after close");
    }

    tracing::debug!("Write loop stopped");
    Ok(())
}
