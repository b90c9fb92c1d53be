//! Cloneable response sink.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::{HandlerError, Result};
use crate::protocol::{Request, Response};
use crate::writer::Outbound;

/// Handle for queueing responses on a running [`Handler`](super::Handler).
///
/// `Responder` is `Clone` and can be moved into as many tasks as needed;
/// all clones feed the same write loop, so responses from one clone are
/// published in the order they were sent.
///
/// Once the handler shuts down every clone fails with
/// [`HandlerError::Closed`].
#[derive(Clone)]
pub struct Responder {
    tx: mpsc::Sender<Outbound>,
    closed: Arc<AtomicBool>,
}

impl Responder {
    pub(crate) fn new(tx: mpsc::Sender<Outbound>, closed: Arc<AtomicBool>) -> Self {
        Self { tx, closed }
    }

    /// Queue a response, waiting for room in the outbound channel.
    ///
    /// Responses that cannot be framed are rejected here with
    /// [`HandlerError::InvalidResponse`]. `Ok` means the response was queued,
    /// not published: one queued while `shutdown` is closing the channel is
    /// discarded by the write loop.
    pub async fn send(&self, response: Response) -> Result<()> {
        if self.is_closed() {
            return Err(HandlerError::Closed);
        }
        response.validate()?;
        self.tx
            .send(Outbound::Response(response))
            .await
            .map_err(|_| HandlerError::Closed)
    }

    /// Reply to the sender of `request` with a `200 OK` and `body`.
    pub async fn reply(&self, request: &Request, body: impl Into<bytes::Bytes>) -> Result<()> {
        self.send(Response::to(request).body(body)).await
    }

    /// Check if the handler stopped accepting responses.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }
}
