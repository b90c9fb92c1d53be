use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a handler's frame counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerStats {
    /// Frames pulled from the transport, malformed ones included.
    pub received_frames: u64,
    /// Frames that failed to decode.
    pub malformed_frames: u64,
    /// Frames published to the transport.
    pub sent_frames: u64,
    /// Responses still queued when the write loop closed, never published.
    pub discarded_responses: u64,
}

/// Live counters shared with both loops.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub received: AtomicU64,
    pub malformed: AtomicU64,
    pub sent: AtomicU64,
    pub discarded: AtomicU64,
}

impl Counters {
    pub fn snapshot(&self) -> HandlerStats {
        HandlerStats {
            received_frames: self.received.load(Ordering::Relaxed),
            malformed_frames: self.malformed.load(Ordering::Relaxed),
            sent_frames: self.sent.load(Ordering::Relaxed),
            discarded_responses: self.discarded.load(Ordering::Relaxed),
        }
    }
}
