#![forbid(unsafe_code)]

use tokio::sync::broadcast;

use crate::SelectionReason;

/// Events emitted by a track selection.
///
/// Indices are selection indices (decreasing-bitrate order).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionEvent {
    /// Selection enabled with its starting track.
    Enabled {
        selected: usize,
        reason: SelectionReason,
    },
    /// Selection disabled.
    Disabled,
    /// Selected track changed during an update.
    TrackChanged {
        from: usize,
        to: usize,
        reason: SelectionReason,
    },
    /// Track excluded until the given clock time.
    Blacklisted { index: usize, until_ms: u64 },
    /// Blacklist refused because it would leave no eligible track.
    BlacklistRefused { index: usize },
    /// Queue evaluation asked the driver to discard buffered chunks.
    QueueTrimmed { retain: usize, queued: usize },
}

/// Broadcast channel for selection events.
///
/// `publish()` is a sync call: it works from the playback control loop
/// without an async runtime. If there are no subscribers, events are
/// silently dropped.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<SelectionEvent>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: SelectionEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to all future events.
    ///
    /// Slow subscribers receive `RecvError::Lagged(n)` instead of blocking
    /// the selection.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SelectionEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
