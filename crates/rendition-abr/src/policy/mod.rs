//! Decision rules plugged into a [`TrackSelection`](crate::TrackSelection).
//!
//! The selection owns ordering, lifecycle, and blacklist bookkeeping; a
//! policy only maps the eligible candidates plus telemetry to an index.

mod adaptive;
mod fixed;
mod random;

use std::sync::Arc;

pub use adaptive::AdaptivePolicy;
pub use fixed::{FixedPolicy, ManualPolicy};
pub use random::RandomPolicy;

use crate::{Format, MediaChunk, QueueContext, SelectionData, SelectionReason, Telemetry};

/// Outcome of one policy evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    /// Selection index to use.
    pub index: usize,
    pub reason: SelectionReason,
    pub data: Option<SelectionData>,
}

impl Decision {
    #[must_use]
    pub fn new(index: usize, reason: SelectionReason) -> Self {
        Self {
            index,
            reason,
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Option<SelectionData>) -> Self {
        self.data = data;
        self
    }
}

/// Read-only view of the candidates, in decreasing-bitrate order, with their
/// current eligibility.
#[derive(Clone, Copy, Debug)]
pub struct Candidates<'a> {
    formats: &'a [Arc<Format>],
    eligible: &'a [bool],
}

impl<'a> Candidates<'a> {
    /// `formats` and `eligible` must have the same non-zero length.
    #[must_use]
    pub fn new(formats: &'a [Arc<Format>], eligible: &'a [bool]) -> Self {
        debug_assert_eq!(formats.len(), eligible.len());
        debug_assert!(!formats.is_empty());
        Self { formats, eligible }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.formats.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    #[must_use]
    pub fn format(&self, index: usize) -> Option<&'a Format> {
        self.formats.get(index).map(AsRef::as_ref)
    }

    #[must_use]
    pub fn bitrate(&self, index: usize) -> u64 {
        self.format(index).map_or(0, Format::bitrate_or_zero)
    }

    #[must_use]
    pub fn is_eligible(&self, index: usize) -> bool {
        self.eligible.get(index).copied().unwrap_or(false)
    }

    /// Eligible candidates, highest bitrate first.
    pub fn eligible(&self) -> impl Iterator<Item = (usize, &'a Format)> + 'a {
        let eligible = self.eligible;
        self.formats
            .iter()
            .enumerate()
            .filter(move |(i, _)| eligible[*i])
            .map(|(i, f)| (i, f.as_ref()))
    }

    #[must_use]
    pub fn eligible_count(&self) -> usize {
        self.eligible.iter().filter(|e| **e).count()
    }

    /// Highest-bitrate eligible candidate.
    #[must_use]
    pub fn highest_eligible(&self) -> usize {
        self.eligible.iter().position(|e| *e).unwrap_or(0)
    }

    /// Lowest-bitrate eligible candidate.
    #[must_use]
    pub fn lowest_eligible(&self) -> usize {
        self.eligible
            .iter()
            .rposition(|e| *e)
            .unwrap_or(self.len().saturating_sub(1))
    }

    /// `index` itself if eligible, else the next eligible candidate below
    /// it, else the lowest eligible one above it.
    #[must_use]
    pub fn nearest_eligible(&self, index: usize) -> usize {
        if self.is_eligible(index) {
            return index;
        }
        (index..self.len())
            .find(|i| self.is_eligible(*i))
            .unwrap_or_else(|| self.lowest_eligible())
    }
}

/// A track selection strategy.
///
/// Called inline on the playback control loop: implementations must not
/// block or perform I/O, and must be deterministic for identical inputs and
/// identical internal state.
pub trait SelectionPolicy: Send {
    /// Pick a candidate. `current` is `None` when choosing the starting track.
    ///
    /// The returned index should be eligible; anything else is corrected to
    /// the lowest eligible candidate by the selection.
    fn decide(
        &mut self,
        candidates: &Candidates<'_>,
        current: Option<usize>,
        telemetry: &Telemetry,
    ) -> Decision;

    /// Starting choice made when the selection is enabled.
    fn initial(&mut self, candidates: &Candidates<'_>, telemetry: &Telemetry) -> Decision {
        self.decide(candidates, None, telemetry)
    }

    /// Number of queued chunks to keep. The default never discards.
    fn evaluate_queue_size(
        &mut self,
        _candidates: &Candidates<'_>,
        _ctx: &QueueContext,
        queue: &[MediaChunk],
    ) -> usize {
        queue.len()
    }

    /// Clear per-session bookkeeping; called on every enable.
    fn reset(&mut self) {}
}

#[cfg(test)]
pub(crate) fn telemetry(buffered_duration_us: u64, now_ms: u64) -> Telemetry {
    Telemetry {
        playback_position_us: 0,
        buffered_duration_us,
        available_duration_us: None,
        playback_speed: 1.0,
        now_ms,
    }
}
