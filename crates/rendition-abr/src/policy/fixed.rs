use super::{Candidates, Decision, SelectionPolicy};
use crate::{SelectionData, SelectionReason, Telemetry};

/// Always selects the same candidate.
///
/// Used for single-track selections. If the pinned candidate is ever
/// ineligible the nearest lower-bitrate eligible one is used instead.
#[derive(Clone, Debug)]
pub struct FixedPolicy {
    index: usize,
    reason: SelectionReason,
    data: Option<SelectionData>,
}

impl FixedPolicy {
    #[must_use]
    pub fn new(index: usize, reason: SelectionReason, data: Option<SelectionData>) -> Self {
        Self {
            index,
            reason,
            data,
        }
    }
}

impl SelectionPolicy for FixedPolicy {
    fn decide(
        &mut self,
        candidates: &Candidates<'_>,
        _current: Option<usize>,
        _telemetry: &Telemetry,
    ) -> Decision {
        Decision::new(candidates.nearest_eligible(self.index), self.reason)
            .with_data(self.data.clone())
    }
}

/// Selection pinned by the driver (e.g., a user-chosen quality).
///
/// Unlike [`FixedPolicy`] the candidate set may hold several tracks, so a
/// blacklisted pin degrades to the next lower-bitrate eligible track and
/// returns to the pin once it expires.
#[derive(Clone, Debug)]
pub struct ManualPolicy {
    index: usize,
    data: Option<SelectionData>,
}

impl ManualPolicy {
    #[must_use]
    pub fn new(index: usize, data: Option<SelectionData>) -> Self {
        Self { index, data }
    }

    /// Selection index of the pinned track.
    #[must_use]
    pub fn pinned(&self) -> usize {
        self.index
    }
}

impl SelectionPolicy for ManualPolicy {
    fn decide(
        &mut self,
        candidates: &Candidates<'_>,
        _current: Option<usize>,
        _telemetry: &Telemetry,
    ) -> Decision {
        let index = candidates.nearest_eligible(self.index);
        if index != self.index {
            tracing::debug!(
                pinned = self.index,
                index,
                "manual selection: pinned track ineligible"
            );
        }
        Decision::new(index, SelectionReason::Manual).with_data(self.data.clone())
    }
}
