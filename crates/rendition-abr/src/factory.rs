use std::sync::Arc;

use crate::{
    AdaptiveOptions, BandwidthEstimator, Clock, EventBus, SelectionData, SelectionError,
    SelectionReason, SelectionResult, SystemClock, TrackGroup, TrackSelection,
    policy::{AdaptivePolicy, FixedPolicy, ManualPolicy, RandomPolicy},
    selection::ordered_candidates,
};

/// Creates [`TrackSelection`]s for a track group.
///
/// The returned selection is in the created state: call
/// [`TrackSelection::enable`] before querying the selected track.
pub trait TrackSelectionFactory: Send + Sync {
    /// Build a selection over `tracks` (track-group indices, any order).
    ///
    /// # Errors
    ///
    /// [`SelectionError::InvalidArgument`] if `tracks` is empty, contains
    /// duplicate or out-of-range indices, or does not suit the factory.
    fn create(
        &self,
        group: Arc<TrackGroup>,
        estimator: Arc<dyn BandwidthEstimator>,
        tracks: &[usize],
    ) -> SelectionResult<TrackSelection>;
}

/// Settings shared by every factory.
#[derive(Clone)]
struct Wiring {
    clock: Arc<dyn Clock>,
    events: Option<EventBus>,
}

impl Wiring {
    fn finish(&self, selection: TrackSelection) -> TrackSelection {
        match &self.events {
            Some(events) => selection.with_events(events.clone()),
            None => selection,
        }
    }
}

impl Default for Wiring {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock::new()),
            events: None,
        }
    }
}

impl std::fmt::Debug for Wiring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wiring")
            .field("events", &self.events.is_some())
            .finish_non_exhaustive()
    }
}

macro_rules! wiring_builders {
    ($ty:ty) => {
        impl $ty {
            /// Clock used for blacklist timers and policy rate limits.
            #[must_use]
            pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
                self.wiring.clock = clock;
                self
            }

            /// Bus that created selections publish their events to.
            #[must_use]
            pub fn with_events(mut self, events: EventBus) -> Self {
                self.wiring.events = Some(events);
                self
            }
        }
    };
}

/// Single-track selections.
#[derive(Clone, Debug, Default)]
pub struct FixedSelectionFactory {
    reason: SelectionReason,
    data: Option<SelectionData>,
    wiring: Wiring,
}

impl FixedSelectionFactory {
    /// Selections report `reason` and carry `data` for their whole life.
    #[must_use]
    pub fn new(reason: SelectionReason, data: Option<SelectionData>) -> Self {
        Self {
            reason,
            data,
            wiring: Wiring::default(),
        }
    }
}

wiring_builders!(FixedSelectionFactory);

impl TrackSelectionFactory for FixedSelectionFactory {
    fn create(
        &self,
        group: Arc<TrackGroup>,
        _estimator: Arc<dyn BandwidthEstimator>,
        tracks: &[usize],
    ) -> SelectionResult<TrackSelection> {
        if tracks.len() != 1 {
            return Err(SelectionError::InvalidArgument(format!(
                "fixed selection needs exactly one track, got {}",
                tracks.len()
            )));
        }
        let policy = FixedPolicy::new(0, self.reason, self.data.clone());
        let selection =
            TrackSelection::new(group, tracks, Box::new(policy), self.wiring.clock.clone())?;
        Ok(self.wiring.finish(selection))
    }
}

/// Selections pinned to one track-group index chosen by the driver.
#[derive(Clone, Debug)]
pub struct ManualSelectionFactory {
    track: usize,
    data: Option<SelectionData>,
    wiring: Wiring,
}

impl ManualSelectionFactory {
    /// Pin `track` (a track-group index) in every created selection.
    #[must_use]
    pub fn new(track: usize, data: Option<SelectionData>) -> Self {
        Self {
            track,
            data,
            wiring: Wiring::default(),
        }
    }
}

wiring_builders!(ManualSelectionFactory);

impl TrackSelectionFactory for ManualSelectionFactory {
    fn create(
        &self,
        group: Arc<TrackGroup>,
        _estimator: Arc<dyn BandwidthEstimator>,
        tracks: &[usize],
    ) -> SelectionResult<TrackSelection> {
        let ordered = ordered_candidates(&group, tracks)?;
        let pinned = ordered
            .iter()
            .position(|t| *t == self.track)
            .ok_or_else(|| {
                SelectionError::InvalidArgument(format!(
                    "pinned track {} is not among the candidates",
                    self.track
                ))
            })?;
        let policy = ManualPolicy::new(pinned, self.data.clone());
        let selection =
            TrackSelection::new(group, tracks, Box::new(policy), self.wiring.clock.clone())?;
        Ok(self.wiring.finish(selection))
    }
}

/// Throughput- and buffer-driven selections.
///
/// Each selection gets its own [`AdaptivePolicy`] over the shared estimator.
#[derive(Clone, Debug, Default)]
pub struct AdaptiveSelectionFactory {
    options: AdaptiveOptions,
    wiring: Wiring,
}

impl AdaptiveSelectionFactory {
    #[must_use]
    pub fn new(options: AdaptiveOptions) -> Self {
        Self {
            options,
            wiring: Wiring::default(),
        }
    }

    #[must_use]
    pub fn options(&self) -> &AdaptiveOptions {
        &self.options
    }
}

wiring_builders!(AdaptiveSelectionFactory);

impl TrackSelectionFactory for AdaptiveSelectionFactory {
    fn create(
        &self,
        group: Arc<TrackGroup>,
        estimator: Arc<dyn BandwidthEstimator>,
        tracks: &[usize],
    ) -> SelectionResult<TrackSelection> {
        self.options.validate()?;
        let policy = AdaptivePolicy::new(self.options.clone(), estimator);
        let selection =
            TrackSelection::new(group, tracks, Box::new(policy), self.wiring.clock.clone())?;
        Ok(self.wiring.finish(selection))
    }
}

/// Selections that switch to a random eligible track on every update.
#[derive(Clone, Debug, Default)]
pub struct RandomSelectionFactory {
    seed: u64,
    wiring: Wiring,
}

impl RandomSelectionFactory {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            wiring: Wiring::default(),
        }
    }
}

wiring_builders!(RandomSelectionFactory);

impl TrackSelectionFactory for RandomSelectionFactory {
    fn create(
        &self,
        group: Arc<TrackGroup>,
        _estimator: Arc<dyn BandwidthEstimator>,
        tracks: &[usize],
    ) -> SelectionResult<TrackSelection> {
        let selection = TrackSelection::new(
            group,
            tracks,
            Box::new(RandomPolicy::new(self.seed)),
            self.wiring.clock.clone(),
        )?;
        Ok(self.wiring.finish(selection))
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{Format, ManualClock, SelectionEvent, ThroughputMeter};

    #[fixture]
    fn group() -> Arc<TrackGroup> {
        Arc::new(
            TrackGroup::new([
                Format::new(200_000),
                Format::new(3_000_000),
                Format::new(800_000),
            ])
            .unwrap(),
        )
    }

    fn estimator(bps: u64) -> Arc<dyn BandwidthEstimator> {
        Arc::new(ThroughputMeter::new().with_initial_estimate(bps))
    }

    #[rstest]
    fn fixed_factory_requires_one_track(group: Arc<TrackGroup>) {
        let factory = FixedSelectionFactory::new(SelectionReason::Initial, None);
        let err = factory
            .create(group.clone(), estimator(1), &[0, 1])
            .unwrap_err();
        assert!(matches!(err, SelectionError::InvalidArgument(_)));

        let mut s = factory.create(group, estimator(1), &[2]).unwrap();
        s.enable().unwrap();
        assert_eq!(s.selected_index_in_track_group().unwrap(), 2);
        assert_eq!(s.selection_reason().unwrap(), SelectionReason::Initial);
    }

    #[rstest]
    fn fixed_factory_carries_data(group: Arc<TrackGroup>) {
        let data = SelectionData::Tag("trick".into());
        let factory = FixedSelectionFactory::new(SelectionReason::TrickPlay, Some(data.clone()));
        let mut s = factory.create(group, estimator(1), &[1]).unwrap();
        s.enable().unwrap();
        s.update_selected_track(0, 0, None).unwrap();
        assert_eq!(s.selection_data().unwrap(), Some(&data));
        assert_eq!(s.selection_reason().unwrap(), SelectionReason::TrickPlay);
    }

    #[rstest]
    fn manual_factory_pins_track_group_index(group: Arc<TrackGroup>) {
        let factory = ManualSelectionFactory::new(2, None);
        let mut s = factory.create(group.clone(), estimator(1), &[0, 1, 2]).unwrap();
        s.enable().unwrap();
        assert_eq!(s.selected_index().unwrap(), 1);
        assert_eq!(s.selected_index_in_track_group().unwrap(), 2);
        assert_eq!(s.selection_reason().unwrap(), SelectionReason::Manual);

        let err = factory.create(group, estimator(1), &[0, 1]).unwrap_err();
        assert!(matches!(err, SelectionError::InvalidArgument(_)));
    }

    #[rstest]
    fn adaptive_factory_rejects_invalid_options(group: Arc<TrackGroup>) {
        let factory = AdaptiveSelectionFactory::new(AdaptiveOptions {
            throughput_safety_factor: 0.0,
            ..AdaptiveOptions::default()
        });
        assert!(matches!(
            factory.create(group, estimator(1), &[0, 1, 2]),
            Err(SelectionError::InvalidArgument(_))
        ));
    }

    #[rstest]
    fn factories_reject_bad_track_lists(group: Arc<TrackGroup>) {
        let factories: Vec<Box<dyn TrackSelectionFactory>> = vec![
            Box::new(AdaptiveSelectionFactory::default()),
            Box::new(RandomSelectionFactory::new(7)),
            Box::new(ManualSelectionFactory::new(0, None)),
        ];
        for factory in factories {
            for tracks in [&[][..], &[0, 0][..], &[0, 3][..]] {
                assert!(matches!(
                    factory.create(group.clone(), estimator(1), tracks),
                    Err(SelectionError::InvalidArgument(_))
                ));
            }
        }
    }

    #[rstest]
    fn factory_wires_clock_and_events(group: Arc<TrackGroup>) {
        let clock = ManualClock::new(10_000);
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let factory = RandomSelectionFactory::new(3)
            .with_clock(Arc::new(clock.clone()))
            .with_events(bus);

        let mut s = factory.create(group, estimator(1), &[0, 1, 2]).unwrap();
        s.enable().unwrap();
        assert!(s.blacklist(0, 500).unwrap());

        let events: Vec<SelectionEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(matches!(events[0], SelectionEvent::Enabled { .. }));
        assert_eq!(
            events[1],
            SelectionEvent::Blacklisted {
                index: 0,
                until_ms: 10_500
            }
        );
    }
}
