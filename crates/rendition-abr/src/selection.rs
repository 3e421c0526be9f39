use std::{cmp::Reverse, collections::HashSet, sync::Arc};

use crate::{
    Blacklist, Clock, EventBus, Format, MediaChunk, QueueContext, SelectionData, SelectionError,
    SelectionEvent, SelectionReason, SelectionResult, Telemetry, TrackGroup,
    policy::{Candidates, SelectionPolicy},
};

/// Lifecycle state of a [`TrackSelection`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Lifecycle {
    #[default]
    Created,
    Enabled,
    Disabled,
}

/// A static subset of a [`TrackGroup`] plus a varying selected track.
///
/// Candidates are exposed in decreasing-bitrate order: selection index 0 is
/// the highest bitrate. The selected track changes only through
/// [`update_selected_track`](Self::update_selected_track), which delegates the
/// choice to the configured [`SelectionPolicy`].
///
/// Structural accessors (`track_group`, `len`, `format`,
/// `index_in_track_group`, `index_of_*`) work in every lifecycle state. All
/// other queries and adaptation calls require the selection to be enabled
/// and return [`SelectionError::PreconditionViolation`] otherwise.
///
/// Blacklist timers run on the injected [`Clock`] and survive
/// `disable()`/`enable()` cycles.
pub struct TrackSelection {
    group: Arc<TrackGroup>,
    /// Selection index → track-group index.
    tracks: Vec<usize>,
    formats: Vec<Arc<Format>>,
    policy: Box<dyn SelectionPolicy>,
    clock: Arc<dyn Clock>,
    events: Option<EventBus>,
    blacklist: Blacklist,
    /// Scratch eligibility mask, refreshed before every policy call.
    eligible: Vec<bool>,
    state: Lifecycle,
    selected: usize,
    reason: SelectionReason,
    data: Option<SelectionData>,
    playback_speed: f32,
}

impl TrackSelection {
    /// Build a selection over `tracks` (track-group indices, any order).
    ///
    /// # Errors
    ///
    /// [`SelectionError::InvalidArgument`] if `tracks` is empty or holds
    /// duplicate or out-of-range indices.
    pub fn new(
        group: Arc<TrackGroup>,
        tracks: &[usize],
        policy: Box<dyn SelectionPolicy>,
        clock: Arc<dyn Clock>,
    ) -> SelectionResult<Self> {
        let tracks = ordered_candidates(&group, tracks)?;
        let formats: Vec<Arc<Format>> = tracks
            .iter()
            .filter_map(|t| group.get(*t).cloned())
            .collect();
        let length = tracks.len();

        Ok(Self {
            group,
            tracks,
            formats,
            policy,
            clock,
            events: None,
            blacklist: Blacklist::new(length),
            eligible: vec![true; length],
            state: Lifecycle::Created,
            selected: 0,
            reason: SelectionReason::Unknown,
            data: None,
            playback_speed: 1.0,
        })
    }

    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: SelectionEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }

    fn require_enabled(&self, what: &'static str) -> SelectionResult<()> {
        if self.state == Lifecycle::Enabled {
            Ok(())
        } else {
            Err(SelectionError::PreconditionViolation(what))
        }
    }

    fn check_index(&self, index: usize) -> SelectionResult<()> {
        if index < self.tracks.len() {
            Ok(())
        } else {
            Err(SelectionError::IndexOutOfRange {
                index,
                length: self.tracks.len(),
            })
        }
    }

    fn telemetry(
        &self,
        playback_position_us: u64,
        buffered_duration_us: u64,
        available_duration_us: Option<u64>,
        now_ms: u64,
    ) -> Telemetry {
        Telemetry {
            playback_position_us,
            buffered_duration_us,
            available_duration_us,
            playback_speed: self.playback_speed,
            now_ms,
        }
    }

    // Lifecycle.

    /// Start an active-use period and choose the starting track.
    ///
    /// Policy session state is reset; blacklist timers are kept.
    ///
    /// # Errors
    ///
    /// [`SelectionError::PreconditionViolation`] if already enabled.
    pub fn enable(&mut self) -> SelectionResult<()> {
        if self.state == Lifecycle::Enabled {
            return Err(SelectionError::PreconditionViolation(
                "enable() called on an enabled selection",
            ));
        }

        self.policy.reset();
        let now_ms = self.clock.now_ms();
        self.blacklist.refresh(now_ms, &mut self.eligible);
        let telemetry = self.telemetry(0, 0, None, now_ms);
        let candidates = Candidates::new(&self.formats, &self.eligible);
        let decision = self.policy.initial(&candidates, &telemetry);
        let index = corrected(&candidates, decision.index);

        self.selected = index;
        self.reason = decision.reason;
        self.data = decision.data;
        self.state = Lifecycle::Enabled;

        tracing::debug!(
            selected = index,
            reason = ?self.reason,
            length = self.tracks.len(),
            "track selection enabled"
        );
        self.emit(SelectionEvent::Enabled {
            selected: index,
            reason: self.reason,
        });
        Ok(())
    }

    /// End the active-use period.
    ///
    /// # Errors
    ///
    /// [`SelectionError::PreconditionViolation`] if not enabled.
    pub fn disable(&mut self) -> SelectionResult<()> {
        self.require_enabled("disable() called on a selection that is not enabled")?;
        self.state = Lifecycle::Disabled;
        tracing::debug!(selected = self.selected, "track selection disabled");
        self.emit(SelectionEvent::Disabled);
        Ok(())
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.state
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.state == Lifecycle::Enabled
    }

    // Static subset of selected tracks.

    #[must_use]
    pub fn track_group(&self) -> &Arc<TrackGroup> {
        &self.group
    }

    /// Number of candidates; constant for the lifetime of the selection.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Always `false`: construction rejects empty candidate sets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Format of the candidate at selection index `index`.
    ///
    /// # Errors
    ///
    /// [`SelectionError::IndexOutOfRange`] if `index >= len()`.
    pub fn format(&self, index: usize) -> SelectionResult<&Arc<Format>> {
        self.check_index(index)?;
        Ok(&self.formats[index])
    }

    /// Track-group index of the candidate at selection index `index`.
    ///
    /// # Errors
    ///
    /// [`SelectionError::IndexOutOfRange`] if `index >= len()`.
    pub fn index_in_track_group(&self, index: usize) -> SelectionResult<usize> {
        self.check_index(index)?;
        Ok(self.tracks[index])
    }

    /// Selection index of `format`, located by identity.
    ///
    /// `index_of_format(format(i)?) == Some(i)` even when several candidates
    /// carry equal metadata.
    #[must_use]
    pub fn index_of_format(&self, format: &Arc<Format>) -> Option<usize> {
        self.formats.iter().position(|f| Arc::ptr_eq(f, format))
    }

    /// Selection index of the candidate with the given track-group index.
    #[must_use]
    pub fn index_of_track(&self, index_in_track_group: usize) -> Option<usize> {
        self.tracks.iter().position(|t| *t == index_in_track_group)
    }

    // Individual selected track.

    /// # Errors
    ///
    /// [`SelectionError::PreconditionViolation`] if not enabled.
    pub fn selected_index(&self) -> SelectionResult<usize> {
        self.require_enabled("selected_index() requires an enabled selection")?;
        Ok(self.selected)
    }

    /// # Errors
    ///
    /// [`SelectionError::PreconditionViolation`] if not enabled.
    pub fn selected_format(&self) -> SelectionResult<&Arc<Format>> {
        self.require_enabled("selected_format() requires an enabled selection")?;
        Ok(&self.formats[self.selected])
    }

    /// # Errors
    ///
    /// [`SelectionError::PreconditionViolation`] if not enabled.
    pub fn selected_index_in_track_group(&self) -> SelectionResult<usize> {
        self.require_enabled("selected_index_in_track_group() requires an enabled selection")?;
        Ok(self.tracks[self.selected])
    }

    /// # Errors
    ///
    /// [`SelectionError::PreconditionViolation`] if not enabled.
    pub fn selection_reason(&self) -> SelectionResult<SelectionReason> {
        self.require_enabled("selection_reason() requires an enabled selection")?;
        Ok(self.reason)
    }

    /// # Errors
    ///
    /// [`SelectionError::PreconditionViolation`] if not enabled.
    pub fn selection_data(&self) -> SelectionResult<Option<&SelectionData>> {
        self.require_enabled("selection_data() requires an enabled selection")?;
        Ok(self.data.as_ref())
    }

    // Adaptation.

    /// Record the playback speed consulted by the next update.
    ///
    /// Never changes the selected track by itself.
    ///
    /// # Errors
    ///
    /// [`SelectionError::InvalidArgument`] unless `speed` is finite and positive.
    pub fn on_playback_speed(&mut self, speed: f32) -> SelectionResult<()> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(SelectionError::InvalidArgument(format!(
                "playback speed must be finite and positive, got {speed}"
            )));
        }
        self.playback_speed = speed;
        Ok(())
    }

    #[must_use]
    pub fn playback_speed(&self) -> f32 {
        self.playback_speed
    }

    /// Re-evaluate the selected track.
    ///
    /// `available_duration_us` is `None` when media can be buffered to the
    /// end of the period. Candidates whose blacklist timer has not expired on
    /// the clock are excluded. When the index changes, the reason becomes the
    /// policy's reason; otherwise the previous reason is kept unless the
    /// policy reports a non-adaptive reason (manual pin, trick-play).
    ///
    /// # Errors
    ///
    /// [`SelectionError::PreconditionViolation`] if not enabled.
    pub fn update_selected_track(
        &mut self,
        playback_position_us: u64,
        buffered_duration_us: u64,
        available_duration_us: Option<u64>,
    ) -> SelectionResult<()> {
        self.require_enabled("update_selected_track() requires an enabled selection")?;

        let now_ms = self.clock.now_ms();
        self.blacklist.refresh(now_ms, &mut self.eligible);
        let telemetry = self.telemetry(
            playback_position_us,
            buffered_duration_us,
            available_duration_us,
            now_ms,
        );
        let candidates = Candidates::new(&self.formats, &self.eligible);
        let decision = self
            .policy
            .decide(&candidates, Some(self.selected), &telemetry);
        let index = corrected(&candidates, decision.index);

        let previous = self.selected;
        if index != previous {
            self.selected = index;
            self.reason = decision.reason;
            tracing::debug!(
                from = previous,
                to = index,
                reason = ?self.reason,
                playback_position_us,
                buffered_duration_us,
                "selected track changed"
            );
            self.emit(SelectionEvent::TrackChanged {
                from: previous,
                to: index,
                reason: self.reason,
            });
        } else if decision.reason != SelectionReason::Adaptive
            || !matches!(self.reason, SelectionReason::Initial | SelectionReason::Adaptive)
        {
            // Initial and Adaptive survive an adaptive hold; anything else is stale.
            self.reason = decision.reason;
        }
        self.data = decision.data;
        Ok(())
    }

    /// Number of queued chunks the driver should keep.
    ///
    /// The driver discards the suffix beyond the returned count. An empty
    /// queue always yields 0; the result never exceeds `queue.len()`.
    ///
    /// # Errors
    ///
    /// [`SelectionError::PreconditionViolation`] if not enabled.
    pub fn evaluate_queue_size(
        &mut self,
        playback_position_us: u64,
        queue: &[MediaChunk],
    ) -> SelectionResult<usize> {
        self.require_enabled("evaluate_queue_size() requires an enabled selection")?;
        if queue.is_empty() {
            return Ok(0);
        }

        let now_ms = self.clock.now_ms();
        self.blacklist.refresh(now_ms, &mut self.eligible);
        let ctx = QueueContext {
            playback_position_us,
            playback_speed: self.playback_speed,
            now_ms,
        };
        let candidates = Candidates::new(&self.formats, &self.eligible);
        let retain = self
            .policy
            .evaluate_queue_size(&candidates, &ctx, queue)
            .min(queue.len());

        if retain < queue.len() {
            self.emit(SelectionEvent::QueueTrimmed {
                retain,
                queued: queue.len(),
            });
        }
        Ok(retain)
    }

    /// Exclude candidate `index` from selection for `duration_ms`.
    ///
    /// Returns `Ok(false)` without changing anything when the exclusion would
    /// leave no eligible candidate; the caller must then expect the failing
    /// track to keep being selected. Blacklisting the selected track does not
    /// deselect it until the next update.
    ///
    /// # Errors
    ///
    /// [`SelectionError::PreconditionViolation`] if not enabled,
    /// [`SelectionError::IndexOutOfRange`] if `index >= len()`.
    pub fn blacklist(&mut self, index: usize, duration_ms: u64) -> SelectionResult<bool> {
        self.require_enabled("blacklist() requires an enabled selection")?;
        self.check_index(index)?;

        let now_ms = self.clock.now_ms();
        if !self.blacklist.try_blacklist(index, duration_ms, now_ms) {
            tracing::warn!(
                index,
                duration_ms,
                "blacklist refused: no other eligible track"
            );
            self.emit(SelectionEvent::BlacklistRefused { index });
            return Ok(false);
        }

        let until_ms = self
            .blacklist
            .blacklisted_until(index, now_ms)
            .unwrap_or(now_ms);
        tracing::debug!(index, duration_ms, until_ms, "track blacklisted");
        self.emit(SelectionEvent::Blacklisted { index, until_ms });
        Ok(true)
    }

    /// Whether candidate `index` is currently excluded.
    ///
    /// Valid in every lifecycle state, like the timers themselves.
    ///
    /// # Errors
    ///
    /// [`SelectionError::IndexOutOfRange`] if `index >= len()`.
    pub fn is_blacklisted(&self, index: usize) -> SelectionResult<bool> {
        self.check_index(index)?;
        Ok(self.blacklist.is_blacklisted(index, self.clock.now_ms()))
    }

    /// Number of candidates not currently blacklisted (never zero).
    #[must_use]
    pub fn eligible_count(&self) -> usize {
        self.blacklist.eligible_count(self.clock.now_ms())
    }
}

impl std::fmt::Debug for TrackSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackSelection")
            .field("tracks", &self.tracks)
            .field("state", &self.state)
            .field("selected", &self.selected)
            .field("reason", &self.reason)
            .field("playback_speed", &self.playback_speed)
            .field("blacklist", &self.blacklist)
            .finish_non_exhaustive()
    }
}

/// Validate `tracks` and order them by strictly decreasing bitrate, ties in
/// input order.
pub(crate) fn ordered_candidates(group: &TrackGroup, tracks: &[usize]) -> SelectionResult<Vec<usize>> {
    if tracks.is_empty() {
        return Err(SelectionError::InvalidArgument(
            "at least one track index is required".into(),
        ));
    }

    let mut seen = HashSet::with_capacity(tracks.len());
    for &track in tracks {
        if track >= group.len() {
            return Err(SelectionError::InvalidArgument(format!(
                "track index {track} out of range for group of {}",
                group.len()
            )));
        }
        if !seen.insert(track) {
            return Err(SelectionError::InvalidArgument(format!(
                "duplicate track index {track}"
            )));
        }
    }

    let mut ordered = tracks.to_vec();
    // stable sort keeps input order among equal bitrates
    ordered.sort_by_key(|t| Reverse(group.get(*t).map_or(0, |f| f.bitrate_or_zero())));
    Ok(ordered)
}

/// Replace an out-of-range or ineligible policy choice with the lowest
/// eligible candidate.
fn corrected(candidates: &Candidates<'_>, index: usize) -> usize {
    if candidates.is_eligible(index) {
        return index;
    }
    let fallback = candidates.lowest_eligible();
    tracing::warn!(index, fallback, "policy chose an ineligible track");
    fallback
}
