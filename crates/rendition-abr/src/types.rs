use std::{sync::Arc, time::Duration};

use crate::{Format, SelectionError, SelectionResult};

/// Why the current track is selected.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum SelectionReason {
    #[default]
    Unknown,
    /// Starting choice made when the selection was enabled.
    Initial,
    /// Pinned by the driver or the user.
    Manual,
    /// Changed by the adaptive policy in response to telemetry.
    Adaptive,
    /// Chosen for fast-forward/rewind playback.
    TrickPlay,
}

/// What drove an adaptive decision.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SwitchTrigger {
    Initial,
    UpSwitch,
    DownSwitch,
    /// The current track was blacklisted and had to be replaced.
    CurrentIneligible,
    MinInterval,
    NoEstimate,
    BufferTooLowForUpSwitch,
    InsufficientHeadroom,
    AlreadyOptimal,
    TrickPlay,
}

/// Diagnostics attached to an adaptive decision.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AdaptationDetail {
    pub trigger: SwitchTrigger,
    /// Raw estimate read from the bandwidth estimator.
    pub estimate_bps: Option<u64>,
    /// Estimate after the safety factor was applied.
    pub budget_bps: Option<u64>,
}

/// Optional payload describing the current selection decision.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SelectionData {
    Adaptation(AdaptationDetail),
    /// Driver-supplied label for fixed or manual selections.
    Tag(String),
}

/// Timing inputs of one `update_selected_track` tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Telemetry {
    pub playback_position_us: u64,
    pub buffered_duration_us: u64,
    /// `None` means media is available up to the end of the period.
    pub available_duration_us: Option<u64>,
    pub playback_speed: f32,
    /// Wall-clock time from the injected clock.
    pub now_ms: u64,
}

/// Inputs of one `evaluate_queue_size` call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QueueContext {
    pub playback_position_us: u64,
    pub playback_speed: f32,
    pub now_ms: u64,
}

/// A buffered chunk that has not been played yet.
#[derive(Clone, Debug)]
pub struct MediaChunk {
    /// Format the chunk was loaded in.
    pub format: Arc<Format>,
    pub start_time_us: u64,
    pub end_time_us: u64,
    pub chunk_index: u64,
}

impl MediaChunk {
    #[must_use]
    pub fn duration_us(&self) -> u64 {
        self.end_time_us.saturating_sub(self.start_time_us)
    }
}

/// Adaptive policy configuration.
#[derive(Clone)]
pub struct AdaptiveOptions {
    /// Fraction of the live-edge distance usable as the up-switch buffer
    /// requirement when availability is bounded.
    pub buffered_fraction_to_live_edge: f32,
    /// Selection index used when no bandwidth estimate exists yet.
    /// `None` starts on the lowest-bitrate candidate.
    pub initial_index: Option<usize>,
    /// Chunks are never discarded below this height.
    pub max_discard_height: u32,
    /// Chunks are never discarded below this width.
    pub max_discard_width: u32,
    /// Minimum buffered media required for an up-switch.
    pub min_buffer_for_up_switch: Duration,
    /// Buffered media that must stay in the queue when discarding.
    pub min_duration_to_retain_after_discard: Duration,
    /// Minimum interval between variant switches.
    pub min_switch_interval: Duration,
    /// Rate limit for queue re-evaluation.
    pub min_time_between_queue_evaluations: Duration,
    /// Safety factor for throughput estimation (e.g., 1.5 means use 66% of estimated throughput).
    pub throughput_safety_factor: f64,
    /// Playback speed at and above which trick-play selection applies.
    pub trick_play_speed: f32,
    /// Hysteresis ratio for up-switch (budget must exceed target by this factor).
    pub up_hysteresis_ratio: f64,
}

impl Default for AdaptiveOptions {
    fn default() -> Self {
        Self {
            buffered_fraction_to_live_edge: 0.75,
            initial_index: None,
            max_discard_height: 720,
            max_discard_width: 1280,
            min_buffer_for_up_switch: Duration::from_secs(10),
            min_duration_to_retain_after_discard: Duration::from_secs(25),
            min_switch_interval: Duration::ZERO,
            min_time_between_queue_evaluations: Duration::from_secs(2),
            throughput_safety_factor: 1.5,
            trick_play_speed: 4.0,
            up_hysteresis_ratio: 1.1,
        }
    }
}

impl std::fmt::Debug for AdaptiveOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveOptions")
            .field(
                "buffered_fraction_to_live_edge",
                &self.buffered_fraction_to_live_edge,
            )
            .field("initial_index", &self.initial_index)
            .field("max_discard_height", &self.max_discard_height)
            .field("max_discard_width", &self.max_discard_width)
            .field("min_buffer_for_up_switch", &self.min_buffer_for_up_switch)
            .field(
                "min_duration_to_retain_after_discard",
                &self.min_duration_to_retain_after_discard,
            )
            .field("min_switch_interval", &self.min_switch_interval)
            .field(
                "min_time_between_queue_evaluations",
                &self.min_time_between_queue_evaluations,
            )
            .field("throughput_safety_factor", &self.throughput_safety_factor)
            .field("trick_play_speed", &self.trick_play_speed)
            .field("up_hysteresis_ratio", &self.up_hysteresis_ratio)
            .finish()
    }
}

impl AdaptiveOptions {
    /// Reject option combinations the adaptive policy cannot work with.
    ///
    /// # Errors
    ///
    /// [`SelectionError::InvalidArgument`] naming the offending field.
    pub fn validate(&self) -> SelectionResult<()> {
        let invalid = |field: &str, value: String| {
            Err(SelectionError::InvalidArgument(format!(
                "adaptive option {field} is invalid: {value}"
            )))
        };

        if !self.throughput_safety_factor.is_finite() || self.throughput_safety_factor < 1.0 {
            return invalid(
                "throughput_safety_factor",
                self.throughput_safety_factor.to_string(),
            );
        }
        if !self.up_hysteresis_ratio.is_finite() || self.up_hysteresis_ratio < 1.0 {
            return invalid("up_hysteresis_ratio", self.up_hysteresis_ratio.to_string());
        }
        if !self.trick_play_speed.is_finite() || self.trick_play_speed <= 0.0 {
            return invalid("trick_play_speed", self.trick_play_speed.to_string());
        }
        let fraction = self.buffered_fraction_to_live_edge;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return invalid("buffered_fraction_to_live_edge", fraction.to_string());
        }
        Ok(())
    }

    /// Up-switch buffer requirement for the given availability.
    #[must_use]
    pub fn up_switch_buffer_us(&self, available_duration_us: Option<u64>) -> u64 {
        let required = duration_us(self.min_buffer_for_up_switch);
        match available_duration_us {
            None => required,
            Some(available) => {
                #[expect(
                    clippy::cast_precision_loss,
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss
                )]
                let near_live =
                    (available as f64 * f64::from(self.buffered_fraction_to_live_edge)) as u64;
                required.min(near_live)
            }
        }
    }
}

/// Microseconds in `d`, saturating at `u64::MAX`.
pub(crate) fn duration_us(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

/// Milliseconds in `d`, saturating at `u64::MAX`.
pub(crate) fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
