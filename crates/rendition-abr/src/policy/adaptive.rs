use std::sync::Arc;

use super::{Candidates, Decision, SelectionPolicy};
use crate::{
    AdaptationDetail, AdaptiveOptions, BandwidthEstimator, MediaChunk, QueueContext,
    SelectionData, SelectionReason, SwitchTrigger, Telemetry,
    types::{duration_ms, duration_us},
};

/// Throughput- and buffer-driven selection.
///
/// The budget is the bandwidth estimate divided by the safety factor. The
/// ideal track is the highest eligible one whose speed-scaled bitrate fits
/// the budget, or the lowest eligible one when nothing fits. Up-switches are
/// gated on buffer level, hysteresis, and the minimum switch interval;
/// down-switches happen immediately because the current track no longer
/// fits.
pub struct AdaptivePolicy {
    options: AdaptiveOptions,
    estimator: Arc<dyn BandwidthEstimator>,
    /// Clock time of the last adaptive switch, `None` if none this session.
    last_switch_ms: Option<u64>,
    last_queue_evaluation_ms: Option<u64>,
}

impl AdaptivePolicy {
    #[must_use]
    pub fn new(options: AdaptiveOptions, estimator: Arc<dyn BandwidthEstimator>) -> Self {
        Self {
            options,
            estimator,
            last_switch_ms: None,
            last_queue_evaluation_ms: None,
        }
    }

    #[must_use]
    pub fn options(&self) -> &AdaptiveOptions {
        &self.options
    }

    fn budget_bps(&self, estimate_bps: u64) -> f64 {
        let factor = if self.options.throughput_safety_factor > 0.0 {
            self.options.throughput_safety_factor
        } else {
            1.0
        };
        #[expect(clippy::cast_precision_loss)] // bitrate precision loss is negligible for ABR
        let adjusted = estimate_bps as f64 / factor;
        adjusted.max(0.0)
    }

    /// Best eligible candidate not exceeding the budget, otherwise the lowest.
    fn ideal_index(candidates: &Candidates<'_>, budget_bps: f64, speed: f32) -> usize {
        let speed = f64::from(speed);
        #[expect(clippy::cast_precision_loss)] // bitrate precision loss is negligible for ABR
        let best_under = candidates
            .eligible()
            .find(|(_, f)| f.bitrate_or_zero() as f64 * speed <= budget_bps);
        best_under.map_or_else(|| candidates.lowest_eligible(), |(i, _)| i)
    }

    /// Highest eligible candidate above `current_bw` that clears the
    /// up-switch hysteresis.
    fn best_with_headroom(
        &self,
        candidates: &Candidates<'_>,
        current_bw: u64,
        budget_bps: f64,
        speed: f32,
    ) -> Option<usize> {
        let factor = f64::from(speed) * self.options.up_hysteresis_ratio;
        #[expect(clippy::cast_precision_loss)] // bitrate precision loss is negligible for ABR
        let found = candidates
            .eligible()
            .filter(|(_, f)| f.bitrate_or_zero() > current_bw)
            .find(|(_, f)| f.bitrate_or_zero() as f64 * factor <= budget_bps)
            .map(|(i, _)| i);
        found
    }

    fn is_trick_play(&self, speed: f32) -> bool {
        speed >= self.options.trick_play_speed
    }

    fn can_switch_now(&self, now_ms: u64) -> bool {
        let interval = duration_ms(self.options.min_switch_interval);
        self.last_switch_ms
            .is_none_or(|t| now_ms.saturating_sub(t) >= interval)
    }

    fn record_switch(&mut self, now_ms: u64) {
        self.last_switch_ms = Some(now_ms);
    }
}

impl SelectionPolicy for AdaptivePolicy {
    #[expect(
        clippy::cognitive_complexity,
        clippy::too_many_lines,
        reason = "ABR decision logic with multiple branches"
    )]
    fn decide(
        &mut self,
        candidates: &Candidates<'_>,
        current: Option<usize>,
        telemetry: &Telemetry,
    ) -> Decision {
        let now_ms = telemetry.now_ms;
        let speed = telemetry.playback_speed;
        let estimate_bps = self.estimator.bitrate_estimate();
        let budget = estimate_bps.map(|e| self.budget_bps(e));
        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let budget_bps = budget.map(|b| b as u64);
        let detail = |trigger| {
            Some(SelectionData::Adaptation(AdaptationDetail {
                trigger,
                estimate_bps,
                budget_bps,
            }))
        };

        if self.is_trick_play(speed) {
            let index = candidates.lowest_eligible();
            tracing::debug!(index, speed, "ABR decide: trick-play");
            return Decision::new(index, SelectionReason::TrickPlay)
                .with_data(detail(SwitchTrigger::TrickPlay));
        }

        let Some(current) = current else {
            let index = match budget {
                Some(budget) => Self::ideal_index(candidates, budget, speed),
                None => self.options.initial_index.map_or_else(
                    || candidates.lowest_eligible(),
                    |i| candidates.nearest_eligible(i.min(candidates.len().saturating_sub(1))),
                ),
            };
            tracing::debug!(index, ?estimate_bps, "ABR decide: initial");
            return Decision::new(index, SelectionReason::Initial)
                .with_data(detail(SwitchTrigger::Initial));
        };

        let current_eligible = candidates.is_eligible(current);

        let Some(budget) = budget else {
            if current_eligible {
                tracing::debug!(current, "ABR decide: NoEstimate");
                return Decision::new(current, SelectionReason::Adaptive)
                    .with_data(detail(SwitchTrigger::NoEstimate));
            }
            let index = candidates.lowest_eligible();
            self.record_switch(now_ms);
            tracing::debug!(current, index, "ABR decide: current ineligible, no estimate");
            return Decision::new(index, SelectionReason::Adaptive)
                .with_data(detail(SwitchTrigger::CurrentIneligible));
        };

        let ideal = Self::ideal_index(candidates, budget, speed);
        let current_bw = candidates.bitrate(current);
        let ideal_bw = candidates.bitrate(ideal);

        tracing::debug!(
            current,
            current_bw,
            current_eligible,
            ideal,
            ideal_bw,
            ?estimate_bps,
            budget,
            speed,
            buffered_us = telemetry.buffered_duration_us,
            "ABR decide: evaluating"
        );

        if !current_eligible {
            self.record_switch(now_ms);
            return Decision::new(ideal, SelectionReason::Adaptive)
                .with_data(detail(SwitchTrigger::CurrentIneligible));
        }

        // Up-switch path
        if ideal_bw > current_bw {
            if !self.can_switch_now(now_ms) {
                tracing::debug!(current, ideal, "ABR decide: MinInterval not elapsed");
                return Decision::new(current, SelectionReason::Adaptive)
                    .with_data(detail(SwitchTrigger::MinInterval));
            }

            let required_buffer_us = self
                .options
                .up_switch_buffer_us(telemetry.available_duration_us);
            let buffer_ok =
                required_buffer_us == 0 || telemetry.buffered_duration_us >= required_buffer_us;
            #[expect(clippy::cast_precision_loss)] // bitrate precision loss is negligible for ABR
            let required_bps = ideal_bw as f64 * f64::from(speed) * self.options.up_hysteresis_ratio;
            let headroom_ok = budget >= required_bps;
            tracing::debug!(
                buffer_ok,
                headroom_ok,
                required_buffer_us,
                required_bps,
                "ABR decide: up-switch check"
            );

            if !buffer_ok {
                return Decision::new(current, SelectionReason::Adaptive)
                    .with_data(detail(SwitchTrigger::BufferTooLowForUpSwitch));
            }
            let target = if headroom_ok {
                Some(ideal)
            } else {
                self.best_with_headroom(candidates, current_bw, budget, speed)
            };
            let Some(target) = target else {
                return Decision::new(current, SelectionReason::Adaptive)
                    .with_data(detail(SwitchTrigger::InsufficientHeadroom));
            };
            self.record_switch(now_ms);
            return Decision::new(target, SelectionReason::Adaptive)
                .with_data(detail(SwitchTrigger::UpSwitch));
        }

        // Down-switch path: the current track no longer fits the budget.
        if ideal_bw < current_bw {
            self.record_switch(now_ms);
            return Decision::new(ideal, SelectionReason::Adaptive)
                .with_data(detail(SwitchTrigger::DownSwitch));
        }

        Decision::new(current, SelectionReason::Adaptive)
            .with_data(detail(SwitchTrigger::AlreadyOptimal))
    }

    fn evaluate_queue_size(
        &mut self,
        candidates: &Candidates<'_>,
        ctx: &QueueContext,
        queue: &[MediaChunk],
    ) -> usize {
        let Some(last) = queue.last() else {
            return 0;
        };
        if self.is_trick_play(ctx.playback_speed) {
            return queue.len();
        }

        let interval = duration_ms(self.options.min_time_between_queue_evaluations);
        if self
            .last_queue_evaluation_ms
            .is_some_and(|t| ctx.now_ms.saturating_sub(t) < interval)
        {
            return queue.len();
        }
        self.last_queue_evaluation_ms = Some(ctx.now_ms);

        let speed = f64::from(ctx.playback_speed.max(f32::MIN_POSITIVE));
        let position = ctx.playback_position_us;
        #[expect(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let playout_us = |start_us: u64| (start_us.saturating_sub(position) as f64 / speed) as u64;
        let min_retain_us = duration_us(self.options.min_duration_to_retain_after_discard);

        if playout_us(last.start_time_us) < min_retain_us {
            return queue.len();
        }

        let Some(estimate_bps) = self.estimator.bitrate_estimate() else {
            return queue.len();
        };
        let ideal_index =
            Self::ideal_index(candidates, self.budget_bps(estimate_bps), ctx.playback_speed);
        let Some(ideal) = candidates.format(ideal_index) else {
            return queue.len();
        };
        let Some(ideal_height) = ideal.height else {
            return queue.len();
        };

        for (i, chunk) in queue.iter().enumerate() {
            if playout_us(chunk.start_time_us) < min_retain_us {
                continue;
            }
            let format = &chunk.format;
            let worse = format.bitrate_or_zero() < ideal.bitrate_or_zero()
                && format.height.is_some_and(|h| {
                    h < ideal_height && h < self.options.max_discard_height
                })
                && format.width.is_some_and(|w| w < self.options.max_discard_width);
            if worse {
                tracing::debug!(
                    retain = i,
                    queued = queue.len(),
                    ideal_index,
                    chunk_index = chunk.chunk_index,
                    "ABR queue: discarding low-quality tail"
                );
                return i;
            }
        }
        queue.len()
    }

    fn reset(&mut self) {
        self.last_switch_ms = None;
        self.last_queue_evaluation_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicU64, Ordering},
        time::Duration,
    };

    use rstest::rstest;
    use unimock::{MockFn, Unimock, matching};

    use super::{super::telemetry, *};
    use crate::{BandwidthEstimatorMock, Format};

    /// Estimator whose value the test can change between ticks.
    #[derive(Default)]
    struct StepEstimator(AtomicU64);

    impl StepEstimator {
        fn set(&self, bps: u64) {
            self.0.store(bps, Ordering::Relaxed);
        }
    }

    impl BandwidthEstimator for StepEstimator {
        fn bitrate_estimate(&self) -> Option<u64> {
            Some(self.0.load(Ordering::Relaxed)).filter(|b| *b > 0)
        }
    }

    fn formats() -> Vec<Arc<Format>> {
        vec![
            Arc::new(Format::new(3_000_000).with_size(1920, 1080)),
            Arc::new(Format::new(800_000).with_size(960, 540)),
            Arc::new(Format::new(200_000).with_size(480, 270)),
        ]
    }

    fn options() -> AdaptiveOptions {
        AdaptiveOptions {
            min_buffer_for_up_switch: Duration::from_secs(10),
            min_switch_interval: Duration::ZERO,
            throughput_safety_factor: 1.5,
            up_hysteresis_ratio: 1.1,
            ..AdaptiveOptions::default()
        }
    }

    fn policy_with(bps: u64, opts: AdaptiveOptions) -> (AdaptivePolicy, Arc<StepEstimator>) {
        let estimator = Arc::new(StepEstimator::default());
        estimator.set(bps);
        (AdaptivePolicy::new(opts, estimator.clone()), estimator)
    }

    const FULL_BUFFER_US: u64 = 30_000_000;

    #[rstest]
    #[case("nothing_fits", 100_000, 2)]
    #[case("low", 500_000, 2)]
    #[case("medium", 1_500_000, 1)]
    #[case("high", 5_000_000, 0)]
    fn initial_picks_best_under_budget(
        #[case] _name: &str,
        #[case] bps: u64,
        #[case] expected: usize,
    ) {
        let formats = formats();
        let mask = vec![true; 3];
        let (mut policy, _) = policy_with(bps, options());

        let d = policy.initial(&Candidates::new(&formats, &mask), &telemetry(0, 0));
        assert_eq!(d.index, expected);
        assert_eq!(d.reason, SelectionReason::Initial);
    }

    #[rstest]
    #[case(None, 2)]
    #[case(Some(0), 0)]
    #[case(Some(7), 2)]
    fn initial_without_estimate(#[case] initial_index: Option<usize>, #[case] expected: usize) {
        let formats = formats();
        let mask = vec![true; 3];
        let (mut policy, _) = policy_with(
            0,
            AdaptiveOptions {
                initial_index,
                ..options()
            },
        );

        let d = policy.initial(&Candidates::new(&formats, &mask), &telemetry(0, 0));
        assert_eq!(d.index, expected);
    }

    #[test]
    fn upswitch_requires_buffer() {
        let formats = formats();
        let mask = vec![true; 3];
        let c = Candidates::new(&formats, &mask);
        let (mut policy, _) = policy_with(5_000_000, options());

        let low_buf = policy.decide(&c, Some(2), &telemetry(2_000_000, 0));
        assert_eq!(low_buf.index, 2);
        assert!(matches!(
            low_buf.data,
            Some(SelectionData::Adaptation(AdaptationDetail {
                trigger: SwitchTrigger::BufferTooLowForUpSwitch,
                ..
            }))
        ));

        let ok_buf = policy.decide(&c, Some(2), &telemetry(FULL_BUFFER_US, 0));
        assert_eq!(ok_buf.index, 0);
        assert_eq!(ok_buf.reason, SelectionReason::Adaptive);
    }

    #[test]
    fn upswitch_buffer_requirement_shrinks_near_live_edge() {
        let formats = formats();
        let mask = vec![true; 3];
        let c = Candidates::new(&formats, &mask);
        let (mut policy, _) = policy_with(5_000_000, options());

        let near_live = Telemetry {
            available_duration_us: Some(4_000_000),
            ..telemetry(3_000_000, 0)
        };
        let d = policy.decide(&c, Some(2), &near_live);
        assert_eq!(d.index, 0);
    }

    #[rstest]
    #[case(4_900_000, 1, SwitchTrigger::InsufficientHeadroom)]
    #[case(5_000_000, 0, SwitchTrigger::UpSwitch)]
    fn up_switch_hysteresis_boundary(
        #[case] bps: u64,
        #[case] expected: usize,
        #[case] trigger: SwitchTrigger,
    ) {
        let formats = formats();
        let mask = vec![true; 3];
        let (mut policy, _) = policy_with(bps, options());

        let d = policy.decide(
            &Candidates::new(&formats, &mask),
            Some(1),
            &telemetry(FULL_BUFFER_US, 0),
        );
        assert_eq!(d.index, expected);
        assert!(matches!(
            d.data,
            Some(SelectionData::Adaptation(AdaptationDetail { trigger: t, .. })) if t == trigger
        ));
    }

    #[rstest]
    #[case(4_600_000, 1)]
    #[case(1_000_000, 2)]
    fn up_switch_settles_on_highest_track_with_headroom(
        #[case] bps: u64,
        #[case] expected: usize,
    ) {
        let formats = formats();
        let mask = vec![true; 3];
        let c = Candidates::new(&formats, &mask);
        let (mut policy, _) = policy_with(bps, options());

        let d = policy.decide(&c, Some(2), &telemetry(FULL_BUFFER_US, 0));
        assert_eq!(d.index, expected);

        // the next tick from the new track holds
        let again = policy.decide(&c, Some(d.index), &telemetry(FULL_BUFFER_US, 0));
        assert_eq!(again.index, expected);
    }

    #[test]
    fn downswitch_is_immediate_even_with_full_buffer() {
        let formats = formats();
        let mask = vec![true; 3];
        let (mut policy, _) = policy_with(
            500_000,
            AdaptiveOptions {
                min_switch_interval: Duration::from_secs(30),
                ..options()
            },
        );

        let d = policy.decide(
            &Candidates::new(&formats, &mask),
            Some(0),
            &telemetry(FULL_BUFFER_US, 0),
        );
        assert_eq!(d.index, 2);
        assert!(matches!(
            d.data,
            Some(SelectionData::Adaptation(AdaptationDetail {
                trigger: SwitchTrigger::DownSwitch,
                estimate_bps: Some(500_000),
                budget_bps: Some(333_333),
            }))
        ));
    }

    #[test]
    fn min_switch_interval_prevents_oscillation() {
        let formats = formats();
        let mask = vec![true; 3];
        let c = Candidates::new(&formats, &mask);
        let (mut policy, estimator) = policy_with(
            500_000,
            AdaptiveOptions {
                min_switch_interval: Duration::from_secs(30),
                ..options()
            },
        );

        let down = policy.decide(&c, Some(1), &telemetry(FULL_BUFFER_US, 1_000));
        assert_eq!(down.index, 2);

        estimator.set(5_000_000);
        let held = policy.decide(&c, Some(2), &telemetry(FULL_BUFFER_US, 10_000));
        assert_eq!(held.index, 2);
        assert!(matches!(
            held.data,
            Some(SelectionData::Adaptation(AdaptationDetail {
                trigger: SwitchTrigger::MinInterval,
                ..
            }))
        ));

        let up = policy.decide(&c, Some(2), &telemetry(FULL_BUFFER_US, 31_000));
        assert_eq!(up.index, 0);

        policy.reset();
        estimator.set(500_000);
        let _ = policy.decide(&c, Some(0), &telemetry(FULL_BUFFER_US, 31_500));
        estimator.set(5_000_000);
        let blocked_again = policy.decide(&c, Some(2), &telemetry(FULL_BUFFER_US, 32_000));
        assert_eq!(blocked_again.index, 2);
    }

    #[test]
    fn ineligible_current_is_replaced_by_best_eligible() {
        let formats = formats();
        let mask = vec![false, true, true];
        let (mut policy, _) = policy_with(5_000_000, options());

        let d = policy.decide(
            &Candidates::new(&formats, &mask),
            Some(0),
            &telemetry(0, 0),
        );
        assert_eq!(d.index, 1);
        assert!(matches!(
            d.data,
            Some(SelectionData::Adaptation(AdaptationDetail {
                trigger: SwitchTrigger::CurrentIneligible,
                ..
            }))
        ));
    }

    #[test]
    fn no_estimate_keeps_current_or_falls_to_lowest() {
        let formats = formats();
        let (mut policy, _) = policy_with(0, options());

        let open = vec![true; 3];
        let d = policy.decide(&Candidates::new(&formats, &open), Some(1), &telemetry(0, 0));
        assert_eq!(d.index, 1);

        let blocked = vec![true, false, true];
        let d = policy.decide(&Candidates::new(&formats, &blocked), Some(1), &telemetry(0, 0));
        assert_eq!(d.index, 2);
    }

    #[rstest]
    #[case(1.0, 0)]
    #[case(2.0, 1)]
    #[case(8.0, 2)]
    fn playback_speed_scales_required_bitrate(#[case] speed: f32, #[case] expected: usize) {
        let formats = formats();
        let mask = vec![true; 3];
        let (mut policy, _) = policy_with(6_000_000, options());

        let t = Telemetry {
            playback_speed: speed,
            ..telemetry(FULL_BUFFER_US, 0)
        };
        let d = policy.initial(&Candidates::new(&formats, &mask), &t);
        assert_eq!(d.index, expected);
        if speed >= 4.0 {
            assert_eq!(d.reason, SelectionReason::TrickPlay);
        }
    }

    #[test]
    fn test_estimator_called_once_per_decide() {
        let formats = formats();
        let mask = vec![true; 3];
        let c = Candidates::new(&formats, &mask);

        // bitrate_estimate() called exactly 2 times; unimock verifies on drop
        let mock_estimator = Unimock::new(
            BandwidthEstimatorMock::bitrate_estimate
                .each_call(matching!())
                .returns(Some(1_000_000))
                .n_times(2),
        );
        let mut policy = AdaptivePolicy::new(options(), Arc::new(mock_estimator));

        policy.decide(&c, Some(1), &telemetry(0, 0));
        policy.decide(&c, Some(1), &telemetry(0, 0));
    }

    fn chunk(format: &Arc<Format>, index: u64) -> MediaChunk {
        MediaChunk {
            format: format.clone(),
            start_time_us: index * 5_000_000,
            end_time_us: (index + 1) * 5_000_000,
            chunk_index: index,
        }
    }

    fn queue_ctx(now_ms: u64) -> QueueContext {
        QueueContext {
            playback_position_us: 0,
            playback_speed: 1.0,
            now_ms,
        }
    }

    #[test]
    fn queue_discards_low_quality_tail_when_bandwidth_improves() {
        let formats = formats();
        let mask = vec![true; 3];
        let c = Candidates::new(&formats, &mask);
        let (mut policy, _) = policy_with(5_000_000, options());

        // 8 chunks of 5s in the lowest format: chunks 5.. start >= 25s ahead
        let queue: Vec<MediaChunk> = (0..8).map(|i| chunk(&formats[2], i)).collect();
        assert_eq!(policy.evaluate_queue_size(&c, &queue_ctx(0), &queue), 5);
    }

    #[test]
    fn queue_is_kept_when_buffer_is_short() {
        let formats = formats();
        let mask = vec![true; 3];
        let c = Candidates::new(&formats, &mask);
        let (mut policy, _) = policy_with(5_000_000, options());

        let queue: Vec<MediaChunk> = (0..4).map(|i| chunk(&formats[2], i)).collect();
        assert_eq!(policy.evaluate_queue_size(&c, &queue_ctx(0), &queue), 4);
    }

    #[test]
    fn queue_evaluation_is_rate_limited() {
        let formats = formats();
        let mask = vec![true; 3];
        let c = Candidates::new(&formats, &mask);
        let (mut policy, estimator) = policy_with(100_000, options());

        let queue: Vec<MediaChunk> = (0..8).map(|i| chunk(&formats[2], i)).collect();
        assert_eq!(policy.evaluate_queue_size(&c, &queue_ctx(0), &queue), 8);

        estimator.set(5_000_000);
        assert_eq!(policy.evaluate_queue_size(&c, &queue_ctx(1_000), &queue), 8);
        assert_eq!(policy.evaluate_queue_size(&c, &queue_ctx(2_000), &queue), 5);
    }

    #[test]
    fn queue_never_discards_high_resolution_chunks() {
        let formats = formats();
        let mask = vec![true; 3];
        let c = Candidates::new(&formats, &mask);
        let (mut policy, _) = policy_with(5_000_000, options());

        let queue: Vec<MediaChunk> = (0..8).map(|i| chunk(&formats[1], i)).collect();
        assert_eq!(policy.evaluate_queue_size(&c, &queue_ctx(0), &queue), 5);

        let hd = Arc::new(Format::new(2_000_000).with_size(1280, 720));
        let queue: Vec<MediaChunk> = (0..8).map(|i| chunk(&hd, i)).collect();
        assert_eq!(policy.evaluate_queue_size(&c, &queue_ctx(10_000), &queue), 8);
    }

    #[test]
    fn empty_queue_is_zero() {
        let formats = formats();
        let mask = vec![true; 3];
        let (mut policy, _) = policy_with(5_000_000, options());
        assert_eq!(
            policy.evaluate_queue_size(&Candidates::new(&formats, &mask), &queue_ctx(0), &[]),
            0
        );
    }
}
