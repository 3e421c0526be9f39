use std::time::Duration;

use parking_lot::Mutex;
#[cfg(any(test, feature = "test-utils"))]
use unimock::unimock;

/// Live estimate of available throughput.
///
/// Selections only read the estimate; whoever measures downloads feeds it.
/// Implementations must be cheap to query and must not block.
#[cfg_attr(
    any(test, feature = "test-utils"),
    unimock(api = BandwidthEstimatorMock)
)]
pub trait BandwidthEstimator: Send + Sync {
    /// Estimated throughput in bits per second, `None` while unknown.
    fn bitrate_estimate(&self) -> Option<u64>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ThroughputSampleSource {
    Network,
    Cache,
}

/// One completed transfer.
#[derive(Clone, Copy, Debug)]
pub struct ThroughputSample {
    pub bytes: u64,
    pub duration: Duration,
    pub source: ThroughputSampleSource,
}

impl ThroughputSample {
    #[must_use]
    pub fn network(bytes: u64, duration: Duration) -> Self {
        Self {
            bytes,
            duration,
            source: ThroughputSampleSource::Network,
        }
    }
}

/// Dual-EWMA throughput meter.
///
/// Keeps a fast and a slow exponentially weighted average (weighted by
/// transfer time) and reports the lower of the two, so drops are picked up
/// quickly while spikes are smoothed out. Cache hits and tiny transfers are
/// ignored. Safe to share: the driver pushes samples while the selection reads.
#[derive(Debug)]
pub struct ThroughputMeter {
    state: Mutex<MeterState>,
    initial_bps: Option<u64>,
}

#[derive(Clone, Debug)]
struct MeterState {
    fast_ewma: Ewma,
    slow_ewma: Ewma,
    bytes_sampled: u64,
}

impl ThroughputMeter {
    const FAST_HALF_LIFE_SECS: f64 = 2.0;
    const SLOW_HALF_LIFE_SECS: f64 = 10.0;
    const MIN_CHUNK_BYTES: u64 = 16_000;
    const MIN_DURATION_MS: f64 = 0.5;

    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MeterState {
                fast_ewma: Ewma::new(Self::FAST_HALF_LIFE_SECS),
                slow_ewma: Ewma::new(Self::SLOW_HALF_LIFE_SECS),
                bytes_sampled: 0,
            }),
            initial_bps: None,
        }
    }

    /// Estimate reported until the first usable sample arrives.
    #[must_use]
    pub fn with_initial_estimate(mut self, bps: u64) -> Self {
        self.initial_bps = Some(bps).filter(|b| *b > 0);
        self
    }

    pub fn push_sample(&self, sample: ThroughputSample) {
        if !matches!(sample.source, ThroughputSampleSource::Network) {
            return;
        }
        if sample.bytes < Self::MIN_CHUNK_BYTES {
            return;
        }

        let dur_ms = (sample.duration.as_secs_f64() * 1000.0).max(Self::MIN_DURATION_MS);
        #[expect(clippy::cast_precision_loss)] // byte counts far below 2^52
        let bps = (sample.bytes as f64) * 8000.0 / dur_ms;
        let weight_secs = dur_ms / 1000.0;

        let mut state = self.state.lock();
        state.fast_ewma.add_sample(weight_secs, bps);
        state.slow_ewma.add_sample(weight_secs, bps);
        state.bytes_sampled = state.bytes_sampled.saturating_add(sample.bytes);
        tracing::trace!(bps, weight_secs, "throughput sample");
    }

    /// Total bytes that contributed to the estimate.
    #[must_use]
    pub fn bytes_sampled(&self) -> u64 {
        self.state.lock().bytes_sampled
    }

    /// Forget every sample (e.g., after a network change).
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.fast_ewma = Ewma::new(Self::FAST_HALF_LIFE_SECS);
        state.slow_ewma = Ewma::new(Self::SLOW_HALF_LIFE_SECS);
        state.bytes_sampled = 0;
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl BandwidthEstimator for ThroughputMeter {
    fn bitrate_estimate(&self) -> Option<u64> {
        let est = {
            let state = self.state.lock();
            state
                .fast_ewma
                .get_estimate()
                .min(state.slow_ewma.get_estimate())
        };

        if est > 0.0 {
            #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let bps = est.round() as u64;
            Some(bps)
        } else {
            self.initial_bps
        }
    }
}

#[derive(Clone, Debug)]
struct Ewma {
    alpha: f64,
    last_estimate: f64,
    total_weight: f64,
}

impl Ewma {
    fn new(half_life_secs: f64) -> Self {
        Self {
            alpha: f64::exp(0.5_f64.ln() / half_life_secs.max(0.001)),
            last_estimate: 0.0,
            total_weight: 0.0,
        }
    }

    fn add_sample(&mut self, weight: f64, val: f64) {
        let adj_alpha = self.alpha.powf(weight.max(0.0));
        let new_estimate = val * (1.0 - adj_alpha) + adj_alpha * self.last_estimate;
        self.last_estimate = new_estimate;
        self.total_weight += weight.max(0.0);
    }

    fn get_estimate(&self) -> f64 {
        if self.total_weight <= 0.0 {
            0.0
        } else {
            let zero_factor = 1.0 - self.alpha.powf(self.total_weight);
            self.last_estimate / zero_factor.max(1e-6)
        }
    }
}
