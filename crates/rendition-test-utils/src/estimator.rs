//! Bandwidth estimator whose value the test sets directly.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use rendition_abr::BandwidthEstimator;

const UNKNOWN: u64 = u64::MAX;

/// Estimator returning whatever the test last stored.
///
/// Clones share the value, so a test can keep one handle and give another to
/// the selection.
#[derive(Clone, Debug)]
pub struct SettableEstimator {
    bps: Arc<AtomicU64>,
}

impl SettableEstimator {
    /// Start with a known estimate.
    #[must_use]
    pub fn new(bps: u64) -> Self {
        let estimator = Self::unknown();
        estimator.set(bps);
        estimator
    }

    /// Start with no estimate.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            bps: Arc::new(AtomicU64::new(UNKNOWN)),
        }
    }

    pub fn set(&self, bps: u64) {
        self.bps.store(bps.min(UNKNOWN - 1), Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.bps.store(UNKNOWN, Ordering::Relaxed);
    }

    /// Shared handle for passing to a factory.
    #[must_use]
    pub fn shared(&self) -> Arc<dyn BandwidthEstimator> {
        Arc::new(self.clone())
    }
}

impl BandwidthEstimator for SettableEstimator {
    fn bitrate_estimate(&self) -> Option<u64> {
        match self.bps.load(Ordering::Relaxed) {
            UNKNOWN => None,
            bps => Some(bps),
        }
    }
}
