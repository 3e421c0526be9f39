//! Adaptive track selection for streaming playback.
//!
//! A [`TrackSelection`] is a static subset of the alternative encodings in a
//! [`TrackGroup`], ordered by decreasing bitrate, plus one selected track
//! that a [`SelectionPolicy`] re-evaluates as playback progresses.
//!
//! ## Features
//!
//! - **Pluggable policies**: fixed, manual, throughput-adaptive and random
//! - **Timed blacklisting**: failing tracks are excluded for a while, but
//!   never all at once
//! - **Queue trimming**: tells the driver which buffered chunks to discard
//!   after bandwidth improves
//! - **Deterministic**: time comes from an injected [`Clock`]
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use rendition_abr::{
//!     AdaptiveOptions, AdaptiveSelectionFactory, Format, ManualClock, ThroughputMeter,
//!     TrackGroup, TrackSelectionFactory,
//! };
//!
//! let group = Arc::new(TrackGroup::new([
//!     Format::new(200_000),
//!     Format::new(800_000),
//!     Format::new(3_000_000),
//! ])?);
//! let meter = Arc::new(ThroughputMeter::new().with_initial_estimate(500_000));
//! let clock = ManualClock::new(0);
//!
//! let factory = AdaptiveSelectionFactory::new(AdaptiveOptions::default())
//!     .with_clock(Arc::new(clock.clone()));
//! let mut selection = factory.create(group, meter, &[0, 1, 2])?;
//!
//! selection.enable()?;
//! assert_eq!(selection.selected_format()?.bitrate, Some(200_000));
//!
//! selection.update_selected_track(0, 15_000_000, None)?;
//! # Ok::<(), rendition_abr::SelectionError>(())
//! ```

#![forbid(unsafe_code)]

mod blacklist;
mod clock;
mod error;
mod estimator;
mod events;
mod factory;
mod group;
pub mod policy;
mod rng;
mod selection;
mod types;

pub use blacklist::Blacklist;
#[cfg(any(test, feature = "test-utils"))]
pub use clock::ClockMock;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{SelectionError, SelectionResult};
#[cfg(any(test, feature = "test-utils"))]
pub use estimator::BandwidthEstimatorMock;
pub use estimator::{BandwidthEstimator, ThroughputMeter, ThroughputSample, ThroughputSampleSource};
pub use events::{EventBus, SelectionEvent};
pub use factory::{
    AdaptiveSelectionFactory, FixedSelectionFactory, ManualSelectionFactory,
    RandomSelectionFactory, TrackSelectionFactory,
};
pub use group::{Format, TrackGroup};
pub use policy::{
    AdaptivePolicy, Candidates, Decision, FixedPolicy, ManualPolicy, RandomPolicy,
    SelectionPolicy,
};
pub use rng::Xorshift64;
pub use selection::{Lifecycle, TrackSelection};
pub use types::{
    AdaptationDetail, AdaptiveOptions, MediaChunk, QueueContext, SelectionData,
    SelectionReason, SwitchTrigger, Telemetry,
};
