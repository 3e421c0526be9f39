#![forbid(unsafe_code)]
#![expect(
    clippy::unwrap_used,
    reason = "test utility crate, unwraps are acceptable"
)]
#![expect(
    clippy::missing_panics_doc,
    reason = "test utility crate, panic documentation not needed"
)]

//! Shared test utilities for the rendition workspace.

pub mod estimator;
pub mod fixtures;

pub use estimator::SettableEstimator;
pub use fixtures::*;
pub use rendition_abr::Xorshift64;
