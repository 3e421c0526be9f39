#![forbid(unsafe_code)]

use thiserror::Error;

/// Errors surfaced by track selection.
///
/// Every variant indicates driver misuse. Runtime conditions such as a
/// missing bandwidth estimate are resolved internally and never show up here.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    /// Malformed construction or call parameters.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Selection index outside `[0, length)`.
    #[error("Selection index {index} out of range (length {length})")]
    IndexOutOfRange { index: usize, length: usize },

    /// Lifecycle misuse.
    #[error("Precondition violated: {0}")]
    PreconditionViolation(&'static str),
}

pub type SelectionResult<T> = Result<T, SelectionError>;
