//! Error types for the reclaim cycle engine.
//!
//! Only technical failures live here. "No rate" and "TOL failure" are
//! business outcomes and are reported as values in [`crate::outcome`].

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, CycleError>;

/// Fatal errors that abort a cycle run.
#[derive(Error, Debug)]
pub enum CycleError {
    /// Failed to open or read an input file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// The backing store for a stream failed during open, read, or close
    #[error("{stream} store failure: {message}")]
    Store {
        stream: &'static str,
        message: String,
    },

    /// A cursor operation referenced a handle the store never issued
    #[error("{stream} store has no open handle {handle}")]
    UnknownHandle { stream: &'static str, handle: u32 },

    /// A stream record could not be converted into its typed form
    #[error("Invalid {stream} record at row {row}: {message}")]
    InvalidRecord {
        stream: &'static str,
        row: usize,
        message: String,
    },

    /// Job configuration rejected before any cursor was opened
    #[error("validation failure: {0}")]
    Validation(String),
}
