//! Error types for the device event queue.

use thiserror::Error;

/// Result type alias for devqueue operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while operating the device event queue.
#[derive(Debug, Error)]
pub enum Error {
    /// The device subsystem could not be reached when opening a queue.
    ///
    /// Recoverable: the caller may retry after a delay.
    #[error("failed to open device queue: {0}")]
    OpenFailed(String),

    /// The event log could not store another event.
    #[error("event storage exhausted: {0}")]
    StorageExhausted(String),

    /// A sequence number that was never issued.
    #[error("unknown sequence number {0}")]
    UnknownSequence(u64),

    /// The queue handle has already been released.
    #[error("queue handle has been released")]
    Released,

    /// Failed to read or parse the event journal.
    #[error("journal error: {0}")]
    Journal(String),

    /// A collector is already running.
    #[error("collector is already running")]
    AlreadyRunning,

    /// A collector is not running.
    #[error("collector is not running")]
    NotRunning,

    /// Thread-related error.
    #[error("thread error: {0}")]
    ThreadError(String),

    /// Other errors.
    #[error("{0}")]
    Other(String),
}
