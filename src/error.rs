//! Error types for bubblefield.
//!
//! None of these stop the simulation. Bridge failures are handed to the
//! reporting hook and the local state is kept as the best available truth.

use thiserror::Error;

use crate::sim::BubbleId;

/// Reading from the bridge failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// Network or backend failure.
    #[error("fetch failed: {0}")]
    Transport(String),

    /// The session is not allowed to read.
    #[error("fetch not authorized")]
    Unauthorized,

    /// A single-record lookup found nothing.
    #[error("bubble {0} not found")]
    NotFound(BubbleId),
}

/// Writing to the bridge failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WriteError {
    /// Network or backend failure.
    #[error("write failed: {0}")]
    Transport(String),

    /// The backend refused the write.
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// A record failed shape validation and was dropped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedRecord {
    #[error("record has an empty id")]
    EmptyId,

    #[error("bubble {id}: non-finite {field}")]
    NonFinite { id: BubbleId, field: &'static str },

    #[error("bubble {id}: empty message")]
    EmptyMessage { id: BubbleId },

    #[error("bubble {id}: message is {len} characters")]
    MessageTooLong { id: BubbleId, len: usize },
}

/// Anything the reconciliation layer reports upward.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Malformed(#[from] MalformedRecord),
}

/// User input that cannot become a bubble.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("message is empty")]
    Empty,

    #[error("message is {len} characters, limit is {max}")]
    TooLong { len: usize, max: usize },
}

/// Callback receiving every reported failure.
pub type Reporter = Box<dyn FnMut(&SyncError)>;

/// Default reporter: log and move on.
pub fn log_reporter() -> Reporter {
    Box::new(|err| log::warn!("{}", err))
}
