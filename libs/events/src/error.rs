//! Error types for event publication.

use thiserror::Error;

/// Errors that can occur when publishing to the event bus.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The bus has been closed and accepts no further events.
    #[error("event bus closed")]
    Closed,
}
