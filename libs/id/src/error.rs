//! Error types for ID parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating ids.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The id string is empty.
    #[error("id cannot be empty")]
    Empty,

    /// An app id contains a character outside `[a-z0-9_-]`.
    #[error("invalid app id '{actual}': only lowercase alphanumerics, '-' and '_' are allowed")]
    InvalidAppId { actual: String },

    /// A task id is missing the `.` separator between app id and suffix.
    #[error("task id missing '.' separator")]
    MissingSeparator,

    /// A deployment id has the wrong prefix.
    #[error("invalid id prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix {
        expected: &'static str,
        actual: String,
    },

    /// The ULID portion of an id is invalid.
    #[error("invalid ULID: {0}")]
    InvalidUlid(String),
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }
}
