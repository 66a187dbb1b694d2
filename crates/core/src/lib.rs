//! Shared primitives for all Rust crates in Rolescope.

#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across Rolescope crates.
pub type AppResult<T> = Result<T, AppError>;

/// Organization identifier used as the partition key for assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrgId(i64);

impl OrgId {
    /// Creates an organization identifier from its stored value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the stored value.
    #[must_use]
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for OrgId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// User identifier shared by memberships, assignments and search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(i64);

impl UserId {
    /// Creates a user identifier from its stored value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the stored value.
    #[must_use]
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for UserId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// A fixed role was declared twice with conflicting content.
    #[error("duplicate registration: {0}")]
    DuplicateRegistration(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backing store failed; not recoverable locally.
    #[error("store error: {0}")]
    Store(String),

    /// One chunk of a bulk load failed. Chunks other than this one may
    /// already have been applied.
    #[error("batch [{start}, {end}) failed: {source}")]
    PartialBatch {
        /// Inclusive start of the failed chunk.
        start: usize,
        /// Exclusive end of the failed chunk.
        end: usize,
        /// Error returned for the chunk.
        #[source]
        source: Box<AppError>,
    },

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::{AppError, OrgId};

    #[test]
    fn org_id_formats_as_number() {
        assert_eq!(OrgId::new(42).to_string(), "42");
    }

    #[test]
    fn partial_batch_reports_chunk_bounds() {
        let error = AppError::PartialBatch {
            start: 1000,
            end: 2000,
            source: Box::new(AppError::Store("connection reset".to_owned())),
        };

        assert_eq!(
            error.to_string(),
            "batch [1000, 2000) failed: store error: connection reset"
        );
    }
}
