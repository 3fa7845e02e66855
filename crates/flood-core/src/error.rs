//! Flood control error types.

use std::time::Duration;

use thiserror::Error;

/// Counter store errors - raised by store adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    Connection(String),

    #[error("Store operation failed: {0}")]
    Operation(String),

    #[error("Corrupt window record for {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Errors surfaced by a flood check.
///
/// An identity that has never been seen is not an error; it opens a new window.
#[derive(Debug, Error)]
pub enum FloodError {
    /// The window state could not be read. The request was not counted.
    #[error("Counter store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// The counting step failed after the read. The request may or may not
    /// have been counted.
    #[error("Counter increment failed: {0}")]
    IncrementFailure(#[source] StoreError),

    #[error("Flood check did not complete within {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Invalid flood policy: {0}")]
    InvalidPolicy(String),
}

impl FloodError {
    /// Whether the store may have counted the request despite the error.
    pub fn is_indeterminate(&self) -> bool {
        matches!(
            self,
            FloodError::IncrementFailure(_) | FloodError::DeadlineExceeded(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indeterminate_classification() {
        let read = FloodError::StoreUnavailable(StoreError::Connection("refused".into()));
        let write = FloodError::IncrementFailure(StoreError::Operation("reset".into()));
        let late = FloodError::DeadlineExceeded(Duration::from_millis(10));

        assert!(!read.is_indeterminate());
        assert!(write.is_indeterminate());
        assert!(late.is_indeterminate());
        assert!(!FloodError::InvalidPolicy("quota".into()).is_indeterminate());
    }

    #[test]
    fn test_error_messages_carry_source() {
        let err = FloodError::StoreUnavailable(StoreError::Connection("refused".into()));
        assert_eq!(
            err.to_string(),
            "Counter store unavailable: Store connection failed: refused"
        );
    }
}
