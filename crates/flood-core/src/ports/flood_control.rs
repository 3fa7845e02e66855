//! Flood control port.

use async_trait::async_trait;

use crate::error::FloodError;

/// Flood control - decides whether a caller may proceed.
#[async_trait]
pub trait FloodControl: Send + Sync {
    /// Count a request from `user_id` and decide on it.
    /// Returns Ok(false) once the user has exceeded the quota of the current window.
    ///
    /// Dropping the returned future abandons the pending store round-trips.
    async fn check(&self, user_id: i64) -> Result<bool, FloodError>;
}
