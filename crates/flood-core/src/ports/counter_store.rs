//! Counter store port - where window state lives.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::WindowRecord;
use crate::error::{FloodError, StoreError};

/// Counter store - holds one window record per identity key.
///
/// Each primitive must be atomic on its own. Implementations that can read,
/// roll over and count in one atomic step should override [`CounterStore::hit`].
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Start of the key's current window, or `None` if there is no record.
    async fn window_start(&self, key: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Atomically increment the key's counter and return the new value.
    /// A missing counter is created at zero first, so the first increment returns 1.
    async fn increment(&self, key: &str) -> Result<u64, StoreError>;

    /// Replace the key's record with a fresh window: `start` and a count of 1.
    /// `window` is the window length, used for expiry when the store supports it.
    async fn start_window(
        &self,
        key: &str,
        start: DateTime<Utc>,
        window: Duration,
    ) -> Result<(), StoreError>;

    /// Full record for the key, if any.
    async fn record(&self, key: &str) -> Result<Option<WindowRecord>, StoreError>;

    /// Drop the key's record.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Count one request at `now`, rolling the window over first if it has expired.
    ///
    /// This default composes the primitives: a read, then either an increment or
    /// a window reset. The pair is not atomic. A concurrent caller's update between
    /// the two round-trips goes unseen, and two callers that both read an expired
    /// window will both reset it, so one of their counts is lost.
    ///
    /// A failed read surfaces as `StoreUnavailable` and never counts the request.
    /// A failed write surfaces as `IncrementFailure`.
    async fn hit(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<WindowRecord, FloodError> {
        let start = self
            .window_start(key)
            .await
            .map_err(FloodError::StoreUnavailable)?;

        match start {
            Some(window_start)
                if !WindowRecord::opened_at(window_start).is_expired(now, window) =>
            {
                let count = self
                    .increment(key)
                    .await
                    .map_err(FloodError::IncrementFailure)?;
                Ok(WindowRecord {
                    count,
                    window_start,
                })
            }
            _ => {
                self.start_window(key, now, window)
                    .await
                    .map_err(FloodError::IncrementFailure)?;
                Ok(WindowRecord::opened_at(now))
            }
        }
    }
}
