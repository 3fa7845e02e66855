//! Flood controller - the per-identity quota decision.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;

use crate::clock::{Clock, SystemClock};
use crate::domain::{FloodPolicy, Verdict, WindowRecord};
use crate::error::FloodError;
use crate::ports::{CounterStore, FloodControl};

/// Decides whether an identity may proceed under a fixed-window quota.
///
/// The controller keeps no state between calls; every window lives in the
/// counter store. Each request is counted whether it is allowed or not, and
/// a request arriving `window` or later after the window start opens a new
/// window with a count of 1 instead of adding to the stale one.
pub struct FloodController {
    store: Arc<dyn CounterStore>,
    policy: FloodPolicy,
    clock: Arc<dyn Clock>,
    timeout: Option<Duration>,
}

impl FloodController {
    pub fn new(store: Arc<dyn CounterStore>, policy: FloodPolicy) -> Self {
        Self {
            store,
            policy,
            clock: Arc::new(SystemClock),
            timeout: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bound every check by `timeout`. Late checks fail with `DeadlineExceeded`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn policy(&self) -> FloodPolicy {
        self.policy
    }

    /// Store key for a user: its decimal form.
    pub fn key_for(user_id: i64) -> String {
        user_id.to_string()
    }

    /// Count a request from `user_id` and return the full decision.
    pub async fn evaluate(&self, user_id: i64) -> Result<Verdict, FloodError> {
        self.evaluate_key(&Self::key_for(user_id)).await
    }

    /// Count a request under an arbitrary identity key.
    pub async fn evaluate_key(&self, key: &str) -> Result<Verdict, FloodError> {
        match self.timeout {
            Some(timeout) => self.decide_within(key, timeout).await,
            None => self.decide(key).await,
        }
    }

    /// Like [`FloodControl::check`], but abandons the call after `timeout`.
    pub async fn check_within(&self, user_id: i64, timeout: Duration) -> Result<bool, FloodError> {
        let verdict = self
            .decide_within(&Self::key_for(user_id), timeout)
            .await?;
        Ok(verdict.allowed)
    }

    /// Fail-closed check: any store error denies the request.
    pub async fn check_or_deny(&self, user_id: i64) -> bool {
        match self.check(user_id).await {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::error!(
                    identity = user_id,
                    error = %e,
                    indeterminate = e.is_indeterminate(),
                    "Flood check failed, denying request"
                );
                false
            }
        }
    }

    /// Current window for `user_id` without counting a request.
    /// An expired window reports `None`.
    pub async fn snapshot(&self, user_id: i64) -> Result<Option<WindowRecord>, FloodError> {
        let record = self
            .store
            .record(&Self::key_for(user_id))
            .await
            .map_err(FloodError::StoreUnavailable)?;
        let now = self.clock.now();
        Ok(record.filter(|r| !r.is_expired(now, self.policy.window())))
    }

    /// Forget `user_id`'s window. Its next request opens a new one.
    pub async fn reset(&self, user_id: i64) -> Result<(), FloodError> {
        self.store
            .remove(&Self::key_for(user_id))
            .await
            .map_err(FloodError::StoreUnavailable)?;
        tracing::info!(identity = user_id, "Flood window reset");
        Ok(())
    }

    async fn decide_within(&self, key: &str, timeout: Duration) -> Result<Verdict, FloodError> {
        tokio::time::timeout(timeout, self.decide(key))
            .await
            .map_err(|_| FloodError::DeadlineExceeded(timeout))?
    }

    async fn decide(&self, key: &str) -> Result<Verdict, FloodError> {
        // Stores keep millisecond timestamps; decide on the same resolution.
        let now = self.clock.now();
        let now = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
        let window = self.policy.window();
        let record = self.store.hit(key, now, window).await?;

        let allowed = self.policy.permits(record.count);
        let verdict = Verdict {
            allowed,
            count: record.count,
            remaining: self.policy.quota().saturating_sub(record.count),
            reset_after: record.resets_after(now, window),
            new_window: record.opened_by(now),
        };

        if allowed {
            tracing::debug!(
                identity = %key,
                count = record.count,
                quota = self.policy.quota(),
                new_window = verdict.new_window,
                "Flood check passed"
            );
        } else {
            tracing::warn!(
                identity = %key,
                count = record.count,
                quota = self.policy.quota(),
                reset_after_ms = verdict.reset_after.as_millis() as u64,
                "Flood limit exceeded"
            );
        }

        Ok(verdict)
    }
}

#[async_trait]
impl FloodControl for FloodController {
    async fn check(&self, user_id: i64) -> Result<bool, FloodError> {
        Ok(self.evaluate(user_id).await?.allowed)
    }
}
