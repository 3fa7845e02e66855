use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Window record - one per identity, owned by the counter store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRecord {
    /// Requests observed in this window, including the one that opened it.
    pub count: u64,
    /// When the window began. Never changes for the life of the window.
    pub window_start: DateTime<Utc>,
}

impl WindowRecord {
    /// Record for a window opened by a single request at `now`.
    pub fn opened_at(now: DateTime<Utc>) -> Self {
        Self {
            count: 1,
            window_start: now,
        }
    }

    /// Time since the window started. A start in the future (clock skew
    /// between writers) counts as zero.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.window_start).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_expired(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.elapsed(now) >= window
    }

    /// Whether this record is the window opened by the request observed at `now`.
    pub fn opened_by(&self, now: DateTime<Utc>) -> bool {
        self.count == 1 && self.window_start == now
    }

    /// Time left until the window rolls over.
    pub fn resets_after(&self, now: DateTime<Utc>, window: Duration) -> Duration {
        window.saturating_sub(self.elapsed(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_window_boundary_is_exclusive() {
        let record = WindowRecord::opened_at(at(100));
        let window = Duration::from_secs(5);

        assert!(!record.is_expired(at(104), window));
        assert!(record.is_expired(at(105), window));
        assert_eq!(record.resets_after(at(103), window), Duration::from_secs(2));
        assert_eq!(record.resets_after(at(200), window), Duration::ZERO);
    }

    #[test]
    fn test_opened_by_needs_matching_start() {
        let record = WindowRecord::opened_at(at(100));
        assert!(record.opened_by(at(100)));
        assert!(!record.opened_by(at(101)));

        let second = WindowRecord {
            count: 2,
            window_start: at(100),
        };
        assert!(!second.opened_by(at(100)));
    }

    #[test]
    fn test_future_start_counts_as_inside_window() {
        let record = WindowRecord::opened_at(at(100));
        assert_eq!(record.elapsed(at(90)), Duration::ZERO);
        assert!(!record.is_expired(at(90), Duration::from_secs(1)));
    }

    #[test]
    fn test_record_serializes_with_timestamp() {
        let record = WindowRecord {
            count: 3,
            window_start: at(1_700_000_000),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"count\":3"));

        let back: WindowRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
