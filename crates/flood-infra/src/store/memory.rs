//! In-memory counter store - used when Redis is unavailable or not compiled in.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use flood_core::clock::{Clock, SystemClock};
use flood_core::domain::WindowRecord;
use flood_core::error::{FloodError, StoreError};
use flood_core::ports::CounterStore;

struct Entry {
    count: u64,
    /// `None` when the counter was created by a bare increment.
    window_start: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }

    fn record(&self) -> Option<WindowRecord> {
        self.window_start.map(|window_start| WindowRecord {
            count: self.count,
            window_start,
        })
    }
}

/// In-memory counter store using a HashMap behind an async RwLock.
///
/// `hit` runs under the write lock, so read, rollover and increment are one
/// atomic step. Note: counts are per-process and lost on restart.
///
/// Expired records are hidden on read but stay in the map until swept; run
/// [`InMemoryCounterStore::spawn_sweeper`] or call `purge_expired` periodically.
pub struct InMemoryCounterStore {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    expire_windows: bool,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock: Arc::new(SystemClock),
            expire_windows: true,
        }
    }

    /// Use `clock` for expiry. Share it with the controller so both agree on "now".
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Keep window records until they are superseded instead of expiring them.
    pub fn without_expiry(mut self) -> Self {
        self.expire_windows = false;
        self
    }

    /// Drop every expired record. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Purge expired records every `every` (at least 1ms) until the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
            loop {
                ticker.tick().await;
                let Some(store) = weak.upgrade() else {
                    break;
                };
                let purged = store.purge_expired().await;
                if purged > 0 {
                    tracing::debug!(purged, "Swept expired flood windows");
                }
            }
        })
    }

    /// Number of records held, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn fresh_entry(&self, start: DateTime<Utc>, window: Duration) -> Entry {
        let expires_at = if self.expire_windows {
            chrono::Duration::from_std(window)
                .ok()
                .and_then(|w| start.checked_add_signed(w))
        } else {
            None
        };

        Entry {
            count: 1,
            window_start: Some(start),
            expires_at,
        }
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn window_start(&self, key: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| entry.window_start))
    }

    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;

        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }

        let entry = entries.entry(key.to_string()).or_insert(Entry {
            count: 0,
            window_start: None,
            expires_at: None,
        });
        entry.count += 1;
        Ok(entry.count)
    }

    async fn start_window(
        &self,
        key: &str,
        start: DateTime<Utc>,
        window: Duration,
    ) -> Result<(), StoreError> {
        let entry = self.fresh_entry(start, window);
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn record(&self, key: &str) -> Result<Option<WindowRecord>, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(Entry::record))
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    async fn hit(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<WindowRecord, FloodError> {
        let mut entries = self.entries.write().await;

        if let Some(entry) = entries.get_mut(key) {
            if let Some(current) = entry.record() {
                if !entry.is_expired(now) && !current.is_expired(now, window) {
                    entry.count += 1;
                    return Ok(WindowRecord {
                        count: entry.count,
                        window_start: current.window_start,
                    });
                }
            }
        }

        entries.insert(key.to_string(), self.fresh_entry(now, window));
        Ok(WindowRecord::opened_at(now))
    }
}
