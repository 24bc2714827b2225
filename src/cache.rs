//! In-memory response cache with time-based expiry.
//!
//! Entries are keyed by string (in practice, the request URL) and hold the raw
//! response bytes. Reads never check age: a background sweep task removes
//! entries older than the configured interval, running once per interval.
//! An entry is therefore guaranteed to be readable for at least `interval`
//! after insertion, and guaranteed gone after at most two intervals.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Smallest sweep period accepted; `tokio::time::interval` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Arc<[u8]>,
    created_at: Instant,
}

type Entries = Arc<Mutex<HashMap<String, CacheEntry>>>;

/// Thread-safe byte cache whose entries expire `interval` after insertion.
///
/// Construct inside a tokio runtime: `new` spawns the sweep task. The task is
/// aborted when the cache is dropped.
#[derive(Debug)]
pub struct ExpiringCache {
    entries: Entries,
    interval: Duration,
    sweeper: JoinHandle<()>,
}

impl ExpiringCache {
    pub fn new(interval: Duration) -> Self {
        let interval = interval.max(MIN_INTERVAL);
        let entries: Entries = Arc::new(Mutex::new(HashMap::new()));
        let sweeper = tokio::spawn(sweep_loop(Arc::clone(&entries), interval));

        Self {
            entries,
            interval,
            sweeper,
        }
    }

    /// Store `payload` under `key`, replacing any previous entry and resetting its age.
    pub fn put(&self, key: impl Into<String>, payload: impl Into<Arc<[u8]>>) {
        let entry = CacheEntry {
            payload: payload.into(),
            created_at: Instant::now(),
        };
        lock(&self.entries).insert(key.into(), entry);
    }

    /// Return the payload stored under `key`, if the sweep has not evicted it yet.
    pub fn get(&self, key: &str) -> Option<Arc<[u8]>> {
        lock(&self.entries)
            .get(key)
            .map(|entry| Arc::clone(&entry.payload))
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for ExpiringCache {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

/// A panic while holding the lock cannot leave a half-written `HashMap` entry,
/// so a poisoned lock is safe to keep using.
fn lock(entries: &Entries) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn sweep_loop(entries: Entries, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let evicted = sweep(&entries, interval, Instant::now());
        if evicted > 0 {
            tracing::debug!(evicted = evicted, "Evicted expired cache entries");
        }
    }
}

/// Remove every entry older than `interval` as of `now`. Returns the eviction count.
fn sweep(entries: &Entries, interval: Duration, now: Instant) -> usize {
    let mut map = lock(entries);
    let before = map.len();
    map.retain(|_, entry| now.saturating_duration_since(entry.created_at) <= interval);
    before - map.len()
}
