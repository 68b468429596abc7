use super::store::CounterStore;
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant};
use tracing::{debug, info};

/// Counter and block state for one key
#[derive(Debug, Clone, Default)]
struct KeyState {
    count: u64,
    window_expiry: Option<Instant>,
    blocked_until: Option<Instant>,
}

impl KeyState {
    fn live_count(&self, now: Instant) -> u64 {
        match self.window_expiry {
            Some(expiry) if now < expiry => self.count,
            _ => 0,
        }
    }

    fn is_blocked(&self, now: Instant) -> bool {
        matches!(self.blocked_until, Some(until) if now < until)
    }

    /// Nothing left worth keeping
    fn is_stale(&self, now: Instant) -> bool {
        self.live_count(now) == 0 && !self.is_blocked(now)
    }
}

/// In-process counter store.
///
/// All state lives in one sharded map. A shard is read-locked for lookups
/// and write-locked for any mutation, so operations on one key are
/// linearizable and keys in different shards never contend.
pub struct MemoryStore {
    entries: Arc<DashMap<String, KeyState>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryStore {
    /// Create a store without background eviction
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            sweeper: Mutex::new(None),
        }
    }

    /// Create a store that evicts stale entries every `period`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_sweep(period: Duration) -> Self {
        let entries = Arc::new(DashMap::new());
        let task_entries = Arc::clone(&entries);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            info!(period_ms = period.as_millis() as u64, "Started counter sweep");

            loop {
                ticker.tick().await;
                let evicted = sweep(&task_entries, Instant::now());
                if evicted > 0 {
                    debug!(evicted, remaining = task_entries.len(), "Evicted stale counters");
                }
            }
        });

        Self {
            entries,
            sweeper: Mutex::new(Some(handle)),
        }
    }

    /// Number of tracked keys, including not-yet-evicted stale ones
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evict stale entries now and return how many were removed
    pub fn sweep_now(&self) -> usize {
        sweep(&self.entries, Instant::now())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

/// Farthest deadline a key can be given
const MAX_DEADLINE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// `now + duration`, saturating at `now + MAX_DEADLINE`
fn deadline(now: Instant, duration: Duration) -> Instant {
    now.checked_add(duration.min(MAX_DEADLINE)).unwrap_or(now)
}

fn sweep(entries: &DashMap<String, KeyState>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|_, state| !state.is_stale(now));
    before.saturating_sub(entries.len())
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get_count(&self, key: &str) -> Result<u64> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .map(|state| state.live_count(now))
            .unwrap_or(0))
    }

    async fn increment_count(&self, key: &str, window: Duration) -> Result<u64> {
        let now = Instant::now();
        let mut state = self.entries.entry(key.to_string()).or_default();

        if state.live_count(now) == 0 {
            state.count = 0;
            state.window_expiry = Some(deadline(now, window));
        }
        state.count += 1;

        Ok(state.count)
    }

    async fn is_blocked(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .map(|state| state.is_blocked(now))
            .unwrap_or(false))
    }

    async fn block(&self, key: &str, duration: Duration) -> Result<()> {
        let now = Instant::now();
        let mut state = self.entries.entry(key.to_string()).or_default();

        state.blocked_until = Some(deadline(now, duration));
        state.count = 0;
        state.window_expiry = None;

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
            debug!("Stopped counter sweep");
        }
        Ok(())
    }
}
