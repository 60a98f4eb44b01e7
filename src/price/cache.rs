//! TTL price cache with background sweep
//!
//! Entries are owned exclusively by the cache; lookups read or (in the
//! sweeper) delete, never mutate. A TTL of zero disables the cache
//! outright: every request becomes a forced miss, which is the configured
//! default ("always serve the freshest value").

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::config::CacheConfig;
use crate::types::PriceQuote;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: PriceQuote,
    expires_at: Instant,
}

/// Result of a stale-tolerant lookup
#[derive(Debug, Clone)]
pub struct StaleLookup {
    /// The cached value, present even when expired
    pub value: Option<PriceQuote>,
    /// Whether the key was present at all
    pub exists: bool,
    /// Whether the entry had passed its TTL
    pub expired: bool,
}

type SweepState = parking_lot::Mutex<Option<Instant>>;

/// TTL-keyed price store
pub struct PriceCache {
    ttl: Duration,
    max_staleness: Duration,
    entries: Arc<DashMap<String, CacheEntry>>,
    last_sweep: Arc<SweepState>,
    shutdown_tx: Option<watch::Sender<bool>>,
    sweeper: Option<JoinHandle<()>>,
}

impl PriceCache {
    /// Construct the cache and, when enabled, spawn its background sweeper.
    pub fn new(config: &CacheConfig) -> Self {
        let ttl = Duration::from_secs(config.ttl_secs);
        let entries: Arc<DashMap<String, CacheEntry>> = Arc::new(DashMap::new());
        let last_sweep: Arc<SweepState> = Arc::new(parking_lot::Mutex::new(None));

        let (shutdown_tx, sweeper) = if ttl.is_zero() {
            (None, None)
        } else {
            let (tx, mut rx) = watch::channel(false);
            let task_entries = Arc::clone(&entries);
            let task_last_sweep = Arc::clone(&last_sweep);
            let handle = tokio::spawn(async move {
                let mut tick =
                    tokio::time::interval_at(Instant::now() + ttl / 2, ttl / 2);
                tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            if let Some(removed) =
                                sweep(&task_entries, &task_last_sweep, ttl)
                            {
                                if removed > 0 {
                                    debug!(removed, "price cache sweep");
                                }
                            }
                        }
                        changed = rx.changed() => {
                            if changed.is_err() || *rx.borrow() {
                                break;
                            }
                        }
                    }
                }
                debug!("price cache sweeper stopped");
            });
            (Some(tx), Some(handle))
        };

        Self {
            ttl,
            max_staleness: Duration::from_secs(config.max_staleness_secs),
            entries,
            last_sweep,
            shutdown_tx,
            sweeper,
        }
    }

    /// Whether caching is disabled (`ttl == 0`)
    pub fn is_disabled(&self) -> bool {
        self.ttl.is_zero()
    }

    /// Strict-TTL lookup: an expired entry is treated as absent.
    pub fn get(&self, key: &str) -> Option<PriceQuote> {
        if self.is_disabled() {
            return None;
        }
        let now = Instant::now();
        self.entries.get(key).and_then(|entry| {
            if entry.expires_at <= now {
                None
            } else {
                Some(entry.value.clone())
            }
        })
    }

    /// Stale-tolerant lookup for callers with fallback-to-stale semantics.
    pub fn get_stale(&self, key: &str) -> StaleLookup {
        if self.is_disabled() {
            return StaleLookup {
                value: None,
                exists: false,
                expired: false,
            };
        }
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) => StaleLookup {
                expired: entry.expires_at <= now,
                exists: true,
                value: Some(entry.value.clone()),
            },
            None => StaleLookup {
                value: None,
                exists: false,
                expired: false,
            },
        }
    }

    /// Store a quote under `key` with `expires_at = now + ttl`. No-op when
    /// caching is disabled.
    pub fn set(&self, key: &str, value: PriceQuote) {
        if self.is_disabled() {
            return;
        }
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Business-level freshness check, independent of TTL expiry: compares
    /// the quote's own timestamp against the max-staleness window. An
    /// absent key is considered stale.
    pub fn is_stale(&self, key: &str) -> bool {
        if self.is_disabled() {
            return true;
        }
        match self.entries.get(key) {
            Some(entry) => {
                let age = Utc::now()
                    .signed_duration_since(entry.value.fetched_at)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                age > self.max_staleness
            }
            None => true,
        }
    }

    /// Remove expired entries now, subject to the sweep throttle.
    /// Returns the number removed, or None when throttled or disabled.
    pub fn purge_expired(&self) -> Option<usize> {
        if self.is_disabled() {
            return None;
        }
        sweep(&self.entries, &self.last_sweep, self.ttl)
    }

    /// Number of stored entries, expired or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stop the background sweeper and wait for it to exit.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.sweeper.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PriceCache {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        // The sweeper observes the signal at its next wakeup; aborting here
        // covers a runtime that is no longer polling it
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }
    }
}

// Shared by the background task and manual triggers. The throttle keeps
// repeated triggers from sweeping more than once per ttl/4.
fn sweep(
    entries: &DashMap<String, CacheEntry>,
    last_sweep: &SweepState,
    ttl: Duration,
) -> Option<usize> {
    let now = Instant::now();
    {
        let mut last = last_sweep.lock();
        if let Some(prev) = *last {
            if now.duration_since(prev) < ttl / 4 {
                return None;
            }
        }
        *last = Some(now);
    }
    let before = entries.len();
    entries.retain(|_, entry| entry.expires_at > now);
    Some(before - entries.len())
}
