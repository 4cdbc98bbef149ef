//! Keyed cache of async reads with in-flight joining and per-key generations.
//!
//! At most one fetch runs per key. Callers asking for a key whose fetch is
//! still in flight wait for that fetch instead of starting another, unless
//! the entry was invalidated after the fetch began. Every fetch started for a
//! key bumps the entry's generation, and a completion only lands if its
//! generation is still the entry's latest.
//!
//! Observers retain the key they watch. An entry nobody retains is evicted
//! once it has gone unobserved for `gc_time`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

use weatherwatch_weather::WeatherError;

use crate::invalidation::Invalidate;
use crate::query_key::QueryKey;

pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(300);
pub const DEFAULT_GC_TIME: Duration = Duration::from_secs(300);

pub type QueryResult<V> = Result<V, Arc<WeatherError>>;
pub type QueryFuture<V> = Pin<Box<dyn Future<Output = Result<V, WeatherError>> + Send>>;
/// Produces the fetch for a key. Called once per started fetch.
pub type QueryFn<V> = Arc<dyn Fn() -> QueryFuture<V> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// Point-in-time copy of one entry.
#[derive(Debug, Clone)]
pub struct EntrySnapshot<V> {
    /// Last successful value; kept across errors and refetches
    pub data: Option<V>,
    pub status: FetchStatus,
    pub error: Option<Arc<WeatherError>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_stale: bool,
    pub generation: u64,
}

struct InFlight<V> {
    generation: u64,
    done: watch::Receiver<Option<QueryResult<V>>>,
}

struct CacheEntry<V> {
    data: Option<V>,
    status: FetchStatus,
    error: Option<Arc<WeatherError>>,
    updated_at: Option<DateTime<Utc>>,
    fetched_at: Option<Instant>,
    invalidated: bool,
    generation: u64,
    in_flight: Option<InFlight<V>>,
    observers: usize,
    unobserved_since: Instant,
}

impl<V> CacheEntry<V> {
    fn new() -> Self {
        Self {
            data: None,
            status: FetchStatus::Idle,
            error: None,
            updated_at: None,
            fetched_at: None,
            invalidated: false,
            generation: 0,
            in_flight: None,
            observers: 0,
            unobserved_since: Instant::now(),
        }
    }
}

enum Plan<V> {
    Cached(V),
    Join(watch::Receiver<Option<QueryResult<V>>>),
    Start(u64, watch::Sender<Option<QueryResult<V>>>),
}

pub struct QueryCache<V> {
    entries: Mutex<HashMap<QueryKey, CacheEntry<V>>>,
    stale_time: Duration,
    gc_time: Duration,
}

impl<V> QueryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(stale_time: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            stale_time,
            gc_time: DEFAULT_GC_TIME,
        }
    }

    pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = gc_time;
        self
    }

    pub fn stale_time(&self) -> Duration {
        self.stale_time
    }

    pub fn gc_time(&self) -> Duration {
        self.gc_time
    }

    fn is_fresh(&self, entry: &CacheEntry<V>) -> bool {
        !entry.invalidated
            && entry.status == FetchStatus::Success
            && entry
                .fetched_at
                .is_some_and(|at| at.elapsed() < self.stale_time)
    }

    /// Read `key`, reusing a fresh value or an in-flight fetch when possible.
    pub async fn fetch(&self, key: &QueryKey, query_fn: &QueryFn<V>) -> QueryResult<V> {
        loop {
            let plan = {
                let mut entries = self.entries.lock();
                let entry = entries.entry(key.clone()).or_insert_with(CacheEntry::new);

                let joinable = if entry.invalidated {
                    None
                } else {
                    entry.in_flight.as_ref().map(|f| f.done.clone())
                };
                let cached = if self.is_fresh(entry) {
                    entry.data.clone()
                } else {
                    None
                };

                match (joinable, cached) {
                    (Some(done), _) => Plan::Join(done),
                    (None, Some(data)) => Plan::Cached(data),
                    (None, None) => Self::begin(entry),
                }
            };

            match plan {
                Plan::Cached(data) => {
                    tracing::debug!("Cache hit for {}", key);
                    return Ok(data);
                }
                Plan::Join(mut done) => {
                    tracing::debug!("Joining in-flight fetch for {}", key);
                    let outcome = match done.wait_for(Option::is_some).await {
                        Ok(value) => (*value).clone(),
                        // The fetch was dropped before finishing; try again
                        Err(_) => continue,
                    };
                    if let Some(result) = outcome {
                        return result;
                    }
                }
                Plan::Start(generation, done) => {
                    return self.run(key, generation, done, query_fn).await;
                }
            }
        }
    }

    fn begin(entry: &mut CacheEntry<V>) -> Plan<V> {
        entry.generation += 1;
        entry.invalidated = false;
        entry.status = FetchStatus::Loading;

        let (tx, rx) = watch::channel(None);
        entry.in_flight = Some(InFlight {
            generation: entry.generation,
            done: rx,
        });
        Plan::Start(entry.generation, tx)
    }

    async fn run(
        &self,
        key: &QueryKey,
        generation: u64,
        done: watch::Sender<Option<QueryResult<V>>>,
        query_fn: &QueryFn<V>,
    ) -> QueryResult<V> {
        // Dropped before `done`, so joiners woken by the closed channel find
        // the entry already released
        let mut guard = AbandonGuard {
            cache: self,
            key,
            generation,
            armed: true,
        };

        tracing::debug!("Fetching {} (generation {})", key, generation);
        let result = query_fn().await.map_err(Arc::new);

        guard.armed = false;
        if let Err(e) = &result {
            tracing::error!("Fetch for {} failed: {}", key, e);
        }
        self.complete(key, generation, &result);
        done.send_replace(Some(result.clone()));
        result
    }

    /// Apply a finished fetch. Returns false when a newer fetch superseded it.
    fn complete(&self, key: &QueryKey, generation: u64, result: &QueryResult<V>) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            return false;
        };

        if entry.generation != generation {
            tracing::debug!(
                "Discarding superseded response for {} (generation {} < {})",
                key,
                generation,
                entry.generation
            );
            return false;
        }

        entry.in_flight = None;
        match result {
            Ok(value) => {
                entry.data = Some(value.clone());
                entry.status = FetchStatus::Success;
                entry.error = None;
                entry.updated_at = Some(Utc::now());
                entry.fetched_at = Some(Instant::now());
            }
            Err(e) => {
                entry.status = FetchStatus::Error;
                entry.error = Some(Arc::clone(e));
            }
        }
        true
    }

    fn abandon(&self, key: &QueryKey, generation: u64) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        let owns_flight = entry
            .in_flight
            .as_ref()
            .is_some_and(|f| f.generation == generation);
        if entry.generation == generation && owns_flight {
            tracing::debug!("Fetch for {} dropped before completing", key);
            entry.in_flight = None;
            entry.invalidated = true;
            entry.status = if entry.data.is_some() {
                FetchStatus::Success
            } else {
                FetchStatus::Idle
            };
        }
    }

    pub fn snapshot(&self, key: &QueryKey) -> Option<EntrySnapshot<V>> {
        let entries = self.entries.lock();
        entries.get(key).map(|entry| EntrySnapshot {
            data: entry.data.clone(),
            status: entry.status,
            error: entry.error.clone(),
            updated_at: entry.updated_at,
            is_stale: !self.is_fresh(entry),
            generation: entry.generation,
        })
    }

    /// Value for `key` if it can be served without fetching.
    pub fn fresh_value(&self, key: &QueryKey) -> Option<V> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|entry| entry.in_flight.is_none() && self.is_fresh(entry))
            .and_then(|entry| entry.data.clone())
    }

    pub fn is_stale(&self, key: &QueryKey) -> bool {
        let entries = self.entries.lock();
        entries.get(key).map_or(true, |entry| !self.is_fresh(entry))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Register an observer of `key`. Retained entries are never evicted.
    pub fn retain(&self, key: &QueryKey) {
        let mut entries = self.entries.lock();
        entries
            .entry(key.clone())
            .or_insert_with(CacheEntry::new)
            .observers += 1;
    }

    /// Drop an observer of `key`. When the last one leaves, the entry is
    /// evicted after `gc_time` unless it is observed again.
    pub fn release(self: &Arc<Self>, key: &QueryKey) {
        {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(key) else {
                return;
            };
            entry.observers = entry.observers.saturating_sub(1);
            if entry.observers > 0 {
                return;
            }
            entry.unobserved_since = Instant::now();
        }
        self.schedule_gc();
    }

    fn schedule_gc(self: &Arc<Self>) {
        if self.gc_time.is_zero() {
            self.evict_unobserved();
            return;
        }
        // outside a runtime there is no timer to wait on
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.evict_unobserved();
            return;
        };

        let cache: Weak<Self> = Arc::downgrade(self);
        let gc_time = self.gc_time;
        runtime.spawn(async move {
            tokio::time::sleep(gc_time).await;
            if let Some(cache) = cache.upgrade() {
                cache.evict_unobserved();
            }
        });
    }

    /// Drop entries nobody has observed for `gc_time`. Entries with a fetch
    /// in flight are kept until a later sweep.
    pub fn evict_unobserved(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        let gc_time = self.gc_time;
        entries.retain(|_, entry| {
            entry.observers > 0
                || entry.in_flight.is_some()
                || entry.unobserved_since.elapsed() < gc_time
        });
        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::debug!("Evicted {} unobserved entries", evicted);
        }
        evicted
    }
}

impl<V> Invalidate for QueryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.entries.lock();
        let mut count = 0;
        for (key, entry) in entries.iter_mut() {
            if key.starts_with(prefix) {
                entry.invalidated = true;
                count += 1;
            }
        }
        count
    }
}

struct AbandonGuard<'a, V>
where
    V: Clone + Send + Sync + 'static,
{
    cache: &'a QueryCache<V>,
    key: &'a QueryKey,
    generation: u64,
    armed: bool,
}

impl<V> Drop for AbandonGuard<'_, V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.armed {
            self.cache.abandon(self.key, self.generation);
        }
    }
}
