//! A mounted consumer of one query key at a time.
//!
//! The observer publishes a [`QueryState`] for whichever key it currently
//! watches. Switching keys starts a new observation; completions belonging to
//! an older observation are dropped. It also listens to the invalidation
//! coordinator and re-reads its key when an invalidation covered it and it
//! went stale. While watching a key the observer retains it in the cache.
//!
//! Observers spawn tasks and must be created inside a tokio runtime.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use weatherwatch_weather::WeatherError;

use crate::invalidation::InvalidationCoordinator;
use crate::query_cache::{FetchStatus, QueryCache, QueryFn};
use crate::query_key::QueryKey;

#[derive(Debug, Clone)]
pub struct QueryState<V> {
    pub key: Option<QueryKey>,
    pub data: Option<V>,
    pub is_loading: bool,
    pub error: Option<Arc<WeatherError>>,
}

impl<V> Default for QueryState<V> {
    fn default() -> Self {
        Self {
            key: None,
            data: None,
            is_loading: false,
            error: None,
        }
    }
}

struct Observation<V> {
    key: Option<QueryKey>,
    query_fn: Option<QueryFn<V>>,
    generation: u64,
}

struct Shared<V> {
    cache: Arc<QueryCache<V>>,
    observation: Mutex<Observation<V>>,
    state: watch::Sender<QueryState<V>>,
    cancel: CancellationToken,
}

impl<V> Shared<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Begin a new observation of the current key. Caller holds the lock.
    fn start(self: &Arc<Self>, observation: &mut Observation<V>) {
        observation.generation += 1;
        let generation = observation.generation;

        let (Some(key), Some(query_fn)) = (observation.key.clone(), observation.query_fn.clone())
        else {
            self.state.send_replace(QueryState::default());
            return;
        };

        if let Some(data) = self.cache.fresh_value(&key) {
            self.state.send_replace(QueryState {
                key: Some(key),
                data: Some(data),
                is_loading: false,
                error: None,
            });
            return;
        }

        let previous = self.cache.snapshot(&key).and_then(|s| s.data);
        self.state.send_replace(QueryState {
            key: Some(key.clone()),
            data: previous,
            is_loading: true,
            error: None,
        });

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = shared.cancel.cancelled() => {}
                _ = shared.follow(key, query_fn, generation) => {}
            }
        });
    }

    async fn follow(&self, key: QueryKey, query_fn: QueryFn<V>, generation: u64) {
        loop {
            // The outcome is read back from the cache so a superseded
            // completion never reaches the consumer.
            let result = self.cache.fetch(&key, &query_fn).await;

            let settled = {
                let observation = self.observation.lock();
                if observation.generation != generation {
                    tracing::debug!("Dropping result for {}: observation moved on", key);
                    return;
                }

                match self.cache.snapshot(&key) {
                    // entry evicted meanwhile; settle on our own result
                    None => {
                        let (data, error) = match result {
                            Ok(data) => (Some(data), None),
                            Err(error) => (None, Some(error)),
                        };
                        self.state.send_replace(QueryState {
                            key: Some(key.clone()),
                            data,
                            is_loading: false,
                            error,
                        });
                        true
                    }
                    // a newer fetch for this key is running; wait for it
                    Some(snapshot) if snapshot.status == FetchStatus::Loading => false,
                    Some(snapshot) => {
                        let error = match snapshot.status {
                            FetchStatus::Error => snapshot.error,
                            _ => None,
                        };
                        self.state.send_replace(QueryState {
                            key: Some(key.clone()),
                            data: snapshot.data,
                            is_loading: false,
                            error,
                        });
                        true
                    }
                }
            };

            if settled {
                return;
            }
        }
    }

    fn refetch_if_stale(self: &Arc<Self>, prefix: Option<&QueryKey>) {
        let mut observation = self.observation.lock();
        let stale = observation.key.as_ref().is_some_and(|key| {
            prefix.map_or(true, |prefix| key.starts_with(prefix)) && self.cache.is_stale(key)
        });
        if stale {
            self.start(&mut observation);
        }
    }
}

pub struct QueryObserver<V>
where
    V: Clone + Send + Sync + 'static,
{
    shared: Arc<Shared<V>>,
}

impl<V> QueryObserver<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(cache: Arc<QueryCache<V>>, coordinator: &InvalidationCoordinator) -> Self {
        let (state, _) = watch::channel(QueryState::default());
        let shared = Arc::new(Shared {
            cache,
            observation: Mutex::new(Observation {
                key: None,
                query_fn: None,
                generation: 0,
            }),
            state,
            cancel: CancellationToken::new(),
        });

        let mut events = coordinator.subscribe();
        let listener = Arc::clone(&shared);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = listener.cancel.cancelled() => break,
                    changed = events.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let prefix = events.borrow_and_update().prefix.clone();
                        listener.refetch_if_stale(prefix.as_ref());
                    }
                }
            }
        });

        Self { shared }
    }

    /// Observe `key`, fetching with `query_fn` when the cache cannot serve
    /// it. Re-setting the current key is a no-op; `None` clears the state.
    pub fn set_query(&self, key: Option<QueryKey>, query_fn: QueryFn<V>) {
        let mut observation = self.shared.observation.lock();
        if observation.key == key {
            return;
        }
        if let Some(key) = &key {
            tracing::debug!("Observing {}", key);
            self.shared.cache.retain(key);
        }
        let previous = std::mem::replace(&mut observation.key, key);
        if let Some(previous) = &previous {
            self.shared.cache.release(previous);
        }
        observation.query_fn = Some(query_fn);
        self.shared.start(&mut observation);
    }

    pub fn clear(&self) {
        let mut observation = self.shared.observation.lock();
        let Some(previous) = observation.key.take() else {
            return;
        };
        self.shared.cache.release(&previous);
        observation.query_fn = None;
        self.shared.start(&mut observation);
    }

    /// Re-read the current key, fetching if it is stale.
    pub fn refetch(&self) {
        let mut observation = self.shared.observation.lock();
        self.shared.start(&mut observation);
    }

    pub fn key(&self) -> Option<QueryKey> {
        self.shared.observation.lock().key.clone()
    }

    pub fn state(&self) -> QueryState<V> {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<QueryState<V>> {
        self.shared.state.subscribe()
    }

    /// Wait until the current observation is no longer loading.
    pub async fn settled(&self) -> QueryState<V> {
        let mut state = self.subscribe();
        let settled = match state.wait_for(|s| !s.is_loading).await {
            Ok(value) => Some((*value).clone()),
            Err(_) => None,
        };
        settled.unwrap_or_else(|| self.state())
    }
}

impl<V> Drop for QueryObserver<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.shared.cancel.cancel();
        if let Some(key) = self.shared.observation.lock().key.take() {
            self.shared.cache.release(&key);
        }
    }
}
