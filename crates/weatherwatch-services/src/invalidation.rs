use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::query_key::QueryKey;

/// A cache whose entries can be marked stale by key prefix.
pub trait Invalidate: Send + Sync {
    /// Mark every entry under `prefix` stale. Returns how many matched.
    fn invalidate(&self, prefix: &QueryKey) -> usize;
}

/// Broadcast after each invalidation so mounted observers re-check their key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationEvent {
    pub epoch: u64,
    pub prefix: Option<QueryKey>,
}

/// Fans an invalidation out to every registered cache, then notifies
/// observers.
///
/// Refresh and unit toggle both go through [`invalidate`](Self::invalidate)
/// with the weather prefix.
pub struct InvalidationCoordinator {
    caches: RwLock<Vec<Arc<dyn Invalidate>>>,
    events: watch::Sender<InvalidationEvent>,
}

impl Default for InvalidationCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl InvalidationCoordinator {
    pub fn new() -> Self {
        let (events, _) = watch::channel(InvalidationEvent::default());
        Self {
            caches: RwLock::new(Vec::new()),
            events,
        }
    }

    pub fn register(&self, cache: Arc<dyn Invalidate>) {
        self.caches.write().push(cache);
    }

    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        self.invalidate_with(prefix, || {})
    }

    /// Mark entries under `prefix` stale, run `rekey`, then notify observers.
    ///
    /// Observers moved to new keys inside `rekey` are only notified once they
    /// watch those keys, so none of them re-reads the key it just left.
    pub fn invalidate_with(&self, prefix: &QueryKey, rekey: impl FnOnce()) -> usize {
        let count: usize = self
            .caches
            .read()
            .iter()
            .map(|cache| cache.invalidate(prefix))
            .sum();

        rekey();

        self.events.send_modify(|event| {
            event.epoch += 1;
            event.prefix = Some(prefix.clone());
        });

        tracing::info!("Invalidated {} entries under {}", count, prefix);
        count
    }

    pub fn subscribe(&self) -> watch::Receiver<InvalidationEvent> {
        self.events.subscribe()
    }

    pub fn epoch(&self) -> u64 {
        self.events.borrow().epoch
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::query_key::weather_prefix;

    #[derive(Default)]
    struct CountingCache {
        calls: AtomicUsize,
    }

    impl Invalidate for CountingCache {
        fn invalidate(&self, _prefix: &QueryKey) -> usize {
            self.calls.fetch_add(1, Ordering::SeqCst);
            2
        }
    }

    #[test]
    fn test_invalidate_reaches_every_cache() {
        let coordinator = InvalidationCoordinator::new();
        let a = Arc::new(CountingCache::default());
        let b = Arc::new(CountingCache::default());
        coordinator.register(a.clone());
        coordinator.register(b.clone());

        assert_eq!(coordinator.invalidate(&weather_prefix()), 4);
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalidate_bumps_epoch_for_subscribers() {
        let coordinator = InvalidationCoordinator::new();
        let mut events = coordinator.subscribe();
        assert_eq!(coordinator.epoch(), 0);

        coordinator.invalidate(&weather_prefix());

        assert!(events.has_changed().unwrap_or(false));
        let event = events.borrow_and_update().clone();
        assert_eq!(event.epoch, 1);
        assert_eq!(event.prefix, Some(weather_prefix()));
    }

    #[test]
    fn test_rekey_runs_before_observers_are_notified() {
        let coordinator = InvalidationCoordinator::new();
        let cache = Arc::new(CountingCache::default());
        coordinator.register(cache.clone());
        let events = coordinator.subscribe();

        let mut seen_during_rekey = None;
        coordinator.invalidate_with(&weather_prefix(), || {
            seen_during_rekey = Some((
                cache.calls.load(Ordering::SeqCst),
                events.has_changed().unwrap_or(true),
            ));
        });

        // caches already marked, observers not yet told
        assert_eq!(seen_during_rekey, Some((1, false)));
        assert!(events.has_changed().unwrap_or(false));
    }

    #[test]
    fn test_invalidate_without_caches_is_harmless() {
        let coordinator = InvalidationCoordinator::new();
        assert_eq!(coordinator.invalidate(&weather_prefix()), 0);
        assert_eq!(coordinator.epoch(), 1);
    }
}
