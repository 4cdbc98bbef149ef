use std::sync::Arc;

use tokio::sync::watch;

use weatherwatch_core::TemperatureUnit;
use weatherwatch_weather::{SearchCandidate, WeatherSource};

use crate::invalidation::InvalidationCoordinator;
use crate::observer::{QueryObserver, QueryState};
use crate::query_cache::{QueryCache, QueryFn, QueryFuture};
use crate::query_key::search_key;

pub type SearchState = QueryState<Vec<SearchCandidate>>;
pub type SearchCache = QueryCache<Vec<SearchCandidate>>;

/// Autocomplete lookups keyed by (query, unit).
///
/// Holds one observation at a time: the latest call to [`search`](Self::search)
/// wins and earlier in-flight lookups are ignored when they land.
pub struct SearchEngine {
    source: Arc<dyn WeatherSource>,
    observer: QueryObserver<Vec<SearchCandidate>>,
}

impl SearchEngine {
    pub fn new(
        source: Arc<dyn WeatherSource>,
        cache: Arc<SearchCache>,
        coordinator: &InvalidationCoordinator,
    ) -> Self {
        Self {
            source,
            observer: QueryObserver::new(cache, coordinator),
        }
    }

    /// Look up `query` in `unit`. A blank query clears the state without
    /// touching the provider.
    pub fn search(&self, query: &str, unit: TemperatureUnit) -> SearchState {
        let text = query.trim();
        if text.is_empty() {
            self.observer.clear();
            return self.state();
        }

        let source = Arc::clone(&self.source);
        let text = text.to_string();
        let key = search_key(&text, unit);
        let query_fn: QueryFn<Vec<SearchCandidate>> =
            Arc::new(move || -> QueryFuture<Vec<SearchCandidate>> {
                let source = Arc::clone(&source);
                let text = text.clone();
                Box::pin(async move { source.search(&text, unit).await })
            });

        self.observer.set_query(Some(key), query_fn);
        self.state()
    }

    pub fn state(&self) -> SearchState {
        self.observer.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.observer.subscribe()
    }

    pub fn refetch(&self) {
        self.observer.refetch();
    }

    pub async fn settled(&self) -> SearchState {
        self.observer.settled().await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;

    use super::*;
    use crate::query_cache::{DEFAULT_GC_TIME, DEFAULT_STALE_TIME};
    use crate::query_key::weather_prefix;
    use weatherwatch_weather::{
        CandidateLocation, CurrentWeather, Location, WeatherCondition, WeatherError,
    };

    /// Answers every query with one candidate named after the query.
    #[derive(Default)]
    struct ScriptedSource {
        calls: AtomicUsize,
        queries: Mutex<Vec<(String, TemperatureUnit)>>,
        fail: std::sync::atomic::AtomicBool,
    }

    impl ScriptedSource {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WeatherSource for ScriptedSource {
        async fn search(
            &self,
            query: &str,
            unit: TemperatureUnit,
        ) -> Result<Vec<SearchCandidate>, WeatherError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().push((query.to_string(), unit));
            if self.fail.load(Ordering::SeqCst) {
                return Err(WeatherError::Unavailable("scripted".into()));
            }
            let temperature = match unit {
                TemperatureUnit::Celsius => 10.0,
                TemperatureUnit::Fahrenheit => 50.0,
            };
            Ok(vec![SearchCandidate {
                location: CandidateLocation {
                    place_id: format!("id-{}", query.to_lowercase()),
                    display_place: query.to_string(),
                    display_address: "Somewhere".into(),
                    display_name: format!("{query}, Somewhere"),
                    lat: 1.0,
                    lon: 2.0,
                },
                weather: CurrentWeather {
                    temperature,
                    feels_like: temperature,
                    humidity: 50,
                    wind_speed: 3.0,
                    condition: WeatherCondition::Clear,
                    updated_at: Utc::now(),
                },
                unit,
            }])
        }

        async fn current(
            &self,
            _location: &Location,
            _unit: TemperatureUnit,
        ) -> Result<CurrentWeather, WeatherError> {
            Err(WeatherError::NotFound("not scripted".into()))
        }
    }

    fn engine() -> (SearchEngine, Arc<ScriptedSource>, Arc<InvalidationCoordinator>) {
        let source = Arc::new(ScriptedSource::default());
        let cache = Arc::new(SearchCache::new(DEFAULT_STALE_TIME));
        let coordinator = Arc::new(InvalidationCoordinator::new());
        coordinator.register(cache.clone());
        let engine = SearchEngine::new(source.clone(), cache, &coordinator);
        (engine, source, coordinator)
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_query_never_fetches() {
        let (engine, source, _coordinator) = engine();

        for query in ["", "   ", "\t"] {
            let state = engine.search(query, TemperatureUnit::Celsius);
            assert!(state.data.is_none());
            assert!(!state.is_loading);
            assert!(state.error.is_none());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_resolves_candidates() {
        let (engine, source, _coordinator) = engine();

        let state = engine.search("Seattle", TemperatureUnit::Celsius);
        assert!(state.is_loading);

        let state = engine.settled().await;
        let data = state.data.unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].location.display_place, "Seattle");
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_is_trimmed_before_provider() {
        let (engine, source, _coordinator) = engine();

        engine.search("  Seattle  ", TemperatureUnit::Celsius);
        engine.settled().await;

        assert_eq!(
            source.queries.lock().as_slice(),
            &[("Seattle".to_string(), TemperatureUnit::Celsius)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unit_change_refetches() {
        let (engine, source, _coordinator) = engine();

        engine.search("Seattle", TemperatureUnit::Celsius);
        engine.settled().await;
        engine.search("Seattle", TemperatureUnit::Fahrenheit);
        let state = engine.settled().await;

        assert_eq!(source.calls(), 2);
        assert_eq!(state.data.unwrap()[0].weather.temperature, 50.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_query_is_served_from_cache() {
        let (engine, source, _coordinator) = engine();

        engine.search("Seattle", TemperatureUnit::Celsius);
        engine.settled().await;
        engine.search("Paris", TemperatureUnit::Celsius);
        engine.settled().await;
        let state = engine.search("seattle", TemperatureUnit::Celsius);

        assert!(!state.is_loading);
        assert_eq!(state.data.unwrap()[0].location.display_place, "Seattle");
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidation_refetches_open_search() {
        let (engine, source, coordinator) = engine();

        engine.search("Seattle", TemperatureUnit::Celsius);
        engine.settled().await;
        coordinator.invalidate(&weather_prefix());
        tokio::time::sleep(Duration::from_millis(1)).await;
        engine.settled().await;

        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_queries_are_evicted() {
        let source = Arc::new(ScriptedSource::default());
        let cache = Arc::new(SearchCache::new(DEFAULT_STALE_TIME));
        let coordinator = InvalidationCoordinator::new();
        let engine = SearchEngine::new(source.clone(), cache.clone(), &coordinator);

        for i in 0..200 {
            engine.search(&format!("place {i}"), TemperatureUnit::Celsius);
            engine.settled().await;
        }
        assert_eq!(source.calls(), 200);

        // the open search stays cached, the ones typed over do not
        tokio::time::sleep(DEFAULT_GC_TIME + Duration::from_secs(1)).await;
        assert_eq!(cache.len(), 1);

        engine.search("", TemperatureUnit::Celsius);
        tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_error_surfaces_in_state() {
        let (engine, source, _coordinator) = engine();
        source.fail.store(true, Ordering::SeqCst);

        engine.search("Atlantis", TemperatureUnit::Celsius);
        let state = engine.settled().await;

        assert!(state.data.is_none());
        assert!(matches!(
            state.error.as_deref(),
            Some(WeatherError::Unavailable(_))
        ));
    }
}
