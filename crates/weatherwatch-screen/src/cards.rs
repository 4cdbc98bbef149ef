//! One weather card per watched location.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;

use weatherwatch_core::TemperatureUnit;
use weatherwatch_services::{
    current_key, InvalidationCoordinator, QueryCache, QueryFn, QueryFuture, QueryObserver,
    QueryState,
};
use weatherwatch_weather::{CurrentWeather, Location, WeatherSource};

pub type WeatherCache = QueryCache<CurrentWeather>;
pub type CardState = QueryState<CurrentWeather>;

#[derive(Debug, Clone)]
pub struct WatchCard {
    pub location: Location,
    pub unit: TemperatureUnit,
    pub weather: CardState,
}

impl WatchCard {
    pub fn id(&self) -> &str {
        &self.location.id
    }

    /// e.g. "12°C", once weather has arrived
    pub fn temperature_text(&self) -> Option<String> {
        self.weather
            .data
            .as_ref()
            .map(|w| w.format_temperature(self.unit))
    }

    pub fn status_text(&self) -> String {
        match (&self.weather.data, &self.weather.error) {
            (Some(weather), None) => format!(
                "{} {}",
                weather.format_temperature(self.unit),
                weather.condition.description()
            ),
            (_, Some(error)) => error.user_message().to_string(),
            (None, None) if self.weather.is_loading => "Loading...".to_string(),
            (None, None) => String::new(),
        }
    }
}

/// Keeps a current-weather observer per watched location, keyed by id.
pub struct WatchGrid {
    source: Arc<dyn WeatherSource>,
    cache: Arc<WeatherCache>,
    coordinator: Arc<InvalidationCoordinator>,
    observers: HashMap<String, QueryObserver<CurrentWeather>>,
    locations: Vec<Location>,
    unit: TemperatureUnit,
}

impl WatchGrid {
    pub fn new(
        source: Arc<dyn WeatherSource>,
        cache: Arc<WeatherCache>,
        coordinator: Arc<InvalidationCoordinator>,
        unit: TemperatureUnit,
    ) -> Self {
        Self {
            source,
            cache,
            coordinator,
            observers: HashMap::new(),
            locations: Vec::new(),
            unit,
        }
    }

    /// Match observers to `locations` in `unit`: new locations start
    /// observing, removed ones are dropped, a unit change re-keys the rest.
    pub fn sync(&mut self, locations: &[Location], unit: TemperatureUnit) {
        self.observers
            .retain(|id, _| locations.iter().any(|l| &l.id == id));

        let cache = &self.cache;
        let coordinator = &self.coordinator;
        for location in locations {
            let observer = self
                .observers
                .entry(location.id.clone())
                .or_insert_with(|| QueryObserver::new(Arc::clone(cache), coordinator));
            observer.set_query(
                Some(current_key(&location.id, unit)),
                current_query(Arc::clone(&self.source), location.clone(), unit),
            );
        }

        self.locations = locations.to_vec();
        self.unit = unit;
    }

    pub fn cards(&self) -> Vec<WatchCard> {
        self.locations
            .iter()
            .map(|location| WatchCard {
                location: location.clone(),
                unit: self.unit,
                weather: self
                    .observers
                    .get(&location.id)
                    .map(QueryObserver::state)
                    .unwrap_or_default(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Wait until no card is loading.
    pub async fn settled(&self) {
        join_all(self.observers.values().map(|observer| observer.settled())).await;
    }
}

fn current_query(
    source: Arc<dyn WeatherSource>,
    location: Location,
    unit: TemperatureUnit,
) -> QueryFn<CurrentWeather> {
    Arc::new(move || -> QueryFuture<CurrentWeather> {
        let source = Arc::clone(&source);
        let location = location.clone();
        Box::pin(async move { source.current(&location, unit).await })
    })
}
