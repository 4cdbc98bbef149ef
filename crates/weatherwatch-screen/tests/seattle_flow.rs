//! End-to-end screen scenarios against a scripted weather source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use weatherwatch_core::TemperatureUnit;
use weatherwatch_screen::{
    LoggingNavigator, PopoverState, ScreenController, ScreenOptions, ScreenServices,
};
use weatherwatch_services::{LocationStore, MemoryStore, UnitPreferenceStore};
use weatherwatch_weather::{
    CandidateLocation, CurrentWeather, Location, SearchCandidate, WeatherCondition, WeatherError,
    WeatherSource,
};

const SEATTLE_ID: &str = "318514794";
const SEATTLE_LAT: f64 = 47.6038321;
const SEATTLE_LON: f64 = -122.330062;

fn seattle_celsius() -> f64 {
    11.0
}

fn to_unit(celsius: f64, unit: TemperatureUnit) -> f64 {
    match unit {
        TemperatureUnit::Celsius => celsius,
        TemperatureUnit::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
    }
}

fn conditions(unit: TemperatureUnit) -> CurrentWeather {
    let temperature = to_unit(seattle_celsius(), unit);
    CurrentWeather {
        temperature,
        feels_like: temperature,
        humidity: 81,
        wind_speed: 7.0,
        condition: WeatherCondition::Rain,
        updated_at: Utc::now(),
    }
}

/// Knows Seattle and anything prefixed "Sea"; lookups for a query can be
/// delayed or made to hang.
#[derive(Default)]
struct ScriptedSource {
    delays: HashMap<String, Duration>,
    hanging: Vec<String>,
    searches: AtomicUsize,
    currents: AtomicUsize,
    celsius_searches: AtomicUsize,
    celsius_currents: AtomicUsize,
}

impl ScriptedSource {
    fn with_delay(mut self, query: &str, delay: Duration) -> Self {
        self.delays.insert(query.to_string(), delay);
        self
    }

    fn hanging_on(mut self, query: &str) -> Self {
        self.hanging.push(query.to_string());
        self
    }

    fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    fn currents(&self) -> usize {
        self.currents.load(Ordering::SeqCst)
    }

    fn celsius_reads(&self) -> (usize, usize) {
        (
            self.celsius_searches.load(Ordering::SeqCst),
            self.celsius_currents.load(Ordering::SeqCst),
        )
    }
}

#[async_trait]
impl WeatherSource for ScriptedSource {
    async fn search(
        &self,
        query: &str,
        unit: TemperatureUnit,
    ) -> Result<Vec<SearchCandidate>, WeatherError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if unit == TemperatureUnit::Celsius {
            self.celsius_searches.fetch_add(1, Ordering::SeqCst);
        }
        if self.hanging.iter().any(|q| q == query) {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delays.get(query) {
            tokio::time::sleep(*delay).await;
        }

        let candidate = if query.eq_ignore_ascii_case("seattle") {
            SearchCandidate {
                location: CandidateLocation {
                    place_id: SEATTLE_ID.to_string(),
                    display_place: "Seattle".to_string(),
                    display_address: "WA, USA".to_string(),
                    display_name: "Seattle, WA, USA".to_string(),
                    lat: SEATTLE_LAT,
                    lon: SEATTLE_LON,
                },
                weather: conditions(unit),
                unit,
            }
        } else {
            SearchCandidate {
                location: CandidateLocation {
                    place_id: format!("partial-{}", query.to_lowercase()),
                    display_place: query.to_string(),
                    display_address: "Partial match".to_string(),
                    display_name: format!("{query}, Partial match"),
                    lat: 0.0,
                    lon: 0.0,
                },
                weather: conditions(unit),
                unit,
            }
        };
        Ok(vec![candidate])
    }

    async fn current(
        &self,
        _location: &Location,
        unit: TemperatureUnit,
    ) -> Result<CurrentWeather, WeatherError> {
        self.currents.fetch_add(1, Ordering::SeqCst);
        if unit == TemperatureUnit::Celsius {
            self.celsius_currents.fetch_add(1, Ordering::SeqCst);
        }
        Ok(conditions(unit))
    }
}

struct Screen {
    controller: ScreenController,
    source: Arc<ScriptedSource>,
    backend: Arc<MemoryStore<Vec<Location>>>,
}

fn mount(source: ScriptedSource) -> Screen {
    mount_with(source, ScreenOptions::default())
}

fn mount_with(source: ScriptedSource, options: ScreenOptions) -> Screen {
    let source = Arc::new(source);
    let backend = Arc::new(MemoryStore::<Vec<Location>>::new());
    let controller = ScreenController::new(
        ScreenServices {
            source: source.clone(),
            locations: Arc::new(LocationStore::open(backend.clone())),
            units: Arc::new(UnitPreferenceStore::new(TemperatureUnit::Celsius)),
            navigator: Arc::new(LoggingNavigator),
        },
        options,
    );
    Screen {
        controller,
        source,
        backend,
    }
}

async fn wait_past_debounce() {
    tokio::time::sleep(Duration::from_millis(320)).await;
}

/// Poll on the real clock until `ready` holds.
async fn wait_until(mut ready: impl FnMut() -> bool) {
    for _ in 0..5000 {
        if ready() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("screen did not settle in time");
}

#[tokio::test(start_paused = true)]
async fn seattle_add_then_toggle() {
    let mut screen = mount(ScriptedSource::default());
    let ui = &mut screen.controller;

    ui.on_input_change("Seattle");
    wait_past_debounce().await;
    ui.settled().await;

    let suggestions = ui.suggestions();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].location.display_name, "Seattle, WA, USA");

    let added = ui.select_suggestion(0).unwrap();
    assert_eq!(ui.input(), "");
    assert_eq!(ui.popover_state(), PopoverState::Hidden);
    assert!(ui.suggestions().is_empty());

    ui.settled().await;
    let cards = ui.cards();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].id(), SEATTLE_ID);
    assert_eq!(added.id, SEATTLE_ID);
    let celsius = cards[0].weather.data.as_ref().unwrap().temperature;
    assert_eq!(cards[0].temperature_text().as_deref(), Some("11°C"));

    ui.toggle_unit();
    tokio::time::sleep(Duration::from_millis(1)).await;
    ui.settled().await;

    let cards = ui.cards();
    assert_eq!(ui.unit_label(), "Unit: Fahrenheit");
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].location.id, SEATTLE_ID);
    assert_eq!(cards[0].location.lat, SEATTLE_LAT);
    assert_eq!(cards[0].location.lon, SEATTLE_LON);
    let fahrenheit = cards[0].weather.data.as_ref().unwrap().temperature;
    assert_ne!(celsius, fahrenheit);
    assert_eq!(cards[0].temperature_text().as_deref(), Some("52°F"));

    // the stored location is unit independent
    assert_eq!(screen.backend.stored().unwrap()[0].id, SEATTLE_ID);
}

#[tokio::test(start_paused = true)]
async fn late_partial_query_does_not_replace_final_results() {
    let source = ScriptedSource::default()
        .with_delay("Sea", Duration::from_millis(2000))
        .with_delay("Seattle", Duration::from_millis(50));
    let mut screen = mount(source);
    let ui = &mut screen.controller;

    ui.on_input_change("Sea");
    wait_past_debounce().await;
    ui.on_input_change("Seattle");
    wait_past_debounce().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(ui.suggestions()[0].location.display_name, "Seattle, WA, USA");

    // let the slow "Sea" lookup land
    tokio::time::sleep(Duration::from_millis(3000)).await;
    let suggestions = ui.suggestions();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].location.place_id, SEATTLE_ID);
    assert_eq!(screen.source.searches(), 2);
}

#[tokio::test(start_paused = true)]
async fn hanging_lookup_stays_loading() {
    let mut screen = mount(ScriptedSource::default().hanging_on("Atlantis"));
    let ui = &mut screen.controller;

    ui.on_input_change("Atlantis");
    wait_past_debounce().await;
    tokio::time::sleep(Duration::from_secs(600)).await;

    let state = ui.search_state();
    assert!(state.is_loading);
    assert!(state.data.is_none());
    assert!(ui.suggestions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn clearing_input_clears_search_without_fetching() {
    let mut screen = mount(ScriptedSource::default());
    let ui = &mut screen.controller;

    ui.on_input_change("Seattle");
    wait_past_debounce().await;
    ui.settled().await;
    assert_eq!(screen.source.searches(), 1);

    let ui = &mut screen.controller;
    ui.on_input_change("");
    assert_eq!(ui.popover_state(), PopoverState::Hidden);
    wait_past_debounce().await;

    assert!(ui.search_state().data.is_none());
    assert!(!ui.search_state().is_loading);
    assert_eq!(screen.source.searches(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_save_keeps_card_and_warns() {
    let mut screen = mount(ScriptedSource::default());
    screen.backend.set_fail_saves(true);
    let ui = &mut screen.controller;

    ui.on_input_change("Seattle");
    wait_past_debounce().await;
    ui.settled().await;
    ui.select_suggestion(0).unwrap();
    ui.settled().await;

    assert_eq!(ui.cards().len(), 1);
    assert!(ui.persistence_warning().is_some());
    assert!(screen.backend.stored().is_none());
    assert_eq!(screen.source.currents(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn toggle_on_worker_threads_never_refetches_old_unit() {
    let options = ScreenOptions {
        debounce: Duration::from_millis(1),
        ..ScreenOptions::default()
    };

    for _ in 0..25 {
        let mut screen = mount_with(ScriptedSource::default(), options);
        let ui = &mut screen.controller;

        ui.on_input_change("Seattle");
        wait_until(|| !ui.suggestions().is_empty()).await;
        ui.select_suggestion(0).unwrap();
        wait_until(|| {
            ui.cards()
                .first()
                .is_some_and(|card| card.weather.data.is_some())
        })
        .await;

        ui.on_input_change("Seattle");
        wait_until(|| ui.debounced_query() == "Seattle" && !ui.suggestions().is_empty()).await;
        // let the search pump go idle
        tokio::time::sleep(Duration::from_millis(20)).await;

        let before = screen.source.celsius_reads();
        let ui = &mut screen.controller;
        ui.toggle_unit();

        wait_until(|| {
            let search_in_f = ui
                .search_state()
                .data
                .is_some_and(|data| data[0].unit == TemperatureUnit::Fahrenheit);
            let card_in_f = ui
                .cards()
                .first()
                .and_then(|card| card.weather.data.clone())
                .is_some_and(|weather| weather.temperature > 50.0);
            search_in_f && card_in_f
        })
        .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(screen.source.celsius_reads(), before);
    }
}
