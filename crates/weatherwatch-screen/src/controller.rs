//! The Weather Watch screen: search box, suggestion popover, unit toggle,
//! refresh button and the watch-list cards.
//!
//! The controller owns the UI-local state (input text, popover) and wires
//! user events to the shared services. Keystrokes go through the debouncer;
//! a pump task forwards each debounced value to the search engine.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use weatherwatch_core::{Config, TemperatureUnit};
use weatherwatch_services::{
    weather_prefix, Debouncer, InvalidationCoordinator, LocationStore, SearchCache, SearchEngine,
    SearchState, UnitPreferenceStore, DEFAULT_GC_TIME, DEFAULT_STALE_TIME,
};
use weatherwatch_weather::{Location, SearchCandidate, WeatherSource};

use crate::cards::{WatchCard, WatchGrid, WeatherCache};
use crate::error::ScreenError;
use crate::navigation::Navigator;
use crate::popover::PopoverState;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy)]
pub struct ScreenOptions {
    pub debounce: Duration,
    pub stale_time: Duration,
    pub gc_time: Duration,
}

impl Default for ScreenOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            stale_time: DEFAULT_STALE_TIME,
            gc_time: DEFAULT_GC_TIME,
        }
    }
}

impl ScreenOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            debounce: config.search.debounce(),
            stale_time: config.cache.stale_time(),
            gc_time: config.cache.gc_time(),
        }
    }
}

/// Collaborators the screen is built from.
pub struct ScreenServices {
    pub source: Arc<dyn WeatherSource>,
    pub locations: Arc<LocationStore>,
    pub units: Arc<UnitPreferenceStore>,
    pub navigator: Arc<dyn Navigator>,
}

pub struct ScreenController {
    input: String,
    popover: PopoverState,
    debouncer: Debouncer<String>,
    search: Arc<SearchEngine>,
    locations: Arc<LocationStore>,
    units: Arc<UnitPreferenceStore>,
    coordinator: Arc<InvalidationCoordinator>,
    grid: WatchGrid,
    navigator: Arc<dyn Navigator>,
    cancel: CancellationToken,
}

impl ScreenController {
    /// Mount the screen. Must be called inside a tokio runtime.
    pub fn new(services: ScreenServices, options: ScreenOptions) -> Self {
        let ScreenServices {
            source,
            locations,
            units,
            navigator,
        } = services;

        let coordinator = Arc::new(InvalidationCoordinator::new());
        let search_cache =
            Arc::new(SearchCache::new(options.stale_time).with_gc_time(options.gc_time));
        let weather_cache =
            Arc::new(WeatherCache::new(options.stale_time).with_gc_time(options.gc_time));
        coordinator.register(search_cache.clone());
        coordinator.register(weather_cache.clone());

        let search = Arc::new(SearchEngine::new(
            Arc::clone(&source),
            search_cache,
            &coordinator,
        ));
        let debouncer = Debouncer::new(String::new(), options.debounce);
        let cancel = CancellationToken::new();

        spawn_search_pump(&debouncer, &search, &units, cancel.clone());

        let mut grid = WatchGrid::new(
            source,
            weather_cache,
            Arc::clone(&coordinator),
            units.unit(),
        );
        grid.sync(&locations.locations(), units.unit());

        tracing::info!(
            "Screen mounted with {} watched locations, unit {}",
            locations.len(),
            units.unit()
        );

        Self {
            input: String::new(),
            popover: PopoverState::Hidden,
            debouncer,
            search,
            locations,
            units,
            coordinator,
            grid,
            navigator,
            cancel,
        }
    }

    // --- search box ---

    pub fn on_input_change(&mut self, text: impl Into<String>) {
        self.input = text.into();
        self.popover = self.popover.on_input_changed(&self.input);
        self.debouncer.set(self.input.clone());
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn popover_state(&self) -> PopoverState {
        self.popover
    }

    /// Close the popover on blur or an outside click. The input is kept.
    pub fn dismiss_popover(&mut self) {
        self.popover = self.popover.on_dismissed();
    }

    /// The value the search engine is currently keyed on.
    pub fn debounced_query(&self) -> String {
        self.debouncer.current()
    }

    pub fn search_state(&self) -> SearchState {
        self.search.state()
    }

    /// Suggestions to list: empty unless the popover is open and data has
    /// arrived.
    pub fn suggestions(&self) -> Vec<SearchCandidate> {
        if !self.popover.is_visible() {
            return Vec::new();
        }
        self.search.state().data.unwrap_or_default()
    }

    /// Pin the suggestion at `index`: close the popover, clear the input and
    /// add the location, with nothing observable in between.
    pub fn select_suggestion(&mut self, index: usize) -> Result<Location, ScreenError> {
        let suggestions = self.suggestions();
        let candidate = suggestions
            .get(index)
            .ok_or(ScreenError::NoSuchSuggestion {
                index,
                available: suggestions.len(),
            })?;
        Ok(self.select_candidate(candidate))
    }

    pub fn select_candidate(&mut self, candidate: &SearchCandidate) -> Location {
        let location = candidate.to_location();

        self.popover = self.popover.on_selected();
        self.input.clear();
        self.debouncer.set(String::new());

        if self.locations.add_location(location.clone()) {
            self.sync_cards();
        }
        location
    }

    // --- controls ---

    /// Flip the unit and re-read every displayed weather value in it.
    ///
    /// The search and the cards move to the new unit's keys before observers
    /// hear of the invalidation, so no old-unit key is fetched again.
    pub fn toggle_unit(&mut self) -> TemperatureUnit {
        let unit = self.units.toggle_unit();
        let coordinator = Arc::clone(&self.coordinator);
        coordinator.invalidate_with(&weather_prefix(), || {
            self.search.search(&self.debouncer.current(), unit);
            self.sync_cards();
        });
        unit
    }

    /// Re-fetch all displayed weather. Returns how many cached reads were
    /// invalidated.
    pub fn refresh(&self) -> usize {
        self.coordinator.invalidate(&weather_prefix())
    }

    pub fn remove_location(&mut self, id: &str) -> bool {
        let removed = self.locations.remove_location(id);
        if removed {
            self.sync_cards();
        }
        removed
    }

    pub fn navigate_to_detailed_search(&self) {
        self.navigator.navigate_to_detailed_search();
    }

    // --- display ---

    pub fn unit(&self) -> TemperatureUnit {
        self.units.unit()
    }

    /// e.g. "Unit: Celsius"
    pub fn unit_label(&self) -> String {
        format!("Unit: {}", self.units.unit().label())
    }

    pub fn locations(&self) -> Vec<Location> {
        self.locations.locations()
    }

    pub fn cards(&self) -> Vec<WatchCard> {
        self.grid.cards()
    }

    pub fn persistence_warning(&self) -> Option<String> {
        self.locations
            .persistence_warning()
            .or_else(|| self.units.persistence_warning())
    }

    pub async fn settled_search(&self) -> SearchState {
        self.search.settled().await
    }

    /// Wait for the open search and every card to finish loading.
    pub async fn settled(&self) {
        self.search.settled().await;
        self.grid.settled().await;
    }

    fn sync_cards(&mut self) {
        let locations = self.locations.locations();
        self.grid.sync(&locations, self.units.unit());
    }
}

impl Drop for ScreenController {
    fn drop(&mut self) {
        self.cancel.cancel();
        tracing::debug!("Screen unmounted");
    }
}

fn spawn_search_pump(
    debouncer: &Debouncer<String>,
    search: &Arc<SearchEngine>,
    units: &Arc<UnitPreferenceStore>,
    cancel: CancellationToken,
) {
    let mut debounced = debouncer.subscribe();
    let search = Arc::clone(search);
    let units = Arc::clone(units);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = debounced.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let query = debounced.borrow_and_update().clone();
                    tracing::debug!("Debounced query: {:?}", query);
                    search.search(&query, units.unit());
                }
            }
        }
    });
}
