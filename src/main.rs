use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use weatherwatch_core::{AppError, Config};
use weatherwatch_screen::{LoggingNavigator, ScreenController, ScreenOptions, ScreenServices};
use weatherwatch_services::{JsonFileStore, LocationStore, Preferences, UnitPreferenceStore};
use weatherwatch_weather::{Location, WeatherProvider};

/// Search for a place and show the watched locations' weather
#[derive(Parser)]
#[command(name = "weatherwatch")]
#[command(version, about = "Weather Watch", long_about = None)]
struct Cli {
    /// Pin the first suggestion to the watch list
    #[arg(long)]
    add: bool,

    /// Switch the temperature unit before searching
    #[arg(long)]
    toggle_unit: bool,

    /// Place to search for
    query: Vec<String>,
}

impl Cli {
    fn query(&self) -> String {
        self.query.join(" ")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let query = cli.query();

    let (config, _) = Config::load_validated()?;
    weatherwatch_core::init_with_level(&config.logging.level)?;

    let provider = WeatherProvider::new(&config.weather)
        .map_err(|e| AppError::Weather(e.to_string()))
        .context("Failed to build weather provider")?;

    let locations = Arc::new(LocationStore::open(Arc::new(
        JsonFileStore::<Vec<Location>>::new(config.locations_path()),
    )));
    let units = Arc::new(UnitPreferenceStore::open(
        Arc::new(JsonFileStore::<Preferences>::new(config.preferences_path())),
        config.weather.temperature_unit,
    ));

    let mut screen = ScreenController::new(
        ScreenServices {
            source: Arc::new(provider),
            locations,
            units,
            navigator: Arc::new(LoggingNavigator),
        },
        ScreenOptions::from_config(&config),
    );

    println!("Weather Watch");
    if cli.toggle_unit {
        screen.toggle_unit();
    }
    println!("{}", screen.unit_label());

    if !query.is_empty() {
        screen.on_input_change(query.clone());
        tokio::time::sleep(config.search.debounce() + Duration::from_millis(20)).await;
        let state = screen.settled_search().await;

        if let Some(error) = &state.error {
            tracing::error!("Search for '{}' failed: {}", query, error);
            println!("\nSearch failed: {}", error.user_message());
        }

        let suggestions = screen.suggestions();
        println!("\nSuggestions for '{}':", query);
        if suggestions.is_empty() {
            println!("  (none)");
        }
        for (i, candidate) in suggestions.iter().enumerate() {
            println!(
                "  {}. {}  {}",
                i + 1,
                candidate.location.display_name,
                candidate.weather.format_temperature(candidate.unit)
            );
        }

        if cli.add && !suggestions.is_empty() {
            let location = screen.select_suggestion(0)?;
            println!("\nAdded {} to the watch list", location.display_place);
        }
    }

    screen.settled().await;
    let cards = screen.cards();
    println!("\nWatch list ({}):", cards.len());
    for card in &cards {
        println!(
            "  {}, {}: {}",
            card.location.display_place,
            card.location.display_address,
            card.status_text()
        );
    }

    if let Some(warning) = screen.persistence_warning() {
        println!("\nWarning: {}", warning);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_query_words_are_joined() {
        let cli = Cli::try_parse_from(["weatherwatch", "New", "York"]).unwrap();
        assert_eq!(cli.query(), "New York");
        assert!(!cli.add);
        assert!(!cli.toggle_unit);
    }

    #[test]
    fn test_flags_mix_with_query_words() {
        let cli =
            Cli::try_parse_from(["weatherwatch", "--add", "Seattle", "--toggle-unit"]).unwrap();
        assert_eq!(cli.query(), "Seattle");
        assert!(cli.add);
        assert!(cli.toggle_unit);
    }

    #[test]
    fn test_no_query_is_empty() {
        let cli = Cli::try_parse_from(["weatherwatch"]).unwrap();
        assert!(cli.query().is_empty());
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        assert!(Cli::try_parse_from(["weatherwatch", "--celsius"]).is_err());
    }
}
