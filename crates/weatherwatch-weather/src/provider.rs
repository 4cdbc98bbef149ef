use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone, Utc};
use futures::future::try_join_all;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use weatherwatch_core::WeatherConfig;

use crate::geocode::parse_search_response;
use crate::retry::{with_retry, RetryConfig};
use crate::types::{
    CandidateLocation, CurrentWeather, Location, SearchCandidate, TemperatureUnit, WeatherCondition,
    WeatherError,
};

/// Source of candidate places and their weather.
///
/// The screen only ever talks to this trait; tests substitute scripted
/// implementations.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Places matching `query`, ranked by relevance, each with current
    /// conditions in `unit`. May be empty.
    async fn search(
        &self,
        query: &str,
        unit: TemperatureUnit,
    ) -> Result<Vec<SearchCandidate>, WeatherError>;

    /// Current conditions for a watched location.
    async fn current(
        &self,
        location: &Location,
        unit: TemperatureUnit,
    ) -> Result<CurrentWeather, WeatherError>;
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: CurrentBlock,
}

#[derive(Debug, Deserialize)]
struct CurrentBlock {
    #[serde(default)]
    time: Option<String>,
    temperature_2m: f64,
    apparent_temperature: f64,
    relative_humidity_2m: f64,
    wind_speed_10m: f64,
    weather_code: i32,
}

impl CurrentBlock {
    fn into_weather(self) -> CurrentWeather {
        // Open-Meteo reports GMT times without an offset, minute precision
        let updated_at = self
            .time
            .as_deref()
            .and_then(|t| NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M").ok())
            .map(|naive| Utc.from_utc_datetime(&naive))
            .unwrap_or_else(Utc::now);

        CurrentWeather {
            temperature: self.temperature_2m,
            feels_like: self.apparent_temperature,
            humidity: self.relative_humidity_2m.round().clamp(0.0, 100.0) as u8,
            wind_speed: self.wind_speed_10m,
            condition: WeatherCondition::from_wmo_code(self.weather_code),
            updated_at,
        }
    }
}

fn temperature_param(unit: TemperatureUnit) -> &'static str {
    match unit {
        TemperatureUnit::Celsius => "celsius",
        TemperatureUnit::Fahrenheit => "fahrenheit",
    }
}

fn wind_speed_param(unit: TemperatureUnit) -> &'static str {
    match unit {
        TemperatureUnit::Celsius => "kmh",
        TemperatureUnit::Fahrenheit => "mph",
    }
}

/// HTTP provider: Nominatim-compatible geocoding plus Open-Meteo-compatible
/// current conditions.
#[derive(Debug, Clone)]
pub struct WeatherProvider {
    client: Arc<Client>,
    geocoding_url: String,
    forecast_url: String,
    max_suggestions: u32,
    retry: RetryConfig,
}

impl WeatherProvider {
    pub fn new(config: &WeatherConfig) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client: Arc::new(client),
            geocoding_url: config.geocoding_url.trim_end_matches('/').to_string(),
            forecast_url: config.forecast_url.trim_end_matches('/').to_string(),
            max_suggestions: config.max_suggestions,
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, WeatherError> {
        let body = self.get_text(url, params).await?;
        serde_json::from_str(&body).map_err(|e| WeatherError::Parse(e.to_string()))
    }

    async fn get_text(&self, url: &str, params: &[(&str, String)]) -> Result<String, WeatherError> {
        let response = with_retry(&self.retry, || self.client.get(url).query(params).send()).await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!("Provider request to {} failed with {}", url, status);
            return Err(WeatherError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.text().await?)
    }

    async fn geocode(&self, query: &str) -> Result<Vec<CandidateLocation>, WeatherError> {
        let url = format!("{}/search", self.geocoding_url);
        let params = [
            ("q", query.to_string()),
            ("format", "jsonv2".to_string()),
            ("addressdetails", "1".to_string()),
            ("limit", self.max_suggestions.to_string()),
        ];
        let body = self.get_text(&url, &params).await?;
        let mut candidates = parse_search_response(&body)?;
        candidates.truncate(self.max_suggestions as usize);
        Ok(candidates)
    }

    async fn current_at(
        &self,
        lat: f64,
        lon: f64,
        unit: TemperatureUnit,
    ) -> Result<CurrentWeather, WeatherError> {
        let url = format!("{}/v1/forecast", self.forecast_url);
        let params = [
            ("latitude", lat.to_string()),
            ("longitude", lon.to_string()),
            (
                "current",
                "temperature_2m,apparent_temperature,relative_humidity_2m,wind_speed_10m,weather_code"
                    .to_string(),
            ),
            ("temperature_unit", temperature_param(unit).to_string()),
            ("wind_speed_unit", wind_speed_param(unit).to_string()),
        ];
        let response: ForecastResponse = self.get_json(&url, &params).await?;
        Ok(response.current.into_weather())
    }
}

#[async_trait]
impl WeatherSource for WeatherProvider {
    async fn search(
        &self,
        query: &str,
        unit: TemperatureUnit,
    ) -> Result<Vec<SearchCandidate>, WeatherError> {
        let places = self.geocode(query).await?;
        tracing::debug!("Geocoded '{}' to {} candidates", query, places.len());

        // one weather lookup per candidate, in ranking order
        let weather = try_join_all(
            places
                .iter()
                .map(|place| self.current_at(place.lat, place.lon, unit)),
        )
        .await?;

        Ok(places
            .into_iter()
            .zip(weather)
            .map(|(location, weather)| SearchCandidate {
                location,
                weather,
                unit,
            })
            .collect())
    }

    async fn current(
        &self,
        location: &Location,
        unit: TemperatureUnit,
    ) -> Result<CurrentWeather, WeatherError> {
        self.current_at(location.lat, location.lon, unit).await
    }
}
