use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use weatherwatch_core::TemperatureUnit;

/// Weather condition categories mapped from WMO codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    #[default]
    Clear,
    PartlyCloudy,
    Cloudy,
    Fog,
    Drizzle,
    Rain,
    HeavyRain,
    Snow,
    Sleet,
    Thunderstorm,
}

impl WeatherCondition {
    /// Convert WMO weather code to WeatherCondition
    /// See: https://open-meteo.com/en/docs#weathervariables
    pub fn from_wmo_code(code: i32) -> Self {
        match code {
            0 => Self::Clear,
            1..=2 => Self::PartlyCloudy,
            3 => Self::Cloudy,
            45 | 48 => Self::Fog,
            51 | 53 | 55 => Self::Drizzle,
            56 | 57 | 66 | 67 => Self::Sleet, // Freezing drizzle / rain
            61 | 63 | 80 => Self::Rain,
            65 | 81 | 82 => Self::HeavyRain,
            71 | 73 | 75 | 77 | 85 | 86 => Self::Snow,
            95 | 96 | 99 => Self::Thunderstorm,
            _ => Self::Clear,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::PartlyCloudy => "Partly Cloudy",
            Self::Cloudy => "Cloudy",
            Self::Fog => "Fog",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::HeavyRain => "Heavy Rain",
            Self::Snow => "Snow",
            Self::Sleet => "Sleet",
            Self::Thunderstorm => "Thunderstorm",
        }
    }
}

/// A watched location.
///
/// `id` is the provider's place identifier and the dedup key of the watch
/// list. Coordinates are unit independent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: String,
    pub display_place: String,
    pub display_address: String,
    pub lat: f64,
    pub lon: f64,
}

/// Place identity fields of a search hit, as returned by the geocoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateLocation {
    pub place_id: String,
    pub display_place: String,
    pub display_address: String,
    pub display_name: String,
    pub lat: f64,
    pub lon: f64,
}

/// Current conditions in a specific unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: u8,
    pub wind_speed: f64,
    pub condition: WeatherCondition,
    pub updated_at: DateTime<Utc>,
}

impl CurrentWeather {
    /// e.g. "12°C"
    pub fn format_temperature(&self, unit: TemperatureUnit) -> String {
        format!("{:.0}{}", self.temperature, unit.symbol())
    }
}

/// One autocomplete suggestion: a place plus its weather in `unit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub location: CandidateLocation,
    pub weather: CurrentWeather,
    pub unit: TemperatureUnit,
}

impl SearchCandidate {
    /// The watch-list entry created when this suggestion is selected.
    pub fn to_location(&self) -> Location {
        Location {
            id: self.location.place_id.clone(),
            display_place: self.location.display_place.clone(),
            display_address: self.location.display_address.clone(),
            lat: self.location.lat,
            lon: self.location.lon,
        }
    }
}

/// Weather provider errors
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Provider returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Location not found: {0}")]
    NotFound(String),
    #[error("Weather service unavailable: {0}")]
    Unavailable(String),
}

impl WeatherError {
    pub fn user_message(&self) -> &'static str {
        match self {
            WeatherError::Network(_) => "Unable to reach the weather service. Check your connection.",
            WeatherError::Status { status, .. } if *status >= 500 => {
                "The weather service is having issues. Please try again later."
            }
            WeatherError::Status { .. } => "The weather request failed. Please try again.",
            WeatherError::Parse(_) => "Received unexpected weather data. Please try again.",
            WeatherError::NotFound(_) => "Location not found. Check and try again.",
            WeatherError::Unavailable(_) => "Weather service unavailable. Please try again later.",
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn sample_candidate() -> SearchCandidate {
        SearchCandidate {
            location: CandidateLocation {
                place_id: "318514794".into(),
                display_place: "Seattle".into(),
                display_address: "WA, USA".into(),
                display_name: "Seattle, WA, USA".into(),
                lat: 47.6038321,
                lon: -122.330062,
            },
            weather: CurrentWeather {
                temperature: 12.4,
                feels_like: 11.0,
                humidity: 81,
                wind_speed: 9.5,
                condition: WeatherCondition::Cloudy,
                updated_at: Utc::now(),
            },
            unit: TemperatureUnit::Celsius,
        }
    }

    #[test]
    fn test_wmo_code_mapping() {
        assert_eq!(WeatherCondition::from_wmo_code(0), WeatherCondition::Clear);
        assert_eq!(WeatherCondition::from_wmo_code(2), WeatherCondition::PartlyCloudy);
        assert_eq!(WeatherCondition::from_wmo_code(48), WeatherCondition::Fog);
        assert_eq!(WeatherCondition::from_wmo_code(66), WeatherCondition::Sleet);
        assert_eq!(WeatherCondition::from_wmo_code(82), WeatherCondition::HeavyRain);
        assert_eq!(WeatherCondition::from_wmo_code(96), WeatherCondition::Thunderstorm);
    }

    #[test]
    fn test_wmo_code_unknown_defaults_to_clear() {
        assert_eq!(WeatherCondition::from_wmo_code(999), WeatherCondition::Clear);
        assert_eq!(WeatherCondition::from_wmo_code(-1), WeatherCondition::Clear);
    }

    #[test]
    fn test_candidate_to_location_keeps_identity() {
        let candidate = sample_candidate();
        let location = candidate.to_location();
        assert_eq!(location.id, "318514794");
        assert_eq!(location.display_place, "Seattle");
        assert_eq!(location.display_address, "WA, USA");
        assert_eq!(location.lat, 47.6038321);
        assert_eq!(location.lon, -122.330062);
    }

    #[test]
    fn test_location_serializes_camel_case() {
        let location = sample_candidate().to_location();
        let json = serde_json::to_value(&location).unwrap();
        assert_eq!(json["displayPlace"], "Seattle");
        assert_eq!(json["displayAddress"], "WA, USA");
        assert!(json.get("display_place").is_none());
    }

    #[test]
    fn test_format_temperature() {
        let candidate = sample_candidate();
        assert_eq!(candidate.weather.format_temperature(TemperatureUnit::Celsius), "12°C");
    }

    #[test]
    fn test_error_user_messages() {
        let err = WeatherError::Status { status: 503, message: "down".into() };
        assert!(err.user_message().contains("having issues"));
        let err = WeatherError::Status { status: 404, message: "missing".into() };
        assert!(err.user_message().contains("failed"));
    }
}
