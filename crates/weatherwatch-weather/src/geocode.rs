//! Forward geocoding: turn a typed place name into ranked candidate places.
//! Speaks the Nominatim `/search` API (`format=jsonv2`); LocationIQ-style
//! responses with string ids and coordinates are accepted too.

use serde::Deserialize;

use crate::types::{CandidateLocation, WeatherError};

/// Values some geocoders send as numbers and others as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(serde_json::Number),
    String(String),
}

impl NumberOrString {
    fn into_string(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::String(s) => s,
        }
    }

    fn to_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            Self::String(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchHit {
    place_id: NumberOrString,
    lat: NumberOrString,
    lon: NumberOrString,
    display_name: String,
    #[serde(default)]
    name: Option<String>,
}

impl SearchHit {
    pub(crate) fn into_candidate(self) -> Result<CandidateLocation, WeatherError> {
        let lat = self
            .lat
            .to_f64()
            .ok_or_else(|| WeatherError::Parse(format!("invalid latitude for {}", self.display_name)))?;
        let lon = self
            .lon
            .to_f64()
            .ok_or_else(|| WeatherError::Parse(format!("invalid longitude for {}", self.display_name)))?;

        let (first, rest) = split_display_name(&self.display_name);
        let display_place = self
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| first.to_string());

        Ok(CandidateLocation {
            place_id: self.place_id.into_string(),
            display_place,
            display_address: rest,
            display_name: self.display_name,
            lat,
            lon,
        })
    }
}

/// Split "Seattle, WA, USA" into ("Seattle", "WA, USA").
pub fn split_display_name(display_name: &str) -> (&str, String) {
    let mut parts = display_name.split(',').map(str::trim).filter(|p| !p.is_empty());
    let first = parts.next().unwrap_or("");
    let rest = parts.collect::<Vec<_>>().join(", ");
    (first, rest)
}

/// Decode a geocoder response body into candidates, preserving ranking.
///
/// Hits with unusable coordinates are skipped rather than failing the whole
/// search.
pub fn parse_search_response(body: &str) -> Result<Vec<CandidateLocation>, WeatherError> {
    let hits: Vec<SearchHit> =
        serde_json::from_str(body).map_err(|e| WeatherError::Parse(e.to_string()))?;

    let mut candidates = Vec::with_capacity(hits.len());
    for hit in hits {
        match hit.into_candidate() {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => tracing::debug!("Skipping geocoder hit: {}", e),
        }
    }
    Ok(candidates)
}
