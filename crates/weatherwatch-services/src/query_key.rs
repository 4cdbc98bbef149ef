use std::fmt;

use weatherwatch_core::TemperatureUnit;

/// Category segment shared by every weather read.
pub const WEATHER_CATEGORY: &str = "open-weather";
pub const SEARCH_KIND: &str = "search";
pub const CURRENT_KIND: &str = "current";

/// Ordered key segments identifying one cached read.
///
/// Invalidation works on prefixes: `["open-weather"]` matches every weather
/// entry regardless of kind, unit or text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// Prefix of every weather read, used by refresh and unit toggle.
pub fn weather_prefix() -> QueryKey {
    QueryKey::new([WEATHER_CATEGORY])
}

/// Cache text for a typed query: trimmed and lower-cased.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

pub fn search_key(query: &str, unit: TemperatureUnit) -> QueryKey {
    QueryKey::new([
        WEATHER_CATEGORY.to_string(),
        SEARCH_KIND.to_string(),
        unit.code().to_string(),
        normalize_query(query),
    ])
}

pub fn current_key(location_id: &str, unit: TemperatureUnit) -> QueryKey {
    QueryKey::new([WEATHER_CATEGORY, CURRENT_KIND, unit.code(), location_id])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_key_segments() {
        let key = search_key("  Seattle ", TemperatureUnit::Celsius);
        assert_eq!(key.segments(), ["open-weather", "search", "metric", "seattle"]);
        assert_eq!(key.to_string(), "open-weather/search/metric/seattle");
    }

    #[test]
    fn test_unit_is_part_of_key() {
        assert_ne!(
            search_key("Seattle", TemperatureUnit::Celsius),
            search_key("Seattle", TemperatureUnit::Fahrenheit)
        );
        assert_eq!(
            search_key("Seattle", TemperatureUnit::Celsius),
            search_key("seattle", TemperatureUnit::Celsius)
        );
    }

    #[test]
    fn test_prefix_matching() {
        let current = current_key("318514794", TemperatureUnit::Fahrenheit);
        assert!(current.starts_with(&weather_prefix()));
        assert!(current.starts_with(&weather_prefix().child(CURRENT_KIND)));
        assert!(!current.starts_with(&weather_prefix().child(SEARCH_KIND)));
        assert!(!weather_prefix().starts_with(&current));
        assert!(!QueryKey::new(["other"]).starts_with(&weather_prefix()));
    }
}
