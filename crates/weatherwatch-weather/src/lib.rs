//! Weather and geocoding for Weather Watch
//!
//! Domain types shared by every crate, the `WeatherSource` seam the screen
//! fetches through, and an HTTP implementation of it.

pub mod geocode;
pub mod provider;
pub mod retry;
pub mod types;

pub use provider::{WeatherProvider, WeatherSource};
pub use retry::RetryConfig;
pub use types::*;
