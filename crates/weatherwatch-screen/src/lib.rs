//! Screen controller for Weather Watch.
//!
//! Ties the search box, suggestion popover, unit toggle, refresh control and
//! watch-list cards to the services in `weatherwatch-services`. Rendering is
//! left to the host; it reads state from [`ScreenController`] and forwards
//! user events to it.

pub mod cards;
pub mod controller;
pub mod error;
pub mod navigation;
pub mod popover;

pub use cards::{CardState, WatchCard, WatchGrid, WeatherCache};
pub use controller::{ScreenController, ScreenOptions, ScreenServices, DEFAULT_DEBOUNCE};
pub use error::ScreenError;
pub use navigation::{LoggingNavigator, Navigator, DETAILED_SEARCH_ROUTE};
pub use popover::PopoverState;
