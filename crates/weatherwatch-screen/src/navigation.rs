/// Route of the detailed search page.
pub const DETAILED_SEARCH_ROUTE: &str = "/search";

/// Outward navigation triggered from the screen.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);

    fn navigate_to_detailed_search(&self) {
        self.navigate(DETAILED_SEARCH_ROUTE);
    }
}

/// Navigator for hosts without routing; records the request in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNavigator;

impl Navigator for LoggingNavigator {
    fn navigate(&self, route: &str) {
        tracing::info!("Navigation requested: {}", route);
    }
}
