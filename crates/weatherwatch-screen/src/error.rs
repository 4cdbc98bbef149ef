use thiserror::Error;

/// Misuse of the screen controller by its host.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScreenError {
    #[error("No suggestion at index {index} ({available} shown)")]
    NoSuchSuggestion { index: usize, available: usize },
}

impl ScreenError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ScreenError::NoSuchSuggestion { .. } => {
                "That suggestion is no longer available. Try searching again."
            }
        }
    }
}
