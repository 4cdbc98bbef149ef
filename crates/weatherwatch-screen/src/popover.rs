//! Suggestion popover visibility.
//!
//! Opening is driven only by user input; nothing programmatic reopens it.

/// Visibility of the suggestion list under the search box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PopoverState {
    #[default]
    Hidden,
    Visible,
}

impl PopoverState {
    /// State after the user edits the search box.
    pub fn on_input_changed(self, text: &str) -> Self {
        if text.trim().is_empty() {
            PopoverState::Hidden
        } else {
            PopoverState::Visible
        }
    }

    /// State after a suggestion was picked.
    pub fn on_selected(self) -> Self {
        PopoverState::Hidden
    }

    /// State after blur or an outside click.
    pub fn on_dismissed(self) -> Self {
        PopoverState::Hidden
    }

    pub fn is_visible(self) -> bool {
        matches!(self, PopoverState::Visible)
    }
}
