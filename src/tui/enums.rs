//! Enumerations for terminal board state.

/// What the key handler is currently routing input to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BoardMode {
    /// Navigating cards, or carrying one while a drag is active.
    Board,
    /// Detail popup for the selected task.
    Detail,
    /// Typing the title of a new task.
    AddTask,
    /// Typing the search filter.
    Search,
}

impl BoardMode {
    /// Whether keystrokes go to the text input.
    pub fn is_text_entry(self) -> bool {
        matches!(self, BoardMode::AddTask | BoardMode::Search)
    }
}
