//! Color constants for the terminal board.

use ratatui::style::Color;

use kanban_board::fields::{Priority, Status};

pub const DARK_GREEN: Color = Color::Rgb(0, 80, 0);
pub const GOLD: Color = Color::Rgb(255, 215, 0);
pub const DARK_RED: Color = Color::Rgb(114, 0, 0);
pub const DARK_PURPLE: Color = Color::Rgb(86, 60, 92);
/// Card being carried.
pub const DRAG_BLUE: Color = Color::Rgb(30, 90, 200);

/// Accent for a column's border and the status bar while it is selected.
pub fn status_color(status: Status) -> Color {
    match status {
        Status::Todo => DARK_PURPLE,
        Status::InProgress => GOLD,
        Status::Done => DARK_GREEN,
    }
}

pub fn priority_color(priority: Priority) -> Color {
    match priority {
        Priority::Urgent => Color::Red,
        Priority::High => Color::LightRed,
        Priority::Med => Color::Yellow,
        Priority::Low => Color::Green,
        Priority::None => Color::Gray,
    }
}
