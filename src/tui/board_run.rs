//! Terminal board entry point and setup.

use std::io;

use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{prelude::CrosstermBackend, Terminal};
use tokio::runtime::Handle;

use kanban_board::drag::DragEngine;
use kanban_board::store::TaskStore;

use crate::tui::board::BoardApp;

/// Take over the terminal and run the board until the user quits.
///
/// Must be called from a thread that may block inside a tokio runtime, e.g. under
/// `tokio::task::block_in_place`.
pub fn run_board_tui(store: TaskStore, drag: DragEngine) -> io::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = BoardApp::new(store, drag, Handle::current());
    let result = app.run(&mut terminal);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}
