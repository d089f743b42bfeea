//! Kanban board interface.
//!
//! Tasks are shown in one column per status. A card is picked up with Space,
//! carried with the arrow keys (each step is a drag-over preview) and dropped with
//! Space again; Esc cancels a carry. Every other edit goes through the store and
//! its remote half runs on the tokio runtime in the background.

use std::collections::HashMap;
use std::io;
use std::time::Duration;

use chrono::Local;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    backend::Backend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame, Terminal,
};
use tokio::runtime::Handle;

use kanban_board::derive::BoardView;
use kanban_board::drag::{DragEngine, DropTarget};
use kanban_board::fields::{Priority, Status};
use kanban_board::store::{NoticeLevel, Point, TaskStore};
use kanban_board::task::{AddTaskOptions, Task, TaskId};

use crate::format::{format_due, truncate};
use crate::tui::colors::{priority_color, status_color, DARK_RED, DRAG_BLUE, GOLD};
use crate::tui::enums::BoardMode;
use crate::tui::input::InputField;

const CARD_HEIGHT: usize = 4;
const HELP: &str = "Space: Pick up/Drop | Esc: Cancel | a: Add | p: Priority | x: Delete | u: Undo | /: Search | 1-5: Priority filter | r: Reset | R: Refresh | Enter: Details | q: Quit";

pub struct BoardApp {
    store: TaskStore,
    drag: DragEngine,
    runtime: Handle,
    mode: BoardMode,
    input: InputField,
    selected_column: usize,
    selected_card: usize,
    column_scroll_offsets: [usize; 3],
    status_message: String,
    /// Screen position of each card drawn in the last frame.
    card_areas: HashMap<TaskId, Rect>,
}

impl BoardApp {
    pub fn new(store: TaskStore, drag: DragEngine, runtime: Handle) -> Self {
        BoardApp {
            store,
            drag,
            runtime,
            mode: BoardMode::Board,
            input: InputField::new(),
            selected_column: 0,
            selected_card: 0,
            column_scroll_offsets: [0; 3],
            status_message: String::new(),
            card_areas: HashMap::new(),
        }
    }

    fn spawn<F>(&self, fut: F)
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(fut);
    }

    fn selected_status(&self) -> Status {
        Status::ALL[self.selected_column]
    }

    fn selected_task(&self, view: &BoardView) -> Option<Task> {
        view.columns
            .get(self.selected_column)?
            .tasks
            .get(self.selected_card)
            .cloned()
    }

    /// Keep the selection on a card that exists; while dragging, follow the carried card.
    fn sync_selection(&mut self, view: &BoardView) {
        if let Some(session) = self.drag.session() {
            for (col, column) in view.columns.iter().enumerate() {
                if let Some(pos) = column.tasks.iter().position(|t| t.id == session.active) {
                    self.selected_column = col;
                    self.selected_card = pos;
                    return;
                }
            }
        }
        let len = view.columns[self.selected_column].tasks.len();
        if len == 0 {
            self.selected_card = 0;
            self.column_scroll_offsets[self.selected_column] = 0;
        } else if self.selected_card >= len {
            self.selected_card = len - 1;
        }
    }

    /// Show the newest queued notice, or the celebration.
    fn absorb_notices(&mut self) {
        if let Some(notice) = self.store.take_notices().pop() {
            self.status_message = match notice.level {
                NoticeLevel::Info => notice.message,
                NoticeLevel::Error => format!("Error: {}", notice.message),
            };
        }
        if self.store.celebration().show {
            self.status_message = "Task completed! Nice work.".to_string();
        }
    }

    fn set_status_message(&mut self, msg: impl Into<String>) {
        self.status_message = msg.into();
    }

    // ---- drag ----------------------------------------------------------------

    fn pick_up_or_drop(&mut self, view: &BoardView) {
        if self.drag.is_dragging() {
            let Some(active) = self.drag.session().map(|s| s.active) else {
                return;
            };
            let Some(status) = self.store.task(&active).map(|t| t.status) else {
                return;
            };
            let position = self.card_areas.get(&active).map(|r| {
                Point::new(
                    f32::from(r.x) + f32::from(r.width) / 2.0,
                    f32::from(r.y) + f32::from(r.height) / 2.0,
                )
            });
            if let Some(persist) = self.drag.drag_end(Some(DropTarget::Column(status)), position) {
                self.spawn(persist);
            }
            self.set_status_message(format!("Dropped in {}", status.title()));
            return;
        }
        let Some(task) = self.selected_task(view) else {
            return;
        };
        match self.drag.drag_start(&task.id) {
            Ok(()) => self.set_status_message(format!("Carrying #{}: arrows to move, Space to drop, Esc to cancel", task.id)),
            Err(e) => self.set_status_message(format!("Error: {e}")),
        }
    }

    /// One arrow step while carrying a card.
    fn carry(&mut self, key: KeyCode, view: &BoardView) {
        let Some(active) = self.drag.session().map(|s| s.active) else {
            return;
        };
        let column = &view.columns[self.selected_column];
        let target = match key {
            KeyCode::Left if self.selected_column > 0 => {
                Some(DropTarget::Column(Status::ALL[self.selected_column - 1]))
            }
            KeyCode::Right if self.selected_column + 1 < Status::ALL.len() => {
                Some(DropTarget::Column(Status::ALL[self.selected_column + 1]))
            }
            KeyCode::Up => self
                .selected_card
                .checked_sub(1)
                .and_then(|i| column.tasks.get(i))
                .map(|t| DropTarget::Card(t.id.clone())),
            KeyCode::Down => column
                .tasks
                .get(self.selected_card + 1)
                .map(|t| DropTarget::Card(t.id.clone())),
            _ => None,
        };
        if let Some(target) = target {
            if self.drag.drag_over(&target) {
                tracing::debug!(task = %active, ?target, "carried");
            }
        }
    }

    // ---- edits ---------------------------------------------------------------

    fn cycle_priority(&mut self, task: &Task) {
        match self.store.update_priority(&task.id, task.priority.cycle()) {
            Ok(persist) => self.spawn(persist),
            Err(e) => self.set_status_message(format!("Error: {e}")),
        }
    }

    fn delete(&mut self, task: &Task) {
        match self.store.delete_task(&task.id) {
            Ok(persist) => {
                self.spawn(persist);
                self.set_status_message(format!("Deleted #{} (u to undo)", task.id));
            }
            Err(e) => self.set_status_message(format!("Error: {e}")),
        }
    }

    fn undo(&mut self) {
        let Some(id) = self.store.last_deleted() else {
            self.set_status_message("Nothing to undo");
            return;
        };
        match self.store.undo_delete(&id) {
            Ok(persist) => self.spawn(persist),
            Err(e) => self.set_status_message(format!("Error: {e}")),
        }
    }

    fn submit_new_task(&mut self) {
        let title = self.input.take();
        if title.trim().is_empty() {
            self.set_status_message("Title cannot be empty");
            return;
        }
        let store = self.store.clone();
        let status = self.selected_status();
        self.spawn(async move {
            if let Err(e) = store.add_task(&title, status, AddTaskOptions::default()).await {
                tracing::warn!(error = %e, "failed to add task from board");
            }
        });
        self.set_status_message(format!("Adding to {}…", status.title()));
    }

    fn toggle_subtask(&mut self, task: &Task, n: usize) {
        let Some(subtask) = task.subtasks.get(n) else {
            return;
        };
        match self.store.toggle_subtask(&task.id, &subtask.id) {
            Ok(persist) => self.spawn(async move {
                let _ = persist.await;
            }),
            Err(e) => self.set_status_message(format!("Error: {e}")),
        }
    }

    // ---- input ---------------------------------------------------------------

    /// Returns true when the board should close.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        let view = self.store.view();
        if self.store.celebration().show {
            self.store.dismiss_celebration();
        }

        if self.mode.is_text_entry() {
            self.handle_text_key(key);
            return false;
        }

        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return true;
        }

        if self.mode == BoardMode::Detail {
            match key.code {
                KeyCode::Enter | KeyCode::Esc => {
                    self.store.close_editor();
                    self.mode = BoardMode::Board;
                }
                KeyCode::Char(c @ '1'..='9') => {
                    if let Some(task) = self.store.selection().editing.and_then(|id| self.store.task(&id)) {
                        self.toggle_subtask(&task, c as usize - '1' as usize);
                    }
                }
                _ => {}
            }
            return false;
        }

        if self.drag.is_dragging() {
            match key.code {
                KeyCode::Char(' ') | KeyCode::Enter => self.pick_up_or_drop(&view),
                KeyCode::Esc => {
                    self.drag.cancel();
                    self.set_status_message("Drop cancelled");
                }
                code @ (KeyCode::Left | KeyCode::Right | KeyCode::Up | KeyCode::Down) => self.carry(code, &view),
                _ => {}
            }
            return false;
        }

        self.status_message.clear();
        let selected = self.selected_task(&view);
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char(' ') => self.pick_up_or_drop(&view),
            KeyCode::Enter => {
                if let Some(task) = selected {
                    self.store.open_editor(&task.id);
                    self.mode = BoardMode::Detail;
                }
            }
            KeyCode::Left => {
                self.selected_column = self.selected_column.saturating_sub(1);
            }
            KeyCode::Right => {
                if self.selected_column + 1 < Status::ALL.len() {
                    self.selected_column += 1;
                }
            }
            KeyCode::Up => {
                self.selected_card = self.selected_card.saturating_sub(1);
            }
            KeyCode::Down => {
                if self.selected_card + 1 < view.columns[self.selected_column].tasks.len() {
                    self.selected_card += 1;
                }
            }
            KeyCode::Char('a') => {
                self.input.clear();
                self.mode = BoardMode::AddTask;
            }
            KeyCode::Char('/') => {
                self.input.clear();
                for c in view.filters.search_text.chars() {
                    self.input.handle_char(c);
                }
                self.mode = BoardMode::Search;
            }
            KeyCode::Char('p') => {
                if let Some(task) = selected {
                    self.cycle_priority(&task);
                }
            }
            KeyCode::Char('x') => {
                if let Some(task) = selected {
                    self.delete(&task);
                }
            }
            KeyCode::Char('u') => self.undo(),
            KeyCode::Char(c @ '1'..='5') => {
                let priority = Priority::ALL[c as usize - '1' as usize];
                self.store.toggle_priority_filter(priority);
                self.set_status_message(format!("Toggled {priority} filter"));
            }
            KeyCode::Char('r') => {
                self.store.reset_filters();
                self.set_status_message("Filters cleared");
            }
            KeyCode::Char('R') => {
                let store = self.store.clone();
                self.spawn(async move { store.refresh().await });
                self.set_status_message("Refreshing…");
            }
            KeyCode::Char('h') | KeyCode::Char('?') => self.set_status_message(HELP),
            _ => {}
        }
        false
    }

    fn handle_text_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                if self.mode == BoardMode::Search {
                    self.store.set_search_text("");
                }
                self.input.clear();
                self.mode = BoardMode::Board;
            }
            KeyCode::Enter => {
                if self.mode == BoardMode::AddTask {
                    self.submit_new_task();
                } else {
                    let shown = self.store.view().visible_count();
                    self.set_status_message(format!("Search: '{}' ({shown} tasks shown)", self.input.value));
                    self.input.clear();
                }
                self.mode = BoardMode::Board;
            }
            KeyCode::Backspace => self.input.handle_backspace(),
            KeyCode::Left => self.input.move_cursor_left(),
            KeyCode::Right => self.input.move_cursor_right(),
            KeyCode::Char(c) => self.input.handle_char(c),
            _ => {}
        }
        if self.mode == BoardMode::Search {
            self.store.set_search_text(self.input.value.clone());
        }
    }

    // ---- rendering -----------------------------------------------------------

    fn render(&mut self, f: &mut Frame, view: &BoardView) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Min(0),    // Board
                Constraint::Length(1), // Status bar
            ])
            .split(f.area());

        self.render_header(f, chunks[0], view);
        self.card_areas.clear();
        self.render_board(f, chunks[1], view);
        self.render_status_bar(f, chunks[2], view);

        if self.mode == BoardMode::Detail {
            self.render_task_detail_popup(f);
        }
    }

    fn render_header(&self, f: &mut Frame, area: Rect, view: &BoardView) {
        let filters = &view.filters;
        let mut active = Vec::new();
        if !filters.search_text.is_empty() {
            active.push(format!("search '{}'", filters.search_text));
        }
        if !filters.priorities.is_empty() {
            let names: Vec<&str> = filters.priorities.iter().map(|p| p.as_str()).collect();
            active.push(format!("priority {}", names.join("/")));
        }
        let context = if view.is_loading {
            "Loading…".to_string()
        } else if let Some(err) = &view.error {
            format!("Offline: {err}")
        } else if active.is_empty() {
            format!("{} tasks", view.visible_count())
        } else {
            format!("{} tasks  [{}]", view.visible_count(), active.join(", "))
        };

        let header = Paragraph::new(Line::from(vec![
            Span::styled("KANBAN BOARD", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("  "),
            Span::styled(context, Style::default().fg(Color::Cyan).add_modifier(Modifier::ITALIC)),
        ]))
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center);
        f.render_widget(header, area);
    }

    fn render_board(&mut self, f: &mut Frame, area: Rect, view: &BoardView) {
        let columns_layout = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Ratio(1, 3), Constraint::Ratio(1, 3), Constraint::Ratio(1, 3)])
            .split(area);

        for (i, &column_area) in columns_layout.iter().enumerate() {
            self.render_column(f, column_area, i, view);
        }
    }

    fn render_column(&mut self, f: &mut Frame, area: Rect, column_index: usize, view: &BoardView) {
        let column = &view.columns[column_index];
        let is_selected = column_index == self.selected_column;
        let accent = status_color(column.status);
        let border_style = if is_selected {
            Style::default().fg(accent).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!("{} ({})", column.title, column.tasks.len()))
            .border_style(border_style);
        let inner = block.inner(area);
        f.render_widget(block, area);

        if column.tasks.is_empty() {
            return;
        }

        let available_height = inner.height as usize;
        let visible_cards = (available_height / CARD_HEIGHT).max(1);
        let mut offset = self.column_scroll_offsets[column_index];
        if is_selected {
            if self.selected_card < offset {
                offset = self.selected_card;
            } else if self.selected_card >= offset + visible_cards {
                offset = self.selected_card + 1 - visible_cards;
            }
            self.column_scroll_offsets[column_index] = offset;
        }

        let session = self.drag.session();
        let mut rendered = 0;
        for (card_index, task) in column.tasks.iter().enumerate().skip(offset) {
            let y = rendered * CARD_HEIGHT;
            if y + CARD_HEIGHT > available_height {
                break;
            }
            let card_area = Rect {
                x: inner.x,
                y: inner.y + y as u16,
                width: inner.width,
                height: CARD_HEIGHT as u16,
            };
            let carried = session.as_ref().filter(|s| s.active == task.id);
            let style = match carried {
                Some(s) if s.is_shaking => Style::default().bg(DARK_RED).fg(Color::White),
                Some(_) => Style::default().bg(DRAG_BLUE).fg(Color::White).add_modifier(Modifier::BOLD),
                None if is_selected && card_index == self.selected_card => {
                    Style::default().bg(accent).fg(Color::Black).add_modifier(Modifier::BOLD)
                }
                None => Style::default().bg(Color::DarkGray),
            };
            self.render_card(f, card_area, task, style);
            self.card_areas.insert(task.id.clone(), card_area);
            rendered += 1;
        }

        let remaining = column.tasks.len() - offset - rendered;
        if offset > 0 {
            let above = Paragraph::new(format!("▲ +{offset} above")).style(Style::default().fg(Color::Cyan));
            f.render_widget(above, Rect { height: 1, ..inner });
        }
        if remaining > 0 {
            let below = Paragraph::new(format!("▼ +{remaining} below")).style(Style::default().fg(Color::Cyan));
            f.render_widget(below, Rect { y: inner.y + inner.height - 1, height: 1, ..inner });
        }
    }

    fn render_card(&self, f: &mut Frame, area: Rect, task: &Task, style: Style) {
        let width = area.width.saturating_sub(2) as usize;
        let today = Local::now().date_naive();
        let mut meta = vec![task.task_type.map_or("-", |k| k.as_str()).to_string()];
        if task.due_date.is_some() {
            meta.push(format_due(task.due_date, today));
        }
        if let Some(user) = &task.assignee {
            meta.push(user.name.clone());
        }
        if !task.subtasks.is_empty() {
            let done = task.subtasks.iter().filter(|s| s.completed).count();
            meta.push(format!("{done}/{}", task.subtasks.len()));
        }
        let blocked = if task.blocked_by.is_empty() { "" } else { "  blocked" };

        let mut lines = vec![
            Line::from(vec![
                Span::raw(format!("#{} ", task.id)),
                Span::styled(task.priority.as_str(), Style::default().fg(priority_color(task.priority))),
                Span::raw(blocked),
            ]),
            Line::from(truncate(&task.title, width)),
        ];
        if area.height as usize >= CARD_HEIGHT {
            lines.push(Line::from(truncate(&meta.join(" | "), width)));
        }
        let card = Paragraph::new(lines)
            .block(Block::default().borders(Borders::LEFT | Borders::RIGHT | Borders::BOTTOM))
            .style(style);
        f.render_widget(card, area);
    }

    fn render_status_bar(&self, f: &mut Frame, area: Rect, view: &BoardView) {
        let text = match self.mode {
            BoardMode::AddTask => format!(
                "New task in {}: {} | Enter to add, Esc to cancel",
                self.selected_status().title(),
                self.input.value
            ),
            BoardMode::Search => format!("Search: {} | Enter to apply, Esc to clear", self.input.value),
            _ if !self.status_message.is_empty() => self.status_message.clone(),
            _ => format!(
                "Tasks: {} | Space: Pick up | a: Add | p: Priority | x: Delete | /: Search | h: Help",
                view.visible_count()
            ),
        };
        let accent = status_color(self.selected_status());
        let fg = if accent == GOLD { Color::Rgb(20, 20, 20) } else { Color::White };
        let status = Paragraph::new(text)
            .style(Style::default().bg(accent).fg(fg))
            .alignment(Alignment::Left);
        f.render_widget(status, area);
    }

    fn render_task_detail_popup(&self, f: &mut Frame) {
        let Some(task) = self.store.selection().editing.and_then(|id| self.store.task(&id)) else {
            return;
        };
        let area = f.area();
        let popup_area = Rect::new(area.width / 10, area.height / 10, area.width * 8 / 10, area.height * 8 / 10);
        f.render_widget(Clear, popup_area);

        let today = Local::now().date_naive();
        let ids = |list: &[TaskId]| {
            if list.is_empty() {
                "-".to_string()
            } else {
                list.iter().map(|id| format!("#{id}")).collect::<Vec<_>>().join(", ")
            }
        };
        let mut lines = vec![
            Line::from(Span::styled(
                format!("Task #{}: {}", task.id, task.title),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(format!("Status:     {}", task.status.title())),
            Line::from(format!("Priority:   {}", task.priority)),
            Line::from(format!("Type:       {}", task.task_type.map_or("-", |k| k.as_str()))),
            Line::from(format!("Assignee:   {}", task.assignee.as_ref().map_or("-", |u| u.name.as_str()))),
            Line::from(format!("Due:        {}", format_due(task.due_date, today))),
            Line::from(format!("Tags:       {}", if task.tags().is_empty() { "-".to_string() } else { task.tags().join(", ") })),
            Line::from(format!("Blocked by: {}", ids(&task.blocked_by))),
            Line::from(format!("Blocking:   {}", ids(&task.blocking))),
            Line::from(""),
            Line::from("Description:"),
            Line::from(task.description.clone().unwrap_or_else(|| "-".into())),
        ];
        if !task.subtasks.is_empty() {
            lines.push(Line::from(""));
            lines.push(Line::from("Subtasks (1-9 to toggle):"));
            for (i, st) in task.subtasks.iter().enumerate() {
                let mark = if st.completed { "x" } else { " " };
                lines.push(Line::from(format!("  {}. [{mark}] {}", i + 1, st.title)));
            }
        }
        if !task.links.is_empty() {
            lines.push(Line::from(""));
            lines.push(Line::from("Links:"));
            for link in &task.links {
                lines.push(Line::from(format!("  {} {}", link.url, link.title.as_deref().unwrap_or(""))));
            }
        }

        let popup = Paragraph::new(lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Task Details (Enter to close)")
                    .title_alignment(Alignment::Center)
                    .border_style(Style::default().fg(status_color(task.status)).add_modifier(Modifier::BOLD)),
            )
            .wrap(Wrap { trim: true })
            .style(Style::default().bg(Color::Black));
        f.render_widget(popup, popup_area);
    }

    /// Main event loop.
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        loop {
            self.absorb_notices();
            let view = self.store.view();
            self.sync_selection(&view);
            terminal.draw(|f| self.render(f, &view))?;

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if self.handle_key(key) {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}
