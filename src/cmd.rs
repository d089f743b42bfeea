//! Command implementations for the CLI interface.
//!
//! Each subcommand loads the board through a [`TaskStore`], resolves its
//! arguments against the loaded tasks and runs one store operation, awaiting the
//! remote half before printing the outcome.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use chrono::Local;
use clap::Subcommand;
use clap_complete::{generate, Shell};

use kanban_board::api::TaskQuery;
use kanban_board::derive::{self, FilterState};
use kanban_board::drag::{DragEngine, DropTarget};
use kanban_board::fields::*;
use kanban_board::store::{NoticeLevel, Persist, TaskStore};
use kanban_board::task::{AddTaskOptions, EntityId, Task, TaskId, TaskPatch, User};

use crate::format::{format_due, parse_due, print_table, split_tags, truncate};
use crate::tui::board_run::run_board_tui;

#[derive(Subcommand)]
pub enum Commands {
    /// Launch the terminal board.
    Ui,

    /// List tasks from the server with optional filters.
    List {
        /// Filter by column.
        #[arg(long, value_enum)]
        status: Option<Status>,
        /// Filter by priority.
        #[arg(long, value_enum)]
        priority: Option<Priority>,
        /// Filter by assigned user id.
        #[arg(long)]
        assignee: Option<String>,
        /// Server-side sort key.
        #[arg(long, value_enum)]
        sort_by: Option<SortBy>,
        /// Server-side sort order.
        #[arg(long, value_enum)]
        sort_order: Option<SortOrder>,
        /// Case-insensitive search over title and id.
        #[arg(long)]
        search: Option<String>,
        /// Filter by tag. May be repeated. Accepts comma-separated.
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Filter by task type.
        #[arg(long = "type", value_enum)]
        task_type: Option<TaskType>,
        /// Limit number of rows printed.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one task with its subtasks, links and dependencies.
    View {
        /// Task id or title.
        id: String,
    },

    /// Add a new task.
    Add {
        /// Short title for the task.
        title: String,
        /// Column to create the task in.
        #[arg(long, value_enum, default_value_t = Status::Todo)]
        status: Status,
        #[arg(long, value_enum)]
        priority: Option<Priority>,
        #[arg(long = "type", value_enum)]
        task_type: Option<TaskType>,
        /// Comma-separated tags. May be repeated.
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Due date: YYYY-MM-DD, "today", "tomorrow", "fri", or "in Nd".
        #[arg(long)]
        due: Option<String>,
        /// Optional longer description.
        #[arg(long)]
        desc: Option<String>,
        /// Assignee user id or name.
        #[arg(long)]
        assignee: Option<String>,
        /// What happens if this is not done. Kept locally only.
        #[arg(long)]
        failure_cost: Option<String>,
        /// Subtask title. May be repeated.
        #[arg(long = "subtask")]
        subtasks: Vec<String>,
        /// Task this one depends on. May be repeated.
        #[arg(long)]
        blocked_by: Vec<String>,
        /// Task that depends on this one. May be repeated.
        #[arg(long)]
        blocking: Vec<String>,
    },

    /// Update fields on a task.
    Update {
        /// Task id or title.
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        desc: Option<String>,
        #[arg(long, value_enum)]
        status: Option<Status>,
        #[arg(long, value_enum)]
        priority: Option<Priority>,
        #[arg(long = "type", value_enum)]
        task_type: Option<TaskType>,
        #[arg(long)]
        due: Option<String>,
        /// Assignee user id or name.
        #[arg(long)]
        assignee: Option<String>,
        /// Add tags (comma-separated or repeated).
        #[arg(long = "add-tag")]
        add_tags: Vec<String>,
        /// Remove tags (comma-separated or repeated).
        #[arg(long = "rm-tag")]
        rm_tags: Vec<String>,
        #[arg(long)]
        clear_desc: bool,
        #[arg(long)]
        clear_due: bool,
        #[arg(long)]
        unassign: bool,
    },

    /// Move a task to another column, like dropping it there on the board.
    Move {
        /// Task id or title.
        id: String,
        /// Target column.
        #[arg(value_enum)]
        status: Status,
        /// Insert before the card at this index of the target column.
        #[arg(long)]
        position: Option<usize>,
    },

    /// Delete a task.
    Delete {
        /// Task id or title.
        id: String,
    },

    /// Manage dependencies between tasks.
    Dep {
        #[command(subcommand)]
        action: DepAction,
    },

    /// Manage a task's subtasks.
    Subtask {
        #[command(subcommand)]
        action: SubtaskAction,
    },

    /// Manage a task's links.
    Link {
        #[command(subcommand)]
        action: LinkAction,
    },

    /// List tags with counts.
    Tags,

    /// List people tasks are assigned to.
    Assignees,

    /// List every user known to the server.
    Users,

    /// Check that the task service is up.
    Health,

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum DepAction {
    /// Add an edge between two tasks.
    Add {
        /// Task being edited.
        task: String,
        /// The other task.
        other: String,
        /// blocked-by: TASK depends on OTHER. blocking: OTHER depends on TASK.
        #[arg(long, value_enum, default_value_t = Direction::BlockedBy)]
        direction: Direction,
    },
    /// Remove an edge between two tasks.
    Rm {
        task: String,
        other: String,
        #[arg(long, value_enum, default_value_t = Direction::BlockedBy)]
        direction: Direction,
    },
}

#[derive(Subcommand)]
pub enum SubtaskAction {
    /// List a task's subtasks as stored on the server.
    Ls { task: String },
    Add { task: String, title: String },
    /// Flip a subtask between done and open.
    Toggle { task: String, subtask: String },
    Rm { task: String, subtask: String },
}

#[derive(Subcommand)]
pub enum LinkAction {
    /// List a task's links as stored on the server.
    Ls { task: String },
    Add {
        task: String,
        url: String,
        #[arg(long)]
        title: Option<String>,
    },
    Rm { task: String, link: String },
}

fn fail(context: &str, err: impl Display) -> ! {
    eprintln!("{context}: {err}");
    std::process::exit(1);
}

/// Print queued notices. Returns whether any was an error.
fn report_notices(store: &TaskStore) -> bool {
    let mut failed = false;
    for notice in store.take_notices() {
        match notice.level {
            NoticeLevel::Info => println!("{}", notice.message),
            NoticeLevel::Error => {
                eprintln!("{}", notice.message);
                failed = true;
            }
        }
    }
    failed
}

/// Run the remote half of a fallible mutation.
async fn settle<T>(started: kanban_board::Result<Persist<kanban_board::Result<T>>>) -> kanban_board::Result<T> {
    started?.await
}

async fn open_board(store: &TaskStore) {
    store.load().await;
    if let Some(e) = store.error() {
        fail("Failed to load tasks", e);
    }
}

/// Resolve a task by exact id, then by case-insensitive title.
pub fn resolve_task(tasks: &[Task], ident: &str) -> Result<TaskId, String> {
    let ident = ident.trim();
    if let Some(task) = tasks.iter().find(|t| t.id.as_str() == ident) {
        return Ok(task.id.clone());
    }
    let lower = ident.to_lowercase();
    let named: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.title.to_lowercase() == lower)
        .collect();
    match named.as_slice() {
        [task] => Ok(task.id.clone()),
        [] => Err(format!("No task with id or title '{ident}'")),
        many => Err(format!(
            "Title '{ident}' matches {} tasks: {}",
            many.len(),
            many.iter().map(|t| t.id.as_str()).collect::<Vec<_>>().join(", ")
        )),
    }
}

fn resolve_or_exit(store: &TaskStore, ident: &str) -> TaskId {
    resolve_task(&store.tasks(), ident).unwrap_or_else(|e| fail("Error resolving task", e))
}

async fn resolve_user(store: &TaskStore, ident: &str) -> User {
    let users = store
        .gateway()
        .list_users()
        .await
        .unwrap_or_else(|e| fail("Failed to fetch users", e));
    let lower = ident.trim().to_lowercase();
    users
        .into_iter()
        .find(|u| u.id == ident.trim() || u.name.to_lowercase() == lower)
        .unwrap_or_else(|| fail("Error resolving assignee", format!("no user '{ident}'")))
}

fn parse_due_or_exit(input: &str) -> chrono::NaiveDate {
    parse_due(input, Local::now().date_naive()).unwrap_or_else(|| {
        eprintln!("Unrecognised due date. Use YYYY-MM-DD, 'today', 'tomorrow', a weekday, or 'in Nd'.");
        std::process::exit(1);
    })
}

pub async fn cmd_ui(store: &TaskStore, drag: &DragEngine) {
    store.load().await;
    let store = store.clone();
    let drag = drag.clone();
    let result = tokio::task::block_in_place(move || run_board_tui(store, drag));
    if let Err(err) = result {
        fail("Error running board", err);
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn cmd_list(
    store: &TaskStore,
    status: Option<Status>,
    priority: Option<Priority>,
    assignee: Option<String>,
    sort_by: Option<SortBy>,
    sort_order: Option<SortOrder>,
    search: Option<String>,
    tags: Vec<String>,
    task_type: Option<TaskType>,
    limit: Option<usize>,
) {
    let query = TaskQuery {
        status,
        assigned_user_id: assignee,
        priority,
        sort_by,
        sort_order,
    };
    let tasks = store
        .gateway()
        .list_tasks(&query)
        .await
        .unwrap_or_else(|e| fail("Failed to fetch tasks", e));

    let filters = FilterState {
        search_text: search.unwrap_or_default(),
        task_types: task_type.into_iter().collect(),
        tags: split_tags(&tags),
        ..FilterState::default()
    };
    let mut rows = derive::visible_tasks(&tasks, &filters);
    if let Some(n) = limit {
        rows.truncate(n);
    }
    if rows.is_empty() {
        println!("No tasks.");
        return;
    }
    print_table(&rows);
}

pub async fn cmd_view(store: &TaskStore, id: String) {
    open_board(store).await;
    let id = resolve_or_exit(store, &id);
    let Some(task) = store.task(&id) else {
        fail("Error resolving task", format!("task {id} vanished"));
    };
    let tasks = store.tasks();
    let label = |other: &TaskId| match tasks.iter().find(|t| &t.id == other) {
        Some(t) => format!("{other} ({})", t.title),
        None => other.to_string(),
    };
    let list = |ids: &[TaskId]| {
        if ids.is_empty() {
            "-".to_string()
        } else {
            ids.iter().map(&label).collect::<Vec<_>>().join(", ")
        }
    };
    let today = Local::now().date_naive();

    println!("#{} {}", task.id, task.title);
    println!("Status:     {}", task.status.title());
    println!("Priority:   {}", task.priority);
    println!("Type:       {}", task.task_type.map_or("-", |k| k.as_str()));
    println!("Assignee:   {}", task.assignee.as_ref().map_or("-", |u| u.name.as_str()));
    println!("Due:        {}", format_due(task.due_date, today));
    println!("Tags:       {}", if task.tags().is_empty() { "-".to_string() } else { task.tags().join(", ") });
    println!("Blocked by: {}", list(&task.blocked_by));
    println!("Blocking:   {}", list(&task.blocking));
    if let Some(desc) = task.description.as_deref().filter(|d| !d.is_empty()) {
        println!();
        println!("{desc}");
    }
    if !task.subtasks.is_empty() {
        println!();
        println!("Subtasks:");
        for st in &task.subtasks {
            println!("  [{}] {:<6} {}", if st.completed { "x" } else { " " }, st.id, st.title);
        }
    }
    if !task.links.is_empty() {
        println!();
        println!("Links:");
        for link in &task.links {
            println!("  {:<6} {} {}", link.id, link.url, link.title.as_deref().unwrap_or(""));
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn cmd_add(
    store: &TaskStore,
    title: String,
    status: Status,
    priority: Option<Priority>,
    task_type: Option<TaskType>,
    tags: Vec<String>,
    due: Option<String>,
    desc: Option<String>,
    assignee: Option<String>,
    failure_cost: Option<String>,
    subtasks: Vec<String>,
    blocked_by: Vec<String>,
    blocking: Vec<String>,
) {
    if !blocked_by.is_empty() || !blocking.is_empty() {
        open_board(store).await;
    }
    let tags = split_tags(&tags);
    let assignee = match assignee {
        Some(ident) => Some(resolve_user(store, &ident).await),
        None => None,
    };
    let options = AddTaskOptions {
        priority,
        assignee,
        task_type,
        tags: (!tags.is_empty()).then_some(tags),
        due_date: due.as_deref().map(parse_due_or_exit),
        description: desc.filter(|d| !d.trim().is_empty()),
        failure_cost,
        subtasks,
        blocking: blocking.iter().map(|t| resolve_or_exit(store, t)).collect(),
        blocked_by: blocked_by.iter().map(|t| resolve_or_exit(store, t)).collect(),
    };

    match store.add_task(&title, status, options).await {
        Ok(task) => println!("Added task {}: {} [{}]", task.id, task.title, task.status.title()),
        Err(e) => fail("Failed to add task", e),
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn cmd_update(
    store: &TaskStore,
    id: String,
    title: Option<String>,
    desc: Option<String>,
    status: Option<Status>,
    priority: Option<Priority>,
    task_type: Option<TaskType>,
    due: Option<String>,
    assignee: Option<String>,
    add_tags: Vec<String>,
    rm_tags: Vec<String>,
    clear_desc: bool,
    clear_due: bool,
    unassign: bool,
) {
    open_board(store).await;
    let id = resolve_or_exit(store, &id);
    let Some(current) = store.task(&id) else {
        fail("Error resolving task", format!("task {id} vanished"));
    };

    let mut patch = TaskPatch {
        title,
        status,
        priority,
        task_type,
        ..TaskPatch::default()
    };
    if clear_desc {
        patch.description = Some(None);
    } else if let Some(d) = desc {
        patch.description = Some(Some(d));
    }
    if clear_due {
        patch.due_date = Some(None);
    } else if let Some(ds) = due {
        patch.due_date = Some(Some(parse_due_or_exit(&ds)));
    }
    if unassign {
        patch.assignee = Some(None);
    } else if let Some(ident) = assignee {
        patch.assignee = Some(Some(resolve_user(store, &ident).await));
    }

    let add = split_tags(&add_tags);
    let rm = split_tags(&rm_tags);
    if !add.is_empty() || !rm.is_empty() {
        let mut set: BTreeSet<String> = current.tags().iter().cloned().collect();
        set.extend(add);
        for r in &rm {
            set.remove(r);
        }
        patch.tags = Some((!set.is_empty()).then(|| set.into_iter().collect()));
    }

    if patch.is_empty() {
        println!("Nothing to update.");
        return;
    }
    match store.update_task(&id, patch) {
        Ok(persist) => persist.await,
        Err(e) => fail("Failed to update task", e),
    }
    if report_notices(store) {
        std::process::exit(1);
    }
    println!("Updated task {id}");
}

pub async fn cmd_move(store: &TaskStore, drag: &DragEngine, id: String, status: Status, position: Option<usize>) {
    open_board(store).await;
    let id = resolve_or_exit(store, &id);
    if store.task(&id).map(|t| t.status) == Some(status) {
        println!("Task {id} is already in {}", status.title());
        return;
    }

    let view = store.view();
    let target = position
        .and_then(|i| view.column(status).tasks.get(i))
        .map_or(DropTarget::Column(status), |card| DropTarget::Card(card.id.clone()));

    if let Err(e) = drag.drag_start(&id) {
        fail("Failed to move task", e);
    }
    drag.drag_over(&target);
    if let Some(persist) = drag.drag_end(Some(target), None) {
        persist.await;
    }
    if report_notices(store) {
        std::process::exit(1);
    }
    println!("Moved task {id} to {}", status.title());
    if store.celebration().show {
        println!("Task completed!");
    }
}

pub async fn cmd_delete(store: &TaskStore, id: String) {
    open_board(store).await;
    let id = resolve_or_exit(store, &id);
    let result = settle(store.delete_task(&id)).await;
    report_notices(store);
    if let Err(e) = result {
        fail("Failed to delete task", e);
    }
}

pub async fn cmd_dep(store: &TaskStore, action: DepAction) {
    open_board(store).await;
    match action {
        DepAction::Add { task, other, direction } => {
            let task = resolve_or_exit(store, &task);
            let other = resolve_or_exit(store, &other);
            if let Err(e) = store.add_dependency(&task, &other, direction).await {
                fail("Failed to add dependency", e);
            }
            match direction {
                Direction::BlockedBy => println!("Task {task} is now blocked by {other}"),
                Direction::Blocking => println!("Task {task} is now blocking {other}"),
            }
        }
        DepAction::Rm { task, other, direction } => {
            let task = resolve_or_exit(store, &task);
            let other = resolve_or_exit(store, &other);
            if let Err(e) = store.remove_dependency(&task, &other, direction).await {
                fail("Failed to remove dependency", e);
            }
            println!("Removed dependency between {task} and {other}");
        }
    }
}

pub async fn cmd_subtask(store: &TaskStore, action: SubtaskAction) {
    open_board(store).await;
    match action {
        SubtaskAction::Ls { task } => {
            let task = resolve_or_exit(store, &task);
            let subtasks = store
                .gateway()
                .list_subtasks(&task)
                .await
                .unwrap_or_else(|e| fail("Failed to fetch subtasks", e));
            for st in subtasks {
                println!("[{}] {:<6} {}", if st.completed { "x" } else { " " }, st.id, st.title);
            }
        }
        SubtaskAction::Add { task, title } => {
            let task = resolve_or_exit(store, &task);
            match settle(store.add_subtask(&task, &title)).await {
                Ok(st) => println!("Added subtask {} to task {task}", st.id),
                Err(e) => fail("Failed to add subtask", e),
            }
        }
        SubtaskAction::Toggle { task, subtask } => {
            let task = resolve_or_exit(store, &task);
            match settle(store.toggle_subtask(&task, &EntityId::from(subtask.as_str()))).await {
                Ok(st) => println!(
                    "Subtask {} marked {}",
                    st.id,
                    if st.completed { "done" } else { "open" }
                ),
                Err(e) => fail("Failed to update subtask", e),
            }
        }
        SubtaskAction::Rm { task, subtask } => {
            let task = resolve_or_exit(store, &task);
            if let Err(e) = settle(store.remove_subtask(&task, &EntityId::from(subtask.as_str()))).await {
                fail("Failed to remove subtask", e);
            }
            println!("Removed subtask {subtask}");
        }
    }
}

pub async fn cmd_link(store: &TaskStore, action: LinkAction) {
    open_board(store).await;
    match action {
        LinkAction::Ls { task } => {
            let task = resolve_or_exit(store, &task);
            let links = store
                .gateway()
                .list_links(&task)
                .await
                .unwrap_or_else(|e| fail("Failed to fetch links", e));
            for link in links {
                println!("{:<6} {} {}", link.id, link.url, link.title.as_deref().unwrap_or(""));
            }
        }
        LinkAction::Add { task, url, title } => {
            let task = resolve_or_exit(store, &task);
            match settle(store.add_link(&task, &url, title.as_deref())).await {
                Ok(link) => println!("Added link {} to task {task}", link.id),
                Err(e) => fail("Failed to add link", e),
            }
        }
        LinkAction::Rm { task, link } => {
            let task = resolve_or_exit(store, &task);
            if let Err(e) = settle(store.remove_link(&task, &EntityId::from(link.as_str()))).await {
                fail("Failed to remove link", e);
            }
            println!("Removed link {link}");
        }
    }
}

pub async fn cmd_tags(store: &TaskStore) {
    open_board(store).await;
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for t in store.tasks() {
        for tag in t.tags() {
            *counts.entry(tag.clone()).or_default() += 1;
        }
    }
    println!("{:<16} Count", "Tag");
    for (tag, c) in counts {
        println!("{:<16} {}", truncate(&tag, 16), c);
    }
}

pub async fn cmd_assignees(store: &TaskStore) {
    open_board(store).await;
    let view = store.view();
    if view.unique_assignees.is_empty() {
        println!("No assigned tasks.");
        return;
    }
    for user in &view.unique_assignees {
        println!("{:<8} {}", truncate(&user.id, 8), user.name);
    }
}

pub async fn cmd_users(store: &TaskStore) {
    let users = store
        .gateway()
        .list_users()
        .await
        .unwrap_or_else(|e| fail("Failed to fetch users", e));
    println!("{:<8} Name", "ID");
    for user in users {
        println!("{:<8} {}", truncate(&user.id, 8), user.name);
    }
}

pub async fn cmd_health(store: &TaskStore) {
    if store.gateway().health().await {
        println!("healthy");
    } else {
        eprintln!("Task service unreachable or unhealthy");
        std::process::exit(1);
    }
}

pub fn cmd_completions(shell: Shell) {
    use clap::CommandFactory;
    use crate::cli::Cli;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board() -> Vec<Task> {
        vec![
            Task::new("1", "Buy milk", Status::Todo),
            Task::new("2", "Walk dog", Status::Todo),
            Task::new("3", "walk dog", Status::Done),
            Task::new("4", "Pay rent", Status::InProgress),
        ]
    }

    #[test]
    fn test_resolve_by_id_then_title() {
        let tasks = board();
        assert_eq!(resolve_task(&tasks, "4"), Ok(TaskId::from("4")));
        assert_eq!(resolve_task(&tasks, " buy MILK "), Ok(TaskId::from("1")));
    }

    #[test]
    fn test_resolve_ambiguous_and_missing() {
        let tasks = board();
        let err = resolve_task(&tasks, "Walk dog").unwrap_err();
        assert!(err.contains("matches 2 tasks"), "{err}");
        assert!(resolve_task(&tasks, "nothing").unwrap_err().contains("No task"));
    }

    #[test]
    fn test_list_search_help_matches_filter() {
        use clap::CommandFactory;

        let cli = crate::cli::Cli::command();
        let list = cli.find_subcommand("list").unwrap();
        let search = list.get_arguments().find(|a| a.get_id() == "search").unwrap();
        assert!(search.get_help().unwrap().to_string().contains("title and id"));

        let mut tasks = board();
        tasks[1].description = Some("milk on the way back".into());
        let filters = FilterState {
            search_text: "milk".into(),
            ..FilterState::default()
        };
        let ids: Vec<&str> = derive::visible_tasks(&tasks, &filters).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["1"]);
        let filters = FilterState {
            search_text: "4".into(),
            ..FilterState::default()
        };
        assert_eq!(derive::visible_tasks(&tasks, &filters).len(), 1);
    }
}
