//! Task store: the in-memory task collection, the board UI state around it and
//! every mutation entry point.
//!
//! Mutations follow one discipline. The local change is applied synchronously,
//! before the method returns; the remote write and its compensating action are
//! handed back as a [`Persist`] future for the caller to spawn or await. On
//! success the task is reconciled with the server's canonical entity; on failure
//! the captured prior value is restored, or the whole collection is refetched when
//! no prior value can be trusted.
//!
//! The lock around [`BoardState`] is only ever held for synchronous sections.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{TaskGateway, TaskQuery};
use crate::config::BoardConfig;
use crate::derive::{self, BoardView, FilterState};
use crate::error::{BoardError, Result};
use crate::fields::{Direction, Priority, Status, TaskType};
use crate::task::*;

mod state;
mod subtasks;

pub use state::{Celebration, Notice, NoticeLevel, Point, Selection};
use state::{BoardState, UndoEntry};

/// Remote half of an optimistic mutation.
pub type Persist<T> = BoxFuture<'static, T>;

struct Inner {
    state: Mutex<BoardState>,
    gateway: Arc<dyn TaskGateway>,
    undo_window: Duration,
    changes: watch::Sender<u64>,
}

/// Shared handle to the board state. Clones refer to the same store.
#[derive(Clone)]
pub struct TaskStore {
    inner: Arc<Inner>,
}

impl TaskStore {
    pub fn new(gateway: Arc<dyn TaskGateway>, config: &BoardConfig) -> Self {
        let (changes, _) = watch::channel(0);
        TaskStore {
            inner: Arc::new(Inner {
                state: Mutex::new(BoardState::default()),
                gateway,
                undo_window: config.undo_window(),
                changes,
            }),
        }
    }

    pub fn gateway(&self) -> Arc<dyn TaskGateway> {
        Arc::clone(&self.inner.gateway)
    }

    /// Receiver whose value is bumped after every state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    fn read<R>(&self, f: impl FnOnce(&BoardState) -> R) -> R {
        f(&self.inner.state.lock())
    }

    fn notify(&self) {
        self.inner.changes.send_modify(|rev| *rev = rev.wrapping_add(1));
    }

    /// Mutate tasks (or loading/error flags) and invalidate the derived view.
    fn write<R>(&self, f: impl FnOnce(&mut BoardState) -> R) -> R {
        let out = {
            let mut state = self.inner.state.lock();
            let out = f(&mut state);
            state.tasks_changed();
            out
        };
        self.notify();
        out
    }

    fn write_filters(&self, f: impl FnOnce(&mut FilterState)) {
        {
            let mut state = self.inner.state.lock();
            f(&mut state.filters);
            state.filters_changed();
        }
        self.notify();
    }

    /// Mutate state the derived view does not read.
    fn write_ui<R>(&self, f: impl FnOnce(&mut BoardState) -> R) -> R {
        let out = f(&mut self.inner.state.lock());
        self.notify();
        out
    }

    // ---- reads -------------------------------------------------------------

    /// Derived board, memoised on the task and filter revisions.
    pub fn view(&self) -> Arc<BoardView> {
        self.inner.state.lock().view()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.read(|s| s.tasks.clone())
    }

    pub fn task(&self, id: &TaskId) -> Option<Task> {
        self.read(|s| s.task(id).cloned())
    }

    pub fn filters(&self) -> FilterState {
        self.read(|s| s.filters.clone())
    }

    pub fn is_loading(&self) -> bool {
        self.read(|s| s.is_loading)
    }

    pub fn error(&self) -> Option<String> {
        self.read(|s| s.error.clone())
    }

    pub fn celebration(&self) -> Celebration {
        self.read(|s| s.celebration)
    }

    pub fn selection(&self) -> Selection {
        self.read(|s| s.selection.clone())
    }

    /// Drain queued notices, oldest first.
    pub fn take_notices(&self) -> Vec<Notice> {
        self.write_ui(|s| std::mem::take(&mut s.notices))
    }

    // ---- loading -----------------------------------------------------------

    /// Full fetch-and-replace with the loading flag raised meanwhile.
    pub async fn load(&self) {
        self.write(|s| s.is_loading = true);
        let _ = self.fetch_all().await;
        self.write(|s| s.is_loading = false);
    }

    /// Full fetch-and-replace. A failure is recorded in `error`.
    pub async fn refresh(&self) {
        let _ = self.fetch_all().await;
    }

    async fn fetch_all(&self) -> Result<()> {
        match self.inner.gateway.list_tasks(&TaskQuery::default()).await {
            Ok(tasks) => {
                info!(count = tasks.len(), "refetched tasks");
                self.write(|s| {
                    s.replace_tasks(tasks);
                    s.error = None;
                });
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch tasks");
                self.write(|s| s.error = Some(e.to_string()));
                Err(e)
            }
        }
    }

    // ---- tasks -------------------------------------------------------------

    /// Create a task and append the server's echo.
    ///
    /// Requested subtasks and dependency edges are created one by one afterwards;
    /// a failure among them is logged and skipped. Edges trigger a full refetch.
    pub async fn add_task(&self, title: &str, status: Status, options: AddTaskOptions) -> Result<Task> {
        validate_title(title)?;
        let draft = TaskDraft {
            title: title.trim().to_string(),
            description: options.description.clone(),
            assignee_id: options.assignee.as_ref().map(|u| u.id.clone()),
            due_date: options.due_date,
            status,
            priority: options.priority.unwrap_or(Priority::None),
            task_type: options.task_type.unwrap_or(TaskType::Other),
            tags: options.tags.clone(),
        };
        let gateway = self.gateway();
        let mut created = gateway.create_task(&draft).await?;
        created.failure_cost = options.failure_cost.clone();
        debug!(task = %created.id, "created task");
        self.write(|s| {
            if s.task(&created.id).is_none() {
                s.tasks.push(created.clone());
            }
        });

        for title in &options.subtasks {
            match gateway.create_subtask(&created.id, title).await {
                Ok(subtask) => self.write(|s| {
                    if let Some(task) = s.task_mut(&created.id) {
                        task.subtasks.push(subtask);
                    }
                }),
                Err(e) => warn!(task = %created.id, error = %e, "failed to create subtask"),
            }
        }

        let edges = options
            .blocking
            .iter()
            .map(|other| (other, &created.id))
            .chain(options.blocked_by.iter().map(|other| (&created.id, other)));
        let mut any_edge = false;
        for (task, depends_on) in edges {
            any_edge = true;
            if let Err(e) = gateway.create_dependency(task, depends_on).await {
                warn!(%task, %depends_on, error = %e, "failed to create dependency");
            }
        }
        if any_edge {
            self.refresh().await;
        }

        Ok(self.task(&created.id).unwrap_or(created))
    }

    /// Merge `patch` into the task and persist the server-stored subset.
    ///
    /// Failures are not returned: the touched fields are reverted and a notice is
    /// queued. A 404 refetches instead.
    pub fn update_task(&self, id: &TaskId, patch: TaskPatch) -> Result<Persist<()>> {
        self.apply_update(id, patch, None, "Failed to save changes")
    }

    pub fn update_priority(&self, id: &TaskId, priority: Priority) -> Result<Persist<()>> {
        self.apply_update(id, TaskPatch::priority(priority), None, "Failed to update priority")
    }

    pub fn update_status(&self, id: &TaskId, status: Status) -> Result<Persist<()>> {
        self.apply_update(id, TaskPatch::status(status), None, "Failed to update status")
    }

    fn apply_update(
        &self,
        id: &TaskId,
        patch: TaskPatch,
        position: Option<Point>,
        failure: &'static str,
    ) -> Result<Persist<()>> {
        patch.validate()?;
        let inverse = self.write(|s| {
            let task = s
                .task_mut(id)
                .ok_or_else(|| BoardError::not_found("task", id.as_str()))?;
            let from = task.status;
            let inverse = patch.apply(task);
            task.touch(Utc::now());
            let to = task.status;
            s.celebrate_if_done(from, to, position);
            Ok::<_, BoardError>(inverse)
        })?;
        debug!(task = %id, "applied update");

        if !patch.has_remote_changes() {
            return Ok(future::ready(()).boxed());
        }
        let store = self.clone();
        let id = id.clone();
        Ok(async move {
            match store.inner.gateway.update_task(&id, &patch).await {
                Ok(canonical) => store.reconcile(&id, canonical),
                Err(e) if e.is_not_found() => {
                    warn!(task = %id, "task vanished during update, refetching");
                    store.write_ui(|s| s.notice(Notice::error(failure)));
                    store.refresh().await;
                }
                Err(e) => {
                    warn!(task = %id, error = %e, "update failed, reverting");
                    store.write(|s| {
                        if let Some(task) = s.task_mut(&id) {
                            inverse.apply(task);
                        }
                        s.notice(Notice::error(failure));
                    });
                }
            }
        }
        .boxed())
    }

    fn reconcile(&self, id: &TaskId, canonical: Task) {
        self.write(|s| {
            if let Some(task) = s.task_mut(id) {
                let previous = task.updated_at;
                task.reconcile(canonical);
                if let Some(prev) = previous {
                    task.touch(prev);
                }
            }
        });
    }

    /// Remove the task locally and open its undo window.
    ///
    /// A failed remote delete closes the window, refetches and returns the error.
    pub fn delete_task(&self, id: &TaskId) -> Result<Persist<Result<()>>> {
        let now = Instant::now();
        let expires = now + self.inner.undo_window;
        self.write(|s| {
            let pos = s
                .position(id)
                .ok_or_else(|| BoardError::not_found("task", id.as_str()))?;
            let task = s.tasks.remove(pos);
            s.order.forget(id);
            s.selection.expanded.remove(id);
            if s.selection.editing.as_ref() == Some(id) {
                s.selection.editing = None;
            }
            s.undo.retain(|_, entry| entry.expires > now);
            s.notice(Notice::info(format!("Task deleted: {}", task.title)));
            s.undo.insert(id.clone(), UndoEntry { task, expires });
            Ok::<_, BoardError>(())
        })?;
        debug!(task = %id, "deleted locally");

        let store = self.clone();
        let id = id.clone();
        Ok(async move {
            match store.inner.gateway.delete_task(&id).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    warn!(task = %id, error = %e, "delete failed, refetching");
                    store.write_ui(|s| {
                        s.undo.remove(&id);
                        s.notice(Notice::error("Failed to delete task"));
                    });
                    store.refresh().await;
                    Err(e)
                }
            }
        }
        .boxed())
    }

    /// Most recently deleted task whose undo window is still open.
    pub fn last_deleted(&self) -> Option<TaskId> {
        let now = Instant::now();
        self.read(|s| {
            s.undo
                .iter()
                .filter(|(_, entry)| entry.expires > now)
                .max_by_key(|(_, entry)| entry.expires)
                .map(|(id, _)| id.clone())
        })
    }

    /// Restore a deleted task within its undo window.
    ///
    /// The task reappears at once under its old id and is recreated on the server,
    /// which assigns a new id; the local entry then takes the new id. Edges and
    /// sub-entities are not restored.
    pub fn undo_delete(&self, id: &TaskId) -> Result<Persist<Result<Task>>> {
        let now = Instant::now();
        let deleted = self.write(|s| {
            let entry = s
                .undo
                .remove(id)
                .filter(|entry| entry.expires > now)
                .ok_or_else(|| BoardError::UndoExpired { id: id.to_string() })?;
            let mut placeholder = entry.task.clone();
            placeholder.subtasks.clear();
            placeholder.links.clear();
            placeholder.blocking.clear();
            placeholder.blocked_by.clear();
            s.tasks.push(placeholder);
            Ok::<_, BoardError>(entry.task)
        })?;
        debug!(task = %id, "restoring deleted task");

        let store = self.clone();
        let old_id = id.clone();
        Ok(async move {
            match store.inner.gateway.create_task(&TaskDraft::from_task(&deleted)).await {
                Ok(mut recreated) => {
                    recreated.failure_cost = deleted.failure_cost.clone();
                    recreated.time_estimate = deleted.time_estimate.clone();
                    store.write(|s| {
                        match s.position(&old_id) {
                            Some(pos) => s.tasks[pos] = recreated.clone(),
                            None if s.task(&recreated.id).is_none() => s.tasks.push(recreated.clone()),
                            None => {}
                        }
                        s.notice(Notice::info("Task restored"));
                    });
                    info!(old = %old_id, new = %recreated.id, "task restored");
                    Ok(recreated)
                }
                Err(e) => {
                    warn!(task = %old_id, error = %e, "restore failed, refetching");
                    store.write_ui(|s| s.notice(Notice::error("Failed to restore task")));
                    store.refresh().await;
                    Err(e)
                }
            }
        }
        .boxed())
    }

    // ---- dependencies ------------------------------------------------------

    /// Create an edge between `task` and `other`, then refetch.
    ///
    /// `BlockedBy` makes `task` depend on `other`; `Blocking` the reverse.
    pub async fn add_dependency(&self, task: &TaskId, other: &TaskId, direction: Direction) -> Result<()> {
        if task == other {
            return Err(BoardError::validation("dependency", "a task cannot depend on itself"));
        }
        let (from, to) = match direction {
            Direction::BlockedBy => (task, other),
            Direction::Blocking => (other, task),
        };
        let result = self.inner.gateway.create_dependency(from, to).await;
        if let Err(e) = &result {
            warn!(%from, %to, error = %e, "failed to add dependency");
            self.write_ui(|s| s.notice(Notice::error("Failed to add dependency")));
        }
        self.refresh().await;
        result.map(|_| ())
    }

    /// Delete the edge `direction` describes between `task` and `other`, then
    /// refetch. Nothing happens when no such edge exists.
    pub async fn remove_dependency(&self, task: &TaskId, other: &TaskId, direction: Direction) -> Result<()> {
        let edges = self.inner.gateway.list_dependencies(task).await?;
        let Some(edge) = edges.into_iter().find(|e| e.matches(task, other, direction)) else {
            debug!(%task, %other, "no matching dependency");
            return Ok(());
        };
        let result = self.inner.gateway.delete_dependency(&edge.id).await;
        if let Err(e) = &result {
            warn!(edge = %edge.id, error = %e, "failed to remove dependency");
            self.write_ui(|s| s.notice(Notice::error("Failed to remove dependency")));
        }
        self.refresh().await;
        result
    }

    // ---- filters -----------------------------------------------------------

    pub fn set_search_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.write_filters(|f| f.set_search_text(text));
    }

    pub fn toggle_priority_filter(&self, priority: Priority) {
        self.write_filters(|f| f.toggle_priority(priority));
    }

    pub fn toggle_assignee_filter(&self, user_id: &str) {
        self.write_filters(|f| f.toggle_assignee(user_id));
    }

    pub fn toggle_type_filter(&self, task_type: TaskType) {
        self.write_filters(|f| f.toggle_task_type(task_type));
    }

    pub fn toggle_tag_filter(&self, tag: &str) {
        self.write_filters(|f| f.toggle_tag(tag));
    }

    pub fn reset_filters(&self) {
        self.write_filters(FilterState::reset);
    }

    // ---- selection and celebration ----------------------------------------

    pub fn toggle_expanded(&self, id: &TaskId) {
        self.write_ui(|s| {
            if !s.selection.expanded.remove(id) {
                s.selection.expanded.insert(id.clone());
            }
        });
    }

    pub fn collapse_all(&self) {
        self.write_ui(|s| s.selection.expanded.clear());
    }

    pub fn open_editor(&self, id: &TaskId) {
        self.write_ui(|s| s.selection.editing = Some(id.clone()));
    }

    pub fn close_editor(&self) {
        self.write_ui(|s| s.selection.editing = None);
    }

    pub fn dismiss_celebration(&self) {
        self.write_ui(|s| s.celebration = Celebration::default());
    }

    // ---- drag support ------------------------------------------------------

    /// Unfiltered ids of the `status` column in display order.
    pub(crate) fn column_ids(&self, status: Status) -> Vec<TaskId> {
        self.read(|s| derive::column_ids(&s.tasks, status, &s.order))
    }

    pub(crate) fn status_of(&self, id: &TaskId) -> Option<Status> {
        self.read(|s| s.task(id).map(|t| t.status))
    }

    /// Move `id` into `status` at `index` (append when `None`), rewriting the manual
    /// ranks of the columns involved. Local only.
    pub(crate) fn place(&self, id: &TaskId, status: Status, index: Option<usize>) -> bool {
        self.write(|s| {
            let Some(from) = s.task(id).map(|t| t.status) else {
                return false;
            };
            let mut source = derive::column_ids(&s.tasks, from, &s.order);
            source.retain(|t| t != id);
            let mut target = if from == status {
                source.clone()
            } else {
                derive::column_ids(&s.tasks, status, &s.order)
            };
            let at = index.map_or(target.len(), |i| i.min(target.len()));
            target.insert(at, id.clone());

            if from != status {
                s.order.set_column(from, source);
                if let Some(task) = s.task_mut(id) {
                    task.status = status;
                    task.touch(Utc::now());
                }
            }
            s.order.set_column(status, target);
            true
        })
    }

    /// Persist the status `id` ended up in after a drag from `origin`.
    ///
    /// No remote call when the status is unchanged. Failure reverts the status to
    /// `origin` and queues a notice.
    pub(crate) fn commit_move(&self, id: &TaskId, origin: Status, position: Option<Point>) -> Persist<()> {
        let target = self.write(|s| {
            let target = s.task(id).map(|t| t.status)?;
            s.celebrate_if_done(origin, target, position);
            Some(target)
        });
        let Some(target) = target.filter(|t| *t != origin) else {
            return future::ready(()).boxed();
        };
        debug!(task = %id, from = %origin, to = %target, "persisting move");

        let store = self.clone();
        let id = id.clone();
        async move {
            match store.inner.gateway.update_task(&id, &TaskPatch::status(target)).await {
                Ok(canonical) => store.reconcile(&id, canonical),
                Err(e) if e.is_not_found() => {
                    warn!(task = %id, "task vanished during move, refetching");
                    store.write_ui(|s| s.notice(Notice::error("Failed to move task")));
                    store.refresh().await;
                }
                Err(e) => {
                    warn!(task = %id, error = %e, "move failed, reverting");
                    store.write(|s| {
                        if let Some(task) = s.task_mut(&id) {
                            task.status = origin;
                            task.touch(Utc::now());
                        }
                        s.notice(Notice::error("Failed to move task"));
                    });
                }
            }
        }
        .boxed()
    }
}
