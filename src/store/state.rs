//! State held behind the store's lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::derive::{BoardView, FilterState, ViewOrder};
use crate::fields::Status;
use crate::task::{Task, TaskId};

/// Screen position of a drop, in whatever units the consumer renders in.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Point { x, y }
    }
}

/// Celebration shown when a task reaches "done".
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Celebration {
    pub show: bool,
    pub position: Option<Point>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Transient message for the user, drained by the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub expanded: HashSet<TaskId>,
    pub editing: Option<TaskId>,
}

/// A deleted task that can still be restored.
#[derive(Debug, Clone)]
pub(crate) struct UndoEntry {
    pub task: Task,
    pub expires: Instant,
}

#[derive(Default)]
pub(crate) struct BoardState {
    pub tasks: Vec<Task>,
    pub filters: FilterState,
    pub order: ViewOrder,
    pub is_loading: bool,
    pub error: Option<String>,
    pub selection: Selection,
    pub celebration: Celebration,
    pub undo: HashMap<TaskId, UndoEntry>,
    pub notices: Vec<Notice>,
    next_pending: u64,
    task_rev: u64,
    filter_rev: u64,
    memo: Option<(u64, u64, Arc<BoardView>)>,
}

impl BoardState {
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn task_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| &t.id == id)
    }

    pub fn position(&self, id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| &t.id == id)
    }

    pub fn next_pending(&mut self) -> u64 {
        self.next_pending += 1;
        self.next_pending
    }

    pub fn tasks_changed(&mut self) {
        self.task_rev += 1;
    }

    pub fn filters_changed(&mut self) {
        self.filter_rev += 1;
    }

    pub fn notice(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    /// Flag the celebration if `from` → `to` enters "done".
    pub fn celebrate_if_done(&mut self, from: Status, to: Status, position: Option<Point>) -> bool {
        if from != Status::Done && to == Status::Done {
            self.celebration = Celebration { show: true, position };
            return true;
        }
        false
    }

    /// Replace the task set with a fresh server listing.
    ///
    /// Tasks that survive keep their pending sub-entities, any sub-entities the
    /// listing omits and their local-only metadata. Manual ranks are dropped.
    pub fn replace_tasks(&mut self, fetched: Vec<Task>) {
        let mut previous: HashMap<TaskId, Task> = std::mem::take(&mut self.tasks)
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        self.tasks = fetched
            .into_iter()
            .map(|mut task| {
                if let Some(old) = previous.remove(&task.id) {
                    task.inherit_local(old);
                }
                task
            })
            .collect();
        let live: HashSet<&TaskId> = self.tasks.iter().map(|t| &t.id).collect();
        self.selection.expanded.retain(|id| live.contains(id));
        if self.selection.editing.as_ref().is_some_and(|id| !live.contains(id)) {
            self.selection.editing = None;
        }
        self.order.clear();
        self.tasks_changed();
    }

    /// Derived view for the current revisions, rebuilt only when either changed.
    pub fn view(&mut self) -> Arc<BoardView> {
        if let Some((t, f, view)) = &self.memo {
            if *t == self.task_rev && *f == self.filter_rev {
                return Arc::clone(view);
            }
        }
        let mut view = BoardView::build(&self.tasks, &self.filters, &self.order);
        view.is_loading = self.is_loading;
        view.error = self.error.clone();
        let view = Arc::new(view);
        self.memo = Some((self.task_rev, self.filter_rev, Arc::clone(&view)));
        view
    }
}
