//! Board entities and the partial-update types that flow through the store.
//!
//! `Task` is the central entity. Sub-entities (subtasks, links) carry an [`EntityId`]
//! that is either confirmed by the server or still pending, so optimistic entries can
//! be told apart from persisted ones while a create is in flight.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BoardError, Result};
use crate::fields::*;

/// Server-assigned task identifier, kept as a string on the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        TaskId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric form used on the wire.
    pub fn wire(&self) -> Result<i64> {
        self.0
            .parse::<i64>()
            .map_err(|_| BoardError::validation("task id", format!("'{}' is not a server id", self.0)))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        TaskId(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        TaskId(s)
    }
}

impl From<i64> for TaskId {
    fn from(n: i64) -> Self {
        TaskId(n.to_string())
    }
}

/// Identifier of a subtask or link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityId {
    /// Confirmed by the server.
    Saved(String),
    /// Locally assigned while the create request is in flight.
    Pending(u64),
}

impl EntityId {
    pub fn is_pending(&self) -> bool {
        matches!(self, EntityId::Pending(_))
    }

    /// The server id, if this entity has been persisted.
    pub fn saved(&self) -> Option<&str> {
        match self {
            EntityId::Saved(id) => Some(id),
            EntityId::Pending(_) => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Saved(id) => f.write_str(id),
            EntityId::Pending(n) => write!(f, "pending-{n}"),
        }
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId::Saved(s.to_string())
    }
}

/// Board member a task can be assigned to. Owned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: EntityId,
    pub title: String,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLink {
    pub id: EntityId,
    pub url: String,
    pub title: Option<String>,
}

/// Directed edge: `task_id` depends on `depends_on`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub id: String,
    pub task_id: TaskId,
    pub depends_on: TaskId,
    pub created_at: DateTime<Utc>,
}

impl Dependency {
    /// Whether this edge is the one `direction` describes between `task` and `other`.
    pub fn matches(&self, task: &TaskId, other: &TaskId, direction: Direction) -> bool {
        match direction {
            Direction::BlockedBy => &self.task_id == task && &self.depends_on == other,
            Direction::Blocking => &self.task_id == other && &self.depends_on == task,
        }
    }
}

/// A work item on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub status: Status,
    pub priority: Priority,
    pub assignee: Option<User>,
    pub task_type: Option<TaskType>,
    pub tags: Option<Vec<String>>,
    pub due_date: Option<NaiveDate>,
    /// Local-only descriptive metadata; never sent to the server.
    #[serde(default)]
    pub failure_cost: Option<String>,
    #[serde(default)]
    pub time_estimate: Option<String>,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub links: Vec<TaskLink>,
    #[serde(default)]
    pub blocking: Vec<TaskId>,
    #[serde(default)]
    pub blocked_by: Vec<TaskId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Minimal task, used by tests and by the undo placeholder.
    pub fn new(id: impl Into<TaskId>, title: impl Into<String>, status: Status) -> Self {
        Task {
            id: id.into(),
            title: title.into(),
            description: None,
            status,
            priority: Priority::None,
            assignee: None,
            task_type: None,
            tags: None,
            due_date: None,
            failure_cost: None,
            time_estimate: None,
            subtasks: Vec::new(),
            links: Vec::new(),
            blocking: Vec::new(),
            blocked_by: Vec::new(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn tags(&self) -> &[String] {
        self.tags.as_deref().unwrap_or(&[])
    }

    /// Take the server's canonical fields while keeping entries still pending locally
    /// and the local-only metadata the server does not know about.
    pub fn reconcile(&mut self, canonical: Task) {
        let previous = std::mem::replace(self, canonical);
        self.inherit_local(previous);
    }

    /// Fill in what a server rendering of this task leaves out from the local copy.
    ///
    /// Task responses may omit sub-entities entirely; an empty list keeps the local
    /// one. Pending entries are always kept.
    pub(crate) fn inherit_local(&mut self, previous: Task) {
        let Task {
            subtasks,
            links,
            failure_cost,
            time_estimate,
            ..
        } = previous;
        if self.subtasks.is_empty() {
            self.subtasks = subtasks;
        } else {
            self.subtasks.extend(subtasks.into_iter().filter(|st| st.id.is_pending()));
        }
        if self.links.is_empty() {
            self.links = links;
        } else {
            self.links.extend(links.into_iter().filter(|l| l.id.is_pending()));
        }
        if self.failure_cost.is_none() {
            self.failure_cost = failure_cost;
        }
        if self.time_estimate.is_none() {
            self.time_estimate = time_estimate;
        }
    }

    /// Stamp an edit, keeping `updated_at` non-decreasing.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(match self.updated_at {
            Some(prev) if prev > now => prev,
            _ => now,
        });
    }
}

/// Create request. Defaults match the board: priority `none`, type `other`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub status: Status,
    pub priority: Priority,
    pub task_type: TaskType,
    pub tags: Option<Vec<String>>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>, status: Status) -> Self {
        TaskDraft {
            title: title.into(),
            status,
            ..Default::default()
        }
    }

    /// Draft that recreates `task` as a new server entity.
    pub fn from_task(task: &Task) -> Self {
        TaskDraft {
            title: task.title.clone(),
            description: task.description.clone(),
            assignee_id: task.assignee.as_ref().map(|u| u.id.clone()),
            due_date: task.due_date,
            status: task.status,
            priority: task.priority,
            task_type: task.task_type.unwrap_or_default(),
            tags: task.tags.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_title(&self.title)
    }
}

pub(crate) fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(BoardError::validation("title", "title cannot be empty"));
    }
    Ok(())
}

/// Extra inputs for adding a task from the board.
#[derive(Debug, Clone, Default)]
pub struct AddTaskOptions {
    pub priority: Option<Priority>,
    pub assignee: Option<User>,
    pub task_type: Option<TaskType>,
    pub tags: Option<Vec<String>>,
    pub due_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub failure_cost: Option<String>,
    pub subtasks: Vec<String>,
    pub blocking: Vec<TaskId>,
    pub blocked_by: Vec<TaskId>,
}

/// Partial update. `None` leaves a field untouched; for clearable fields
/// `Some(None)` clears the value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub task_type: Option<TaskType>,
    pub tags: Option<Option<Vec<String>>>,
    pub assignee: Option<Option<User>>,
    pub due_date: Option<Option<NaiveDate>>,
    pub failure_cost: Option<Option<String>>,
    pub time_estimate: Option<Option<String>>,
}

impl TaskPatch {
    pub fn status(status: Status) -> Self {
        TaskPatch {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn priority(priority: Priority) -> Self {
        TaskPatch {
            priority: Some(priority),
            ..Default::default()
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        TaskPatch {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }

    /// Whether any field the server stores is touched.
    pub fn has_remote_changes(&self) -> bool {
        let local_only = TaskPatch {
            failure_cost: self.failure_cost.clone(),
            time_estimate: self.time_estimate.clone(),
            ..Default::default()
        };
        *self != local_only
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        Ok(())
    }

    /// Merge into `task` and return the patch that restores the prior values of the
    /// touched fields.
    pub fn apply(&self, task: &mut Task) -> TaskPatch {
        let mut inverse = TaskPatch::default();
        if let Some(v) = &self.title {
            inverse.title = Some(std::mem::replace(&mut task.title, v.clone()));
        }
        if let Some(v) = &self.description {
            inverse.description = Some(std::mem::replace(&mut task.description, v.clone()));
        }
        if let Some(v) = self.status {
            inverse.status = Some(std::mem::replace(&mut task.status, v));
        }
        if let Some(v) = self.priority {
            inverse.priority = Some(std::mem::replace(&mut task.priority, v));
        }
        if let Some(v) = self.task_type {
            // absent reads back as `other`
            inverse.task_type = Some(task.task_type.replace(v).unwrap_or_default());
        }
        if let Some(v) = &self.tags {
            inverse.tags = Some(std::mem::replace(&mut task.tags, v.clone()));
        }
        if let Some(v) = &self.assignee {
            inverse.assignee = Some(std::mem::replace(&mut task.assignee, v.clone()));
        }
        if let Some(v) = self.due_date {
            inverse.due_date = Some(std::mem::replace(&mut task.due_date, v));
        }
        if let Some(v) = &self.failure_cost {
            inverse.failure_cost = Some(std::mem::replace(&mut task.failure_cost, v.clone()));
        }
        if let Some(v) = &self.time_estimate {
            inverse.time_estimate = Some(std::mem::replace(&mut task.time_estimate, v.clone()));
        }
        inverse
    }
}

/// Partial subtask update.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubtaskUpdate {
    pub title: Option<String>,
    pub completed: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_inverse_restores_prior_values() {
        let mut task = Task::new("1", "Wash dishes", Status::Todo);
        task.priority = Priority::Low;
        let original = task.clone();

        let patch = TaskPatch {
            title: Some("Wash all dishes".into()),
            priority: Some(Priority::Urgent),
            description: Some(Some("tonight".into())),
            ..Default::default()
        };
        let inverse = patch.apply(&mut task);
        assert_eq!(task.priority, Priority::Urgent);
        assert_eq!(task.description.as_deref(), Some("tonight"));

        inverse.apply(&mut task);
        assert_eq!(task, original);
    }

    #[test]
    fn test_local_only_patch_has_no_remote_changes() {
        let patch = TaskPatch {
            failure_cost: Some(Some("late fee".into())),
            ..Default::default()
        };
        assert!(!patch.has_remote_changes());
        assert!(TaskPatch::status(Status::Done).has_remote_changes());
    }

    #[test]
    fn test_reconcile_keeps_pending_entries() {
        let mut local = Task::new("1", "Pack bags", Status::Todo);
        local.subtasks.push(Subtask {
            id: EntityId::Pending(7),
            title: "Socks".into(),
            completed: false,
        });
        local.failure_cost = Some("miss flight".into());

        let mut canonical = Task::new("1", "Pack bags", Status::InProgress);
        canonical.subtasks.push(Subtask {
            id: EntityId::Saved("3".into()),
            title: "Passport".into(),
            completed: true,
        });

        local.reconcile(canonical);
        assert_eq!(local.status, Status::InProgress);
        assert_eq!(local.subtasks.len(), 2);
        assert!(local.subtasks[1].id.is_pending());
        assert_eq!(local.failure_cost.as_deref(), Some("miss flight"));
    }

    #[test]
    fn test_reconcile_keeps_sub_entities_the_response_omits() {
        let mut local = Task::new("1", "Pack bags", Status::Todo);
        local.subtasks.push(Subtask {
            id: EntityId::Saved("4".into()),
            title: "Charger".into(),
            completed: true,
        });
        local.links.push(TaskLink {
            id: EntityId::Pending(2),
            url: "https://example.com/checklist".into(),
            title: None,
        });

        local.reconcile(Task::new("1", "Pack all bags", Status::Todo));
        assert_eq!(local.title, "Pack all bags");
        assert_eq!(local.subtasks.len(), 1);
        assert_eq!(local.subtasks[0].id, EntityId::Saved("4".into()));
        assert_eq!(local.links.len(), 1);
    }

    #[test]
    fn test_touch_is_monotonic() {
        let mut task = Task::new("1", "x", Status::Todo);
        let later = Utc::now() + chrono::Duration::hours(1);
        task.updated_at = Some(later);
        task.touch(Utc::now());
        assert_eq!(task.updated_at, Some(later));
    }

    #[test]
    fn test_wire_id_requires_number() {
        assert_eq!(TaskId::from("12").wire().unwrap(), 12);
        assert!(TaskId::from("T-1").wire().is_err());
    }

    #[test]
    fn test_dependency_direction_matching() {
        let edge = Dependency {
            id: "9".into(),
            task_id: "A".into(),
            depends_on: "B".into(),
            created_at: Utc::now(),
        };
        let a = TaskId::from("A");
        let b = TaskId::from("B");
        assert!(edge.matches(&a, &b, Direction::BlockedBy));
        assert!(edge.matches(&b, &a, Direction::Blocking));
        assert!(!edge.matches(&a, &b, Direction::Blocking));
    }
}
