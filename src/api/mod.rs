//! Remote task gateway.
//!
//! A thin typed layer between the REST service and the board entities. Reads return
//! converted entities, writes take only the changed fields and return the server's
//! canonical post-write entity. Errors are classified (404 → `NotFound`, any other
//! non-2xx → `Request`); nothing here retries.

use async_trait::async_trait;

use crate::error::Result;
use crate::fields::{Priority, SortBy, SortOrder, Status};
use crate::task::{Dependency, Subtask, SubtaskUpdate, Task, TaskDraft, TaskId, TaskLink, TaskPatch, User};

pub mod http;
pub mod wire;

#[cfg(any(test, feature = "test-support"))]
pub mod memory;

pub use http::HttpGateway;

/// Server-side filters and ordering for a task listing. All fields optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskQuery {
    pub status: Option<Status>,
    pub assigned_user_id: Option<String>,
    pub priority: Option<Priority>,
    pub sort_by: Option<SortBy>,
    pub sort_order: Option<SortOrder>,
}

impl TaskQuery {
    /// Query-string pairs in the order the service documents them.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        if let Some(user) = &self.assigned_user_id {
            pairs.push(("assigned_user_id", user.clone()));
        }
        if let Some(priority) = self.priority {
            pairs.push(("priority", priority.as_str().to_string()));
        }
        if let Some(sort_by) = self.sort_by {
            pairs.push(("sort_by", sort_by.as_str().to_string()));
        }
        if let Some(order) = self.sort_order {
            pairs.push(("sort_order", order.as_str().to_string()));
        }
        pairs
    }
}

/// Operations the board needs from the remote task service.
#[async_trait]
pub trait TaskGateway: Send + Sync {
    async fn list_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>>;

    async fn get_task(&self, id: &TaskId) -> Result<Task>;

    async fn create_task(&self, draft: &TaskDraft) -> Result<Task>;

    /// Send the server-stored subset of `patch`. Local-only fields are dropped.
    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task>;

    async fn delete_task(&self, id: &TaskId) -> Result<()>;

    /// Create the edge "`task` depends on `depends_on`".
    async fn create_dependency(&self, task: &TaskId, depends_on: &TaskId) -> Result<Dependency>;

    async fn delete_dependency(&self, id: &str) -> Result<()>;

    /// Every edge touching `task`, in either direction.
    async fn list_dependencies(&self, task: &TaskId) -> Result<Vec<Dependency>>;

    async fn list_subtasks(&self, task: &TaskId) -> Result<Vec<Subtask>>;

    async fn create_subtask(&self, task: &TaskId, title: &str) -> Result<Subtask>;

    async fn update_subtask(&self, id: &str, update: &SubtaskUpdate) -> Result<Subtask>;

    async fn delete_subtask(&self, id: &str) -> Result<()>;

    async fn list_links(&self, task: &TaskId) -> Result<Vec<TaskLink>>;

    async fn create_link(&self, task: &TaskId, url: &str, title: Option<&str>) -> Result<TaskLink>;

    async fn delete_link(&self, id: &str) -> Result<()>;

    async fn list_users(&self) -> Result<Vec<User>>;

    /// `true` when the service reports itself healthy. Never fails.
    async fn health(&self) -> bool;
}
