//! In-process stand-in for the task service.
//!
//! Keeps tasks, users and dependency edges in memory, mirrors edges into
//! `blocking`/`blocked_by` on every read, validates edges the way the service does
//! and lets tests inject failures per endpoint. All calls are recorded.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;

use super::{TaskGateway, TaskQuery};
use crate::error::{BoardError, Result};
use crate::fields::{Priority, SortBy, SortOrder};
use crate::task::*;

/// Gateway operation, used for failure injection and the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ListTasks,
    GetTask,
    CreateTask,
    UpdateTask,
    DeleteTask,
    CreateDependency,
    DeleteDependency,
    ListDependencies,
    ListSubtasks,
    CreateSubtask,
    UpdateSubtask,
    DeleteSubtask,
    ListLinks,
    CreateLink,
    DeleteLink,
    ListUsers,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub endpoint: Endpoint,
    pub target: String,
}

#[derive(Debug, Clone)]
enum Failure {
    Status(u16, String),
    NotFound,
    Transport,
}

#[derive(Default)]
struct Server {
    tasks: Vec<Task>,
    edges: Vec<Dependency>,
    users: Vec<User>,
    next_id: u64,
    ticks: i64,
    failures: Vec<(Endpoint, Failure)>,
    calls: Vec<Call>,
    unhealthy: bool,
    bare_responses: bool,
}

impl Server {
    fn now(&mut self) -> DateTime<Utc> {
        self.ticks += 1;
        epoch() + Duration::seconds(self.ticks)
    }

    /// Next autoincrement id. Ids are never handed out twice, even after a delete.
    fn fresh_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    /// Raise the high-water mark past a seeded numeric id.
    fn reserve(&mut self, id: &str) {
        if let Ok(n) = id.parse::<u64>() {
            self.next_id = self.next_id.max(n);
        }
    }

    /// Record the call, then fail it if a failure is queued for `endpoint`.
    fn enter(&mut self, endpoint: Endpoint, target: &str) -> Result<()> {
        self.calls.push(Call {
            endpoint,
            target: target.to_string(),
        });
        let Some(pos) = self.failures.iter().position(|(e, _)| *e == endpoint) else {
            return Ok(());
        };
        let (_, failure) = self.failures.remove(pos);
        Err(match failure {
            Failure::Status(status, message) => BoardError::Request { status, message },
            Failure::NotFound => BoardError::not_found("task", target),
            Failure::Transport => BoardError::Transport("connection reset".into()),
        })
    }

    fn position(&self, id: &TaskId) -> Result<usize> {
        self.tasks
            .iter()
            .position(|t| &t.id == id)
            .ok_or_else(|| BoardError::not_found("task", id.as_str()))
    }

    /// Task as the service renders it: edges mirrored, no local-only fields.
    fn render(&self, task: &Task) -> Task {
        let mut out = task.clone();
        out.blocked_by = self
            .edges
            .iter()
            .filter(|e| e.task_id == task.id)
            .map(|e| e.depends_on.clone())
            .collect();
        out.blocking = self
            .edges
            .iter()
            .filter(|e| e.depends_on == task.id)
            .map(|e| e.task_id.clone())
            .collect();
        out.failure_cost = None;
        out.time_estimate = None;
        out
    }

    /// Task as returned by a task endpoint; bare responses leave sub-entities out.
    fn respond(&self, task: &Task) -> Task {
        let mut out = self.render(task);
        if self.bare_responses {
            out.subtasks.clear();
            out.links.clear();
        }
        out
    }

    fn user(&self, id: &str) -> Result<User> {
        self.users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or_else(|| BoardError::not_found("user", id))
    }

    /// Whether `from` reaches `to` by following depends-on edges.
    fn reaches(&self, from: &TaskId, to: &TaskId) -> bool {
        let mut stack = vec![from.clone()];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if &current == to {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            stack.extend(
                self.edges
                    .iter()
                    .filter(|e| e.task_id == current)
                    .map(|e| e.depends_on.clone()),
            );
        }
        false
    }
}

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

fn bad_request(message: &str) -> BoardError {
    BoardError::Request {
        status: 400,
        message: message.to_string(),
    }
}

/// Simulated task service. Share it with the store as `Arc<MemoryGateway>`.
#[derive(Default)]
pub struct MemoryGateway {
    server: Mutex<Server>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the service with `tasks`, kept in the given order.
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let gateway = Self::new();
        for task in tasks {
            gateway.insert_task(task);
        }
        gateway
    }

    pub fn with_users(self, users: Vec<User>) -> Self {
        self.server.lock().users = users;
        self
    }

    /// Task endpoints omit subtasks and links, as the real service does.
    pub fn with_bare_responses(self) -> Self {
        self.server.lock().bare_responses = true;
        self
    }

    /// Insert or replace a task directly, bypassing the call log.
    pub fn insert_task(&self, task: Task) {
        let mut server = self.server.lock();
        server.reserve(task.id.as_str());
        for id in task
            .subtasks
            .iter()
            .filter_map(|st| st.id.saved())
            .chain(task.links.iter().filter_map(|l| l.id.saved()))
        {
            server.reserve(id);
        }
        match server.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task,
            None => server.tasks.push(task),
        }
    }

    /// Edit a stored task as another client would.
    pub fn edit_task(&self, id: &TaskId, edit: impl FnOnce(&mut Task)) {
        let mut server = self.server.lock();
        if let Some(task) = server.tasks.iter_mut().find(|t| &t.id == id) {
            edit(task);
        }
    }

    /// Stored task with edges mirrored, if it exists.
    pub fn task(&self, id: &TaskId) -> Option<Task> {
        let server = self.server.lock();
        server.tasks.iter().find(|t| &t.id == id).map(|t| server.render(t))
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.server.lock().tasks.iter().map(|t| t.id.clone()).collect()
    }

    /// Fail the next call to `endpoint` with `status` and `message`.
    pub fn fail_next(&self, endpoint: Endpoint, status: u16, message: &str) {
        self.server
            .lock()
            .failures
            .push((endpoint, Failure::Status(status, message.to_string())));
    }

    /// Fail the next call to `endpoint` with a 404.
    pub fn fail_next_not_found(&self, endpoint: Endpoint) {
        self.server.lock().failures.push((endpoint, Failure::NotFound));
    }

    /// Fail the next call to `endpoint` as if the connection dropped.
    pub fn fail_next_transport(&self, endpoint: Endpoint) {
        self.server.lock().failures.push((endpoint, Failure::Transport));
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.server.lock().unhealthy = !healthy;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.server.lock().calls.clone()
    }

    pub fn call_count(&self, endpoint: Endpoint) -> usize {
        self.server
            .lock()
            .calls
            .iter()
            .filter(|c| c.endpoint == endpoint)
            .count()
    }

    pub fn clear_calls(&self) {
        self.server.lock().calls.clear();
    }
}

#[async_trait]
impl TaskGateway for MemoryGateway {
    async fn list_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>> {
        let mut server = self.server.lock();
        server.enter(Endpoint::ListTasks, "")?;
        let mut tasks: Vec<Task> = server
            .tasks
            .iter()
            .filter(|t| query.status.map_or(true, |s| t.status == s))
            .filter(|t| query.priority.map_or(true, |p| t.priority == p))
            .filter(|t| {
                query.assigned_user_id.as_ref().map_or(true, |uid| {
                    t.assignee.as_ref().is_some_and(|u| &u.id == uid)
                })
            })
            .map(|t| server.respond(t))
            .collect();

        let order = query.sort_order.unwrap_or(SortOrder::Desc);
        match query.sort_by.unwrap_or(SortBy::CreatedAt) {
            SortBy::CreatedAt => tasks.sort_by_key(|t| t.created_at),
            SortBy::Priority => tasks.sort_by_key(|t| Priority::weight(t.priority)),
            SortBy::DueDate => tasks.sort_by_key(|t| t.due_date),
        }
        if order == SortOrder::Desc {
            tasks.reverse();
        }
        Ok(tasks)
    }

    async fn get_task(&self, id: &TaskId) -> Result<Task> {
        let mut server = self.server.lock();
        server.enter(Endpoint::GetTask, id.as_str())?;
        let pos = server.position(id)?;
        Ok(server.respond(&server.tasks[pos]))
    }

    async fn create_task(&self, draft: &TaskDraft) -> Result<Task> {
        let mut server = self.server.lock();
        server.enter(Endpoint::CreateTask, &draft.title)?;
        draft.validate().map_err(|_| bad_request("title cannot be empty"))?;
        let assignee = draft.assignee_id.as_deref().map(|id| server.user(id)).transpose()?;
        let id = server.fresh_id();
        let now = server.now();
        let task = Task {
            id: TaskId::new(id),
            title: draft.title.clone(),
            description: draft.description.clone(),
            status: draft.status,
            priority: draft.priority,
            assignee,
            task_type: Some(draft.task_type),
            tags: draft.tags.clone(),
            due_date: draft.due_date,
            failure_cost: None,
            time_estimate: None,
            subtasks: Vec::new(),
            links: Vec::new(),
            blocking: Vec::new(),
            blocked_by: Vec::new(),
            created_at: now,
            updated_at: Some(now),
        };
        let rendered = server.respond(&task);
        server.tasks.push(task);
        Ok(rendered)
    }

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task> {
        let mut server = self.server.lock();
        server.enter(Endpoint::UpdateTask, id.as_str())?;
        let pos = server.position(id)?;
        let assignee = match &patch.assignee {
            Some(Some(user)) => Some(Some(server.user(&user.id)?)),
            other => other.clone(),
        };
        let stored = TaskPatch {
            assignee,
            failure_cost: None,
            time_estimate: None,
            ..patch.clone()
        };
        let now = server.now();
        let task = &mut server.tasks[pos];
        stored.apply(task);
        task.updated_at = Some(now);
        let task = server.tasks[pos].clone();
        Ok(server.respond(&task))
    }

    async fn delete_task(&self, id: &TaskId) -> Result<()> {
        let mut server = self.server.lock();
        server.enter(Endpoint::DeleteTask, id.as_str())?;
        let pos = server.position(id)?;
        server.tasks.remove(pos);
        server.edges.retain(|e| &e.task_id != id && &e.depends_on != id);
        Ok(())
    }

    async fn create_dependency(&self, task: &TaskId, depends_on: &TaskId) -> Result<Dependency> {
        let mut server = self.server.lock();
        server.enter(Endpoint::CreateDependency, task.as_str())?;
        server.position(task)?;
        server.position(depends_on)?;
        if task == depends_on {
            return Err(bad_request("A task cannot depend on itself"));
        }
        if server
            .edges
            .iter()
            .any(|e| &e.task_id == task && &e.depends_on == depends_on)
        {
            return Err(bad_request("Dependency already exists"));
        }
        if server.reaches(depends_on, task) {
            return Err(bad_request("Circular dependency detected"));
        }
        let edge = Dependency {
            id: server.fresh_id(),
            task_id: task.clone(),
            depends_on: depends_on.clone(),
            created_at: server.now(),
        };
        server.edges.push(edge.clone());
        Ok(edge)
    }

    async fn delete_dependency(&self, id: &str) -> Result<()> {
        let mut server = self.server.lock();
        server.enter(Endpoint::DeleteDependency, id)?;
        let before = server.edges.len();
        server.edges.retain(|e| e.id != id);
        if server.edges.len() == before {
            return Err(BoardError::not_found("dependency", id));
        }
        Ok(())
    }

    async fn list_dependencies(&self, task: &TaskId) -> Result<Vec<Dependency>> {
        let mut server = self.server.lock();
        server.enter(Endpoint::ListDependencies, task.as_str())?;
        server.position(task)?;
        Ok(server
            .edges
            .iter()
            .filter(|e| &e.task_id == task || &e.depends_on == task)
            .cloned()
            .collect())
    }

    async fn list_subtasks(&self, task: &TaskId) -> Result<Vec<Subtask>> {
        let mut server = self.server.lock();
        server.enter(Endpoint::ListSubtasks, task.as_str())?;
        let pos = server.position(task)?;
        Ok(server.tasks[pos].subtasks.clone())
    }

    async fn create_subtask(&self, task: &TaskId, title: &str) -> Result<Subtask> {
        let mut server = self.server.lock();
        server.enter(Endpoint::CreateSubtask, task.as_str())?;
        let pos = server.position(task)?;
        let subtask = Subtask {
            id: EntityId::Saved(server.fresh_id()),
            title: title.to_string(),
            completed: false,
        };
        server.tasks[pos].subtasks.push(subtask.clone());
        Ok(subtask)
    }

    async fn update_subtask(&self, id: &str, update: &SubtaskUpdate) -> Result<Subtask> {
        let mut server = self.server.lock();
        server.enter(Endpoint::UpdateSubtask, id)?;
        let subtask = server
            .tasks
            .iter_mut()
            .flat_map(|t| t.subtasks.iter_mut())
            .find(|s| s.id.saved() == Some(id))
            .ok_or_else(|| BoardError::not_found("subtask", id))?;
        if let Some(title) = &update.title {
            subtask.title = title.clone();
        }
        if let Some(completed) = update.completed {
            subtask.completed = completed;
        }
        Ok(subtask.clone())
    }

    async fn delete_subtask(&self, id: &str) -> Result<()> {
        let mut server = self.server.lock();
        server.enter(Endpoint::DeleteSubtask, id)?;
        for task in server.tasks.iter_mut() {
            if let Some(pos) = task.subtasks.iter().position(|s| s.id.saved() == Some(id)) {
                task.subtasks.remove(pos);
                return Ok(());
            }
        }
        Err(BoardError::not_found("subtask", id))
    }

    async fn list_links(&self, task: &TaskId) -> Result<Vec<TaskLink>> {
        let mut server = self.server.lock();
        server.enter(Endpoint::ListLinks, task.as_str())?;
        let pos = server.position(task)?;
        Ok(server.tasks[pos].links.clone())
    }

    async fn create_link(&self, task: &TaskId, url: &str, title: Option<&str>) -> Result<TaskLink> {
        let mut server = self.server.lock();
        server.enter(Endpoint::CreateLink, task.as_str())?;
        let pos = server.position(task)?;
        let link = TaskLink {
            id: EntityId::Saved(server.fresh_id()),
            url: url.to_string(),
            title: title.map(str::to_string),
        };
        server.tasks[pos].links.push(link.clone());
        Ok(link)
    }

    async fn delete_link(&self, id: &str) -> Result<()> {
        let mut server = self.server.lock();
        server.enter(Endpoint::DeleteLink, id)?;
        for task in server.tasks.iter_mut() {
            if let Some(pos) = task.links.iter().position(|l| l.id.saved() == Some(id)) {
                task.links.remove(pos);
                return Ok(());
            }
        }
        Err(BoardError::not_found("link", id))
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let mut server = self.server.lock();
        server.enter(Endpoint::ListUsers, "")?;
        Ok(server.users.clone())
    }

    async fn health(&self) -> bool {
        !self.server.lock().unhealthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Status;

    #[tokio::test]
    async fn test_edges_are_mirrored_on_read() {
        let gw = MemoryGateway::with_tasks(vec![
            Task::new("A", "Cook", Status::Todo),
            Task::new("B", "Shop", Status::Todo),
        ]);
        gw.create_dependency(&"A".into(), &"B".into()).await.unwrap();

        let tasks = gw.list_tasks(&TaskQuery::default()).await.unwrap();
        let a = tasks.iter().find(|t| t.id.as_str() == "A").unwrap();
        let b = tasks.iter().find(|t| t.id.as_str() == "B").unwrap();
        assert_eq!(a.blocked_by, vec![TaskId::from("B")]);
        assert_eq!(b.blocking, vec![TaskId::from("A")]);
    }

    #[tokio::test]
    async fn test_rejects_self_duplicate_and_cyclic_edges() {
        let gw = MemoryGateway::with_tasks(vec![
            Task::new("A", "Cook", Status::Todo),
            Task::new("B", "Shop", Status::Todo),
        ]);
        let (a, b) = (TaskId::from("A"), TaskId::from("B"));
        assert!(matches!(
            gw.create_dependency(&a, &a).await,
            Err(BoardError::Request { status: 400, .. })
        ));
        gw.create_dependency(&a, &b).await.unwrap();
        assert!(gw.create_dependency(&a, &b).await.is_err());
        let err = gw.create_dependency(&b, &a).await.unwrap_err();
        assert!(matches!(err, BoardError::Request { ref message, .. } if message.contains("Circular")));
    }

    #[tokio::test]
    async fn test_injected_failure_applies_once() {
        let gw = MemoryGateway::with_tasks(vec![Task::new("1", "Mop", Status::Todo)]);
        gw.fail_next(Endpoint::UpdateTask, 500, "boom");
        let id = TaskId::from("1");
        assert!(gw.update_task(&id, &TaskPatch::status(Status::Done)).await.is_err());
        let task = gw.update_task(&id, &TaskPatch::status(Status::Done)).await.unwrap();
        assert_eq!(task.status, Status::Done);
        assert_eq!(gw.call_count(Endpoint::UpdateTask), 2);
    }

    #[tokio::test]
    async fn test_fresh_ids_skip_seeded_ones() {
        let gw = MemoryGateway::with_tasks(vec![Task::new("1", "Mop", Status::Todo)]);
        let created = gw.create_task(&TaskDraft::new("Sweep", Status::Todo)).await.unwrap();
        assert_eq!(created.id.as_str(), "2");
        assert_eq!(created.task_type, Some(crate::fields::TaskType::Other));
    }

    #[tokio::test]
    async fn test_deleted_ids_are_not_handed_out_again() {
        let gw = MemoryGateway::with_tasks(vec![
            Task::new("1", "Mop", Status::Todo),
            Task::new("4", "Dust", Status::Todo),
        ]);
        gw.delete_task(&"4".into()).await.unwrap();
        let created = gw.create_task(&TaskDraft::new("Sweep", Status::Todo)).await.unwrap();
        assert_eq!(created.id.as_str(), "5");
    }

    #[tokio::test]
    async fn test_bare_responses_omit_sub_entities() {
        let gw = MemoryGateway::with_tasks(vec![Task::new("1", "Mop", Status::Todo)]).with_bare_responses();
        let id = TaskId::from("1");
        gw.create_subtask(&id, "Fill bucket").await.unwrap();

        assert!(gw.get_task(&id).await.unwrap().subtasks.is_empty());
        assert!(gw.list_tasks(&TaskQuery::default()).await.unwrap()[0].subtasks.is_empty());
        assert_eq!(gw.list_subtasks(&id).await.unwrap().len(), 1);
        assert_eq!(gw.task(&id).unwrap().subtasks.len(), 1);
    }

    #[tokio::test]
    async fn test_assignees_subentities_and_health() {
        let sam = User {
            id: "5".into(),
            name: "Sam".into(),
            avatar: None,
        };
        let gw = MemoryGateway::with_tasks(vec![Task::new("1", "Mop", Status::Todo)]).with_users(vec![sam.clone()]);
        let id = TaskId::from("1");

        let mut draft = TaskDraft::new("Dust", Status::Todo);
        draft.assignee_id = Some("5".into());
        assert_eq!(gw.create_task(&draft).await.unwrap().assignee, Some(sam));
        draft.assignee_id = Some("9".into());
        assert!(gw.create_task(&draft).await.unwrap_err().is_not_found());

        gw.create_subtask(&id, "Fill bucket").await.unwrap();
        gw.create_link(&id, "https://example.org/mops", None).await.unwrap();
        assert_eq!(gw.list_subtasks(&id).await.unwrap()[0].title, "Fill bucket");
        assert_eq!(gw.list_links(&id).await.unwrap()[0].url, "https://example.org/mops");
        assert!(gw.list_links(&"404".into()).await.unwrap_err().is_not_found());

        assert!(gw.health().await);
        gw.set_healthy(false);
        assert!(!gw.health().await);
    }
}
