//! `TaskGateway` over the REST service, using reqwest.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::wire::*;
use super::{TaskGateway, TaskQuery};
use crate::config::BoardConfig;
use crate::error::{BoardError, Result};
use crate::task::{Dependency, Subtask, SubtaskUpdate, Task, TaskDraft, TaskId, TaskLink, TaskPatch, User};

#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base: String,
    health_url: String,
}

impl HttpGateway {
    pub fn new(config: &BoardConfig) -> Result<Self> {
        config.validate()?;
        let mut builder = Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| BoardError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(HttpGateway {
            client,
            base: config.api_base.trim_end_matches('/').to_string(),
            health_url: config.health_url(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Send and classify the answer, returning the successful response.
    async fn dispatch(&self, req: RequestBuilder, resource: &'static str, id: &str) -> Result<reqwest::Response> {
        let response = req.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            debug!(resource, id, "not found");
            return Err(BoardError::not_found(resource, id));
        }
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);
        warn!(resource, id, status = status.as_u16(), %message, "request failed");
        Err(BoardError::Request {
            status: status.as_u16(),
            message,
        })
    }

    async fn json<T: DeserializeOwned>(&self, req: RequestBuilder, resource: &'static str, id: &str) -> Result<T> {
        let response = self.dispatch(req, resource, id).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Any 2xx, including 204 with no body, is success.
    async fn empty(&self, req: RequestBuilder, resource: &'static str, id: &str) -> Result<()> {
        self.dispatch(req, resource, id).await.map(|_| ())
    }
}

#[async_trait]
impl TaskGateway for HttpGateway {
    async fn list_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>> {
        let req = self.client.get(self.url("/tasks")).query(&query.to_pairs());
        let tasks: Vec<WireTask> = self.json(req, "tasks", "").await?;
        Ok(tasks.into_iter().map(Task::from).collect())
    }

    async fn get_task(&self, id: &TaskId) -> Result<Task> {
        let req = self.client.get(self.url(&format!("/tasks/{id}")));
        let task: WireTask = self.json(req, "task", id.as_str()).await?;
        Ok(task.into())
    }

    async fn create_task(&self, draft: &TaskDraft) -> Result<Task> {
        let body = WireTaskCreate::from_draft(draft)?;
        let req = self.client.post(self.url("/tasks")).json(&body);
        let task: WireTask = self.json(req, "task", "").await?;
        Ok(task.into())
    }

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task> {
        let body = WireTaskUpdate::from_patch(patch)?;
        let req = self.client.put(self.url(&format!("/tasks/{id}"))).json(&body);
        let task: WireTask = self.json(req, "task", id.as_str()).await?;
        Ok(task.into())
    }

    async fn delete_task(&self, id: &TaskId) -> Result<()> {
        let req = self.client.delete(self.url(&format!("/tasks/{id}")));
        self.empty(req, "task", id.as_str()).await
    }

    async fn create_dependency(&self, task: &TaskId, depends_on: &TaskId) -> Result<Dependency> {
        let body = WireDependencyCreate {
            task_id: task.wire()?,
            depends_on_task_id: depends_on.wire()?,
        };
        let req = self.client.post(self.url("/dependencies")).json(&body);
        let dep: WireDependency = self.json(req, "task", task.as_str()).await?;
        Ok(dep.into())
    }

    async fn delete_dependency(&self, id: &str) -> Result<()> {
        let req = self.client.delete(self.url(&format!("/dependencies/{id}")));
        self.empty(req, "dependency", id).await
    }

    async fn list_dependencies(&self, task: &TaskId) -> Result<Vec<Dependency>> {
        let req = self.client.get(self.url(&format!("/dependencies/task/{task}")));
        let deps: Vec<WireDependency> = self.json(req, "task", task.as_str()).await?;
        Ok(deps.into_iter().map(Dependency::from).collect())
    }

    async fn list_subtasks(&self, task: &TaskId) -> Result<Vec<Subtask>> {
        let req = self.client.get(self.url(&format!("/tasks/{task}/subtasks")));
        let subtasks: Vec<WireSubtask> = self.json(req, "task", task.as_str()).await?;
        Ok(subtasks.into_iter().map(Subtask::from).collect())
    }

    async fn create_subtask(&self, task: &TaskId, title: &str) -> Result<Subtask> {
        let body = WireSubtaskCreate { title: title.to_string() };
        let req = self.client.post(self.url(&format!("/tasks/{task}/subtasks"))).json(&body);
        let subtask: WireSubtask = self.json(req, "task", task.as_str()).await?;
        Ok(subtask.into())
    }

    async fn update_subtask(&self, id: &str, update: &SubtaskUpdate) -> Result<Subtask> {
        let body = WireSubtaskUpdate::from(update);
        let req = self.client.patch(self.url(&format!("/subtasks/{id}"))).json(&body);
        let subtask: WireSubtask = self.json(req, "subtask", id).await?;
        Ok(subtask.into())
    }

    async fn delete_subtask(&self, id: &str) -> Result<()> {
        let req = self.client.delete(self.url(&format!("/subtasks/{id}")));
        self.empty(req, "subtask", id).await
    }

    async fn list_links(&self, task: &TaskId) -> Result<Vec<TaskLink>> {
        let req = self.client.get(self.url(&format!("/tasks/{task}/links")));
        let links: Vec<WireTaskLink> = self.json(req, "task", task.as_str()).await?;
        Ok(links.into_iter().map(TaskLink::from).collect())
    }

    async fn create_link(&self, task: &TaskId, url: &str, title: Option<&str>) -> Result<TaskLink> {
        let body = WireLinkCreate {
            url: url.to_string(),
            title: title.map(str::to_string),
        };
        let req = self.client.post(self.url(&format!("/tasks/{task}/links"))).json(&body);
        let link: WireTaskLink = self.json(req, "task", task.as_str()).await?;
        Ok(link.into())
    }

    async fn delete_link(&self, id: &str) -> Result<()> {
        let req = self.client.delete(self.url(&format!("/links/{id}")));
        self.empty(req, "link", id).await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let req = self.client.get(self.url("/users"));
        let users: Vec<WireUser> = self.json(req, "users", "").await?;
        Ok(users.into_iter().map(User::from).collect())
    }

    async fn health(&self) -> bool {
        let response = match self.client.get(&self.health_url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(status = r.status().as_u16(), "health check rejected");
                return false;
            }
            Err(e) => {
                debug!(error = %e, "health check failed");
                return false;
            }
        };
        match response.json::<WireHealth>().await {
            Ok(health) => health.status == "healthy",
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{Priority, SortBy, SortOrder, Status};
    use crate::task::EntityId;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn task_json(id: i64, title: &str, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "title": title,
            "description": null,
            "assigned_user_id": null,
            "due_date": null,
            "status": status,
            "priority": "none",
            "task_type": "other",
            "tags": null,
            "created_at": "2026-10-01T08:00:00",
            "updated_at": "2026-10-01T08:00:00",
            "assignee": null,
            "blocking": [],
            "blocked_by": [],
            "subtasks": [],
            "links": []
        })
    }

    fn gateway(server: &MockServer) -> HttpGateway {
        let config = BoardConfig::default().with_api_base(format!("{}/api", server.uri()));
        HttpGateway::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_list_tasks_sends_query_and_converts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tasks"))
            .and(query_param("status", "todo"))
            .and(query_param("sort_by", "priority"))
            .and(query_param("sort_order", "desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([task_json(1, "Wash dishes", "todo")])))
            .expect(1)
            .mount(&server)
            .await;

        let query = TaskQuery {
            status: Some(Status::Todo),
            sort_by: Some(SortBy::Priority),
            sort_order: Some(SortOrder::Desc),
            ..Default::default()
        };
        let tasks = gateway(&server).list_tasks(&query).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id.as_str(), "1");
        assert_eq!(tasks[0].title, "Wash dishes");
    }

    #[tokio::test]
    async fn test_404_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tasks/42"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Task not found"})))
            .mount(&server)
            .await;

        let err = gateway(&server).get_task(&TaskId::from("42")).await.unwrap_err();
        assert!(err.is_not_found(), "got {err:?}");
    }

    #[tokio::test]
    async fn test_server_detail_is_carried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/dependencies"))
            .and(body_json(json!({"task_id": 1, "depends_on_task_id": 2})))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"detail": "Circular dependency detected"})),
            )
            .mount(&server)
            .await;

        let err = gateway(&server)
            .create_dependency(&TaskId::from("1"), &TaskId::from("2"))
            .await
            .unwrap_err();
        match err {
            BoardError::Request { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Circular dependency detected");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/tasks/3"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .update_task(&TaskId::from("3"), &TaskPatch::priority(Priority::High))
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::Request { status: 502, ref message } if message == "Unknown error"));
    }

    #[tokio::test]
    async fn test_update_sends_only_changed_fields() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/tasks/3"))
            .and(body_json(json!({"status": "done"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(task_json(3, "Laundry", "done")))
            .expect(1)
            .mount(&server)
            .await;

        let task = gateway(&server)
            .update_task(&TaskId::from("3"), &TaskPatch::status(Status::Done))
            .await
            .unwrap();
        assert_eq!(task.status, Status::Done);
    }

    #[tokio::test]
    async fn test_delete_accepts_204() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/tasks/5"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        gateway(&server).delete_task(&TaskId::from("5")).await.unwrap();
    }

    #[tokio::test]
    async fn test_subtask_toggle_uses_patch() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/subtasks/11"))
            .and(body_json(json!({"completed": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 11, "task_id": 3, "title": "Fold shirts", "completed": true,
                "created_at": "2026-10-01T08:00:00", "updated_at": "2026-10-01T08:05:00"
            })))
            .mount(&server)
            .await;

        let update = SubtaskUpdate {
            completed: Some(true),
            ..Default::default()
        };
        let subtask = gateway(&server).update_subtask("11", &update).await.unwrap();
        assert!(subtask.completed);
        assert_eq!(subtask.id.saved(), Some("11"));
    }

    #[tokio::test]
    async fn test_lists_subtasks_and_links() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tasks/3/subtasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 11, "task_id": 3, "title": "Fold shirts", "completed": false}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/tasks/3/links"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 12, "task_id": 3, "url": "https://example.org/folding", "title": null}
            ])))
            .mount(&server)
            .await;

        let gw = gateway(&server);
        let id = TaskId::from("3");
        let subtasks = gw.list_subtasks(&id).await.unwrap();
        assert_eq!(subtasks.len(), 1);
        assert_eq!(subtasks[0].id, EntityId::from("11"));
        let links = gw.list_links(&id).await.unwrap();
        assert_eq!(links[0].url, "https://example.org/folding");
        assert_eq!(links[0].title, None);
    }

    #[tokio::test]
    async fn test_health_uses_root_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "healthy"})))
            .mount(&server)
            .await;

        assert!(gateway(&server).health().await);
    }

    #[tokio::test]
    async fn test_health_false_when_degraded_or_down() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "degraded"})))
            .mount(&server)
            .await;
        assert!(!gateway(&server).health().await);

        let unreachable = BoardConfig::default().with_api_base("http://127.0.0.1:9/api");
        assert!(!HttpGateway::new(&unreachable).unwrap().health().await);
    }
}
