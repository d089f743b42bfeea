//! Wire schema of the task service and its conversion to board entities.
//!
//! The service speaks numeric ids and snake_case fields with nullable unions; the
//! board uses string ids and optional fields. Conversion is exact apart from id
//! stringification.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BoardError, Result};
use crate::fields::{Priority, Status, TaskType};
use crate::task::*;

/// `serde(with)` helpers reading timestamps with or without a UTC offset.
///
/// The service emits naive ISO timestamps for some rows; those are read as UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => s.serialize_str(&v.to_rfc3339()),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(d)? {
                None => Ok(None),
                Some(raw) => parse(&raw)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'"))),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireUser {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireSubtaskInTask {
    pub id: i64,
    pub title: String,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireLinkInTask {
    pub id: i64,
    pub url: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireTask {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub assigned_user_id: Option<i64>,
    pub due_date: Option<NaiveDate>,
    pub status: Status,
    pub priority: Priority,
    pub task_type: TaskType,
    pub tags: Option<Vec<String>>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assignee: Option<WireUser>,
    #[serde(default)]
    pub blocking: Vec<i64>,
    #[serde(default)]
    pub blocked_by: Vec<i64>,
    #[serde(default)]
    pub subtasks: Vec<WireSubtaskInTask>,
    #[serde(default)]
    pub links: Vec<WireLinkInTask>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireDependency {
    pub id: i64,
    pub task_id: i64,
    pub depends_on_task_id: i64,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireSubtask {
    pub id: i64,
    pub task_id: i64,
    pub title: String,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireTaskLink {
    pub id: i64,
    pub task_id: i64,
    pub url: String,
    pub title: Option<String>,
}

/// Body of `POST /tasks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireTaskCreate {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub status: Status,
    pub priority: Priority,
    pub task_type: TaskType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Body of `PUT /tasks/{id}`. Unset fields are omitted; clearable fields serialise
/// `Some(None)` as `null`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WireTaskUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub assigned_user_id: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub tags: Option<Option<Vec<String>>>,
}

/// Distinguish a present `null` (`Some(None)`) from an absent field (`None`).
fn nullable<'de, T, D>(d: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(d).map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireDependencyCreate {
    pub task_id: i64,
    pub depends_on_task_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireSubtaskCreate {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WireSubtaskUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireLinkCreate {
    pub url: String,
    pub title: Option<String>,
}

/// Error body of a non-2xx answer.
#[derive(Debug, Deserialize)]
pub struct WireErrorBody {
    pub detail: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct WireHealth {
    pub status: String,
}

fn parse_user_id(raw: &str) -> Result<i64> {
    raw.parse::<i64>()
        .map_err(|_| BoardError::validation("assignee", format!("'{raw}' is not a server user id")))
}

impl From<WireUser> for User {
    fn from(w: WireUser) -> Self {
        User {
            id: w.id.to_string(),
            name: w.name,
            avatar: w.avatar,
        }
    }
}

impl From<WireSubtask> for Subtask {
    fn from(w: WireSubtask) -> Self {
        Subtask {
            id: EntityId::Saved(w.id.to_string()),
            title: w.title,
            completed: w.completed,
        }
    }
}

impl From<WireTaskLink> for TaskLink {
    fn from(w: WireTaskLink) -> Self {
        TaskLink {
            id: EntityId::Saved(w.id.to_string()),
            url: w.url,
            title: w.title,
        }
    }
}

impl From<WireDependency> for Dependency {
    fn from(w: WireDependency) -> Self {
        Dependency {
            id: w.id.to_string(),
            task_id: TaskId::from(w.task_id),
            depends_on: TaskId::from(w.depends_on_task_id),
            created_at: w.created_at,
        }
    }
}

impl From<WireTask> for Task {
    fn from(w: WireTask) -> Self {
        Task {
            id: TaskId::from(w.id),
            title: w.title,
            description: w.description,
            status: w.status,
            priority: w.priority,
            assignee: w.assignee.map(User::from),
            task_type: Some(w.task_type),
            tags: w.tags,
            due_date: w.due_date,
            failure_cost: None,
            time_estimate: None,
            subtasks: w
                .subtasks
                .into_iter()
                .map(|st| Subtask {
                    id: EntityId::Saved(st.id.to_string()),
                    title: st.title,
                    completed: st.completed,
                })
                .collect(),
            links: w
                .links
                .into_iter()
                .map(|l| TaskLink {
                    id: EntityId::Saved(l.id.to_string()),
                    url: l.url,
                    title: l.title,
                })
                .collect(),
            blocking: w.blocking.into_iter().map(TaskId::from).collect(),
            blocked_by: w.blocked_by.into_iter().map(TaskId::from).collect(),
            created_at: w.created_at,
            updated_at: w.updated_at,
        }
    }
}

impl WireTaskCreate {
    pub fn from_draft(draft: &TaskDraft) -> Result<Self> {
        Ok(WireTaskCreate {
            title: draft.title.clone(),
            description: draft.description.clone(),
            assigned_user_id: draft.assignee_id.as_deref().map(parse_user_id).transpose()?,
            due_date: draft.due_date,
            status: draft.status,
            priority: draft.priority,
            task_type: draft.task_type,
            tags: draft.tags.clone(),
        })
    }
}

impl WireTaskUpdate {
    /// Server-stored subset of `patch`.
    pub fn from_patch(patch: &TaskPatch) -> Result<Self> {
        let assigned_user_id = match &patch.assignee {
            None => None,
            Some(None) => Some(None),
            Some(Some(user)) => Some(Some(parse_user_id(&user.id)?)),
        };
        Ok(WireTaskUpdate {
            title: patch.title.clone(),
            description: patch.description.clone(),
            assigned_user_id,
            due_date: patch.due_date,
            status: patch.status,
            priority: patch.priority,
            task_type: patch.task_type,
            tags: patch.tags.clone(),
        })
    }

    pub fn is_empty(&self) -> bool {
        *self == WireTaskUpdate::default()
    }
}

impl From<&SubtaskUpdate> for WireSubtaskUpdate {
    fn from(u: &SubtaskUpdate) -> Self {
        WireSubtaskUpdate {
            title: u.title.clone(),
            completed: u.completed,
        }
    }
}

/// Message carried by an error body: `detail` when it is a string, its JSON text
/// when it is structured (validation errors), "Request failed" when absent.
pub fn error_message(body: &str) -> String {
    match serde_json::from_str::<WireErrorBody>(body) {
        Ok(WireErrorBody { detail: Some(serde_json::Value::String(s)) }) => s,
        Ok(WireErrorBody { detail: Some(other) }) => other.to_string(),
        Ok(WireErrorBody { detail: None }) => "Request failed".to_string(),
        Err(_) => "Unknown error".to_string(),
    }
}
