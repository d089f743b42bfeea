//! Subtask and link mutations.
//!
//! New entries are shown at once under an [`EntityId::Pending`] id and swapped for
//! the server's entity when the create succeeds. Entries still pending cannot be
//! toggled or removed.

use chrono::Utc;
use futures::future::FutureExt;
use tracing::{debug, warn};

use super::{Notice, Persist, TaskStore};
use crate::error::{BoardError, Result};
use crate::task::*;

fn missing_task(id: &TaskId) -> BoardError {
    BoardError::not_found("task", id.as_str())
}

fn saved_id(id: &EntityId, what: &'static str) -> Result<String> {
    id.saved()
        .map(str::to_string)
        .ok_or_else(|| BoardError::validation(what, format!("{id} has not been saved yet")))
}

impl TaskStore {
    /// Append a subtask and create it on the server.
    pub fn add_subtask(&self, task_id: &TaskId, title: &str) -> Result<Persist<Result<Subtask>>> {
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(BoardError::validation("subtask", "title cannot be empty"));
        }
        let pending = self.write(|s| {
            let pending = EntityId::Pending(s.next_pending());
            let task = s.task_mut(task_id).ok_or_else(|| missing_task(task_id))?;
            task.subtasks.push(Subtask {
                id: pending.clone(),
                title: title.clone(),
                completed: false,
            });
            task.touch(Utc::now());
            Ok::<_, BoardError>(pending)
        })?;
        debug!(task = %task_id, subtask = %pending, "added pending subtask");

        let store = self.clone();
        let task_id = task_id.clone();
        Ok(async move {
            let result = store.inner.gateway.create_subtask(&task_id, &title).await;
            store.write(|s| {
                let Some(task) = s.task_mut(&task_id) else {
                    return;
                };
                match &result {
                    Ok(saved) => {
                        if let Some(entry) = task.subtasks.iter_mut().find(|st| st.id == pending) {
                            *entry = saved.clone();
                        }
                    }
                    Err(_) => task.subtasks.retain(|st| st.id != pending),
                }
            });
            if let Err(e) = &result {
                warn!(task = %task_id, error = %e, "failed to create subtask");
                store.write_ui(|s| s.notice(Notice::error("Failed to add subtask")));
            }
            result
        }
        .boxed())
    }

    /// Flip a saved subtask's completion and persist it.
    pub fn toggle_subtask(&self, task_id: &TaskId, subtask_id: &EntityId) -> Result<Persist<Result<Subtask>>> {
        let remote_id = saved_id(subtask_id, "subtask")?;
        let prior = self.write(|s| {
            let task = s.task_mut(task_id).ok_or_else(|| missing_task(task_id))?;
            let entry = task
                .subtasks
                .iter_mut()
                .find(|st| &st.id == subtask_id)
                .ok_or_else(|| BoardError::not_found("subtask", remote_id.clone()))?;
            let prior = entry.completed;
            entry.completed = !prior;
            task.touch(Utc::now());
            Ok::<_, BoardError>(prior)
        })?;

        let store = self.clone();
        let task_id = task_id.clone();
        let subtask_id = subtask_id.clone();
        Ok(async move {
            let update = SubtaskUpdate {
                completed: Some(!prior),
                ..Default::default()
            };
            let result = store.inner.gateway.update_subtask(&remote_id, &update).await;
            store.write(|s| {
                let entry = s
                    .task_mut(&task_id)
                    .and_then(|t| t.subtasks.iter_mut().find(|st| st.id == subtask_id));
                if let Some(entry) = entry {
                    match &result {
                        Ok(saved) => *entry = saved.clone(),
                        Err(_) => entry.completed = prior,
                    }
                }
            });
            if let Err(e) = &result {
                warn!(subtask = %subtask_id, error = %e, "failed to toggle subtask");
                store.write_ui(|s| s.notice(Notice::error("Failed to update subtask")));
            }
            result
        }
        .boxed())
    }

    /// Remove a saved subtask; a failed delete puts it back at the end.
    pub fn remove_subtask(&self, task_id: &TaskId, subtask_id: &EntityId) -> Result<Persist<Result<()>>> {
        let remote_id = saved_id(subtask_id, "subtask")?;
        let removed = self.write(|s| {
            let task = s.task_mut(task_id).ok_or_else(|| missing_task(task_id))?;
            let pos = task
                .subtasks
                .iter()
                .position(|st| &st.id == subtask_id)
                .ok_or_else(|| BoardError::not_found("subtask", remote_id.clone()))?;
            task.touch(Utc::now());
            Ok::<_, BoardError>(task.subtasks.remove(pos))
        })?;

        let store = self.clone();
        let task_id = task_id.clone();
        Ok(async move {
            let result = store.inner.gateway.delete_subtask(&remote_id).await;
            if let Err(e) = &result {
                warn!(subtask = %remote_id, error = %e, "failed to delete subtask");
                store.write(|s| {
                    if let Some(task) = s.task_mut(&task_id) {
                        task.subtasks.push(removed);
                    }
                    s.notice(Notice::error("Failed to remove subtask"));
                });
            }
            result
        }
        .boxed())
    }

    /// Append a link and create it on the server.
    pub fn add_link(&self, task_id: &TaskId, url: &str, title: Option<&str>) -> Result<Persist<Result<TaskLink>>> {
        let url = url.trim().to_string();
        if url.is_empty() {
            return Err(BoardError::validation("link", "url cannot be empty"));
        }
        let title = title.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string);
        let pending = self.write(|s| {
            let pending = EntityId::Pending(s.next_pending());
            let task = s.task_mut(task_id).ok_or_else(|| missing_task(task_id))?;
            task.links.push(TaskLink {
                id: pending.clone(),
                url: url.clone(),
                title: title.clone(),
            });
            task.touch(Utc::now());
            Ok::<_, BoardError>(pending)
        })?;
        debug!(task = %task_id, link = %pending, "added pending link");

        let store = self.clone();
        let task_id = task_id.clone();
        Ok(async move {
            let result = store
                .inner
                .gateway
                .create_link(&task_id, &url, title.as_deref())
                .await;
            store.write(|s| {
                let Some(task) = s.task_mut(&task_id) else {
                    return;
                };
                match &result {
                    Ok(saved) => {
                        if let Some(entry) = task.links.iter_mut().find(|l| l.id == pending) {
                            *entry = saved.clone();
                        }
                    }
                    Err(_) => task.links.retain(|l| l.id != pending),
                }
            });
            if let Err(e) = &result {
                warn!(task = %task_id, error = %e, "failed to create link");
                store.write_ui(|s| s.notice(Notice::error("Failed to add link")));
            }
            result
        }
        .boxed())
    }

    /// Remove a saved link; a failed delete puts it back at the end.
    pub fn remove_link(&self, task_id: &TaskId, link_id: &EntityId) -> Result<Persist<Result<()>>> {
        let remote_id = saved_id(link_id, "link")?;
        let removed = self.write(|s| {
            let task = s.task_mut(task_id).ok_or_else(|| missing_task(task_id))?;
            let pos = task
                .links
                .iter()
                .position(|l| &l.id == link_id)
                .ok_or_else(|| BoardError::not_found("link", remote_id.clone()))?;
            task.touch(Utc::now());
            Ok::<_, BoardError>(task.links.remove(pos))
        })?;

        let store = self.clone();
        let task_id = task_id.clone();
        Ok(async move {
            let result = store.inner.gateway.delete_link(&remote_id).await;
            if let Err(e) = &result {
                warn!(link = %remote_id, error = %e, "failed to delete link");
                store.write(|s| {
                    if let Some(task) = s.task_mut(&task_id) {
                        task.links.push(removed);
                    }
                    s.notice(Notice::error("Failed to remove link"));
                });
            }
            result
        }
        .boxed())
    }
}
