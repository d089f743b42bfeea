//! Drag-and-drop state machine: `Idle → Dragging → (Dropped | Cancelled) → Idle`.
//!
//! Hovering moves the dragged task in the store immediately (column transfer or
//! index move) as a local preview. Only dropping on a target persists, and only the
//! status; intra-column order stays in the view-local ranks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::config::BoardConfig;
use crate::error::{BoardError, Result};
use crate::fields::Status;
use crate::store::{Persist, Point, TaskStore};
use crate::task::{Task, TaskId};

/// What the pointer is over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropTarget {
    /// A column body.
    Column(Status),
    /// A card, by task id.
    Card(TaskId),
}

impl DropTarget {
    /// Column ids resolve to columns, anything else is taken as a card id.
    pub fn parse(id: &str) -> Self {
        match Status::from_column_id(id) {
            Some(status) => DropTarget::Column(status),
            None => DropTarget::Card(TaskId::from(id)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragSession {
    pub active: TaskId,
    pub origin: Status,
    pub is_shaking: bool,
}

struct Shared {
    session: watch::Sender<Option<DragSession>>,
    generation: AtomicU64,
}

#[derive(Clone)]
pub struct DragEngine {
    store: TaskStore,
    shared: Arc<Shared>,
    shake: Duration,
}

impl DragEngine {
    pub fn new(store: TaskStore, config: &BoardConfig) -> Self {
        let (session, _) = watch::channel(None);
        DragEngine {
            store,
            shared: Arc::new(Shared {
                session,
                generation: AtomicU64::new(0),
            }),
            shake: config.shake_delay(),
        }
    }

    pub fn session(&self) -> Option<DragSession> {
        self.shared.session.borrow().clone()
    }

    pub fn is_dragging(&self) -> bool {
        self.shared.session.borrow().is_some()
    }

    /// Receiver for session changes only; store subscribers are not woken.
    pub fn subscribe(&self) -> watch::Receiver<Option<DragSession>> {
        self.shared.session.subscribe()
    }

    pub fn active_task(&self) -> Option<Task> {
        let active = self.session()?.active;
        self.store.task(&active)
    }

    fn set_session(&self, session: Option<DragSession>) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.session.send_replace(session);
    }

    /// Begin dragging `id`, recording its current column as the origin.
    pub fn drag_start(&self, id: &TaskId) -> Result<()> {
        let origin = self
            .store
            .status_of(id)
            .ok_or_else(|| BoardError::not_found("task", id.as_str()))?;
        debug!(task = %id, %origin, "drag start");
        self.set_session(Some(DragSession {
            active: id.clone(),
            origin,
            is_shaking: false,
        }));
        Ok(())
    }

    /// Preview the active task over `target`. Returns whether anything moved.
    pub fn drag_over(&self, target: &DropTarget) -> bool {
        let Some(session) = self.session() else {
            return false;
        };
        let active = &session.active;
        let Some(current) = self.store.status_of(active) else {
            return false;
        };

        let (status, hovered) = match target {
            DropTarget::Column(status) => (*status, None),
            DropTarget::Card(id) if id == active => return false,
            DropTarget::Card(id) => match self.store.status_of(id) {
                Some(status) => (status, Some(id)),
                None => return false,
            },
        };

        let ids = self.store.column_ids(status);
        if status != current {
            let index = hovered.and_then(|h| ids.iter().position(|t| t == h));
            debug!(task = %active, from = %current, to = %status, ?index, "drag over column");
            return self.store.place(active, status, index);
        }

        let Some(hovered) = hovered else {
            return false;
        };
        match (ids.iter().position(|t| t == active), ids.iter().position(|t| t == hovered)) {
            (Some(old), Some(new)) if old != new => self.store.place(active, status, Some(new)),
            _ => false,
        }
    }

    /// Finish the gesture.
    ///
    /// Without a target the session shakes and clears itself after the shake delay,
    /// leaving the last preview in place, unpersisted. With a target the session is
    /// cleared at once and the returned future persists a changed status.
    pub fn drag_end(&self, target: Option<DropTarget>, position: Option<Point>) -> Option<Persist<()>> {
        let session = self.session()?;
        if target.is_none() {
            self.shake_and_clear(session);
            return None;
        }
        debug!(task = %session.active, "drop");
        self.set_session(None);
        Some(self.store.commit_move(&session.active, session.origin, position))
    }

    /// Abandon the gesture as if dropped on nothing.
    pub fn cancel(&self) {
        if let Some(session) = self.session() {
            self.shake_and_clear(session);
        }
    }

    fn shake_and_clear(&self, session: DragSession) {
        debug!(task = %session.active, "drop without target");
        self.set_session(Some(DragSession {
            is_shaking: true,
            ..session
        }));
        let generation = self.shared.generation.load(Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let delay = self.shake;
        let clear = move || {
            if shared.generation.load(Ordering::SeqCst) == generation {
                shared.generation.fetch_add(1, Ordering::SeqCst);
                shared.session.send_replace(None);
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    clear();
                });
            }
            Err(_) => clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::{Endpoint, MemoryGateway};
    use crate::fields::Priority;

    fn task(id: &str, status: Status, priority: Priority) -> Task {
        let mut t = Task::new(id, format!("Task {id}"), status);
        t.priority = priority;
        t
    }

    async fn setup(tasks: Vec<Task>) -> (Arc<MemoryGateway>, TaskStore, DragEngine) {
        let gateway = Arc::new(MemoryGateway::with_tasks(tasks));
        let config = BoardConfig::default();
        let store = TaskStore::new(gateway.clone(), &config);
        store.load().await;
        gateway.clear_calls();
        let engine = DragEngine::new(store.clone(), &config);
        (gateway, store, engine)
    }

    fn column(store: &TaskStore, status: Status) -> Vec<String> {
        store
            .view()
            .column(status)
            .tasks
            .iter()
            .map(|t| t.id.to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_column_transfer_persists_once() {
        let (gw, store, engine) = setup(vec![task("X", Status::Todo, Priority::None)]).await;
        let x = TaskId::from("X");

        engine.drag_start(&x).unwrap();
        assert!(engine.drag_over(&DropTarget::Column(Status::InProgress)));
        assert!(engine.drag_over(&DropTarget::Column(Status::Done)));
        assert_eq!(gw.call_count(Endpoint::UpdateTask), 0);

        let persist = engine.drag_end(Some(DropTarget::Column(Status::Done)), None).unwrap();
        assert!(engine.session().is_none());
        persist.await;

        assert_eq!(gw.call_count(Endpoint::UpdateTask), 1);
        assert_eq!(store.task(&x).unwrap().status, Status::Done);
        assert_eq!(gw.task(&x).unwrap().status, Status::Done);
    }

    #[tokio::test]
    async fn test_failed_drop_reverts_to_origin() {
        let (gw, store, engine) = setup(vec![task("X", Status::Todo, Priority::None)]).await;
        let x = TaskId::from("X");
        gw.fail_next(Endpoint::UpdateTask, 500, "db down");

        engine.drag_start(&x).unwrap();
        engine.drag_over(&DropTarget::Column(Status::Done));
        assert_eq!(column(&store, Status::Done), vec!["X"]);

        engine.drag_end(Some(DropTarget::Column(Status::Done)), None).unwrap().await;
        assert_eq!(store.task(&x).unwrap().status, Status::Todo);
        assert_eq!(column(&store, Status::Todo), vec!["X"]);
        assert_eq!(store.take_notices().len(), 1);
    }

    #[tokio::test]
    async fn test_drop_into_done_celebrates_at_drop_point() {
        let (_gw, store, engine) = setup(vec![task("X", Status::InProgress, Priority::None)]).await;
        engine.drag_start(&"X".into()).unwrap();
        engine.drag_over(&DropTarget::Column(Status::Done));
        let at = Point::new(120.0, 48.0);
        engine.drag_end(Some(DropTarget::Column(Status::Done)), Some(at)).unwrap().await;

        let celebration = store.celebration();
        assert!(celebration.show);
        assert_eq!(celebration.position, Some(at));
    }

    #[tokio::test]
    async fn test_hover_card_inserts_before_it() {
        let (_gw, store, engine) = setup(vec![
            task("a", Status::Done, Priority::Urgent),
            task("b", Status::Done, Priority::Low),
            task("x", Status::Todo, Priority::None),
        ])
        .await;
        engine.drag_start(&"x".into()).unwrap();
        assert!(engine.drag_over(&DropTarget::Card("b".into())));
        assert_eq!(column(&store, Status::Done), vec!["a", "x", "b"]);
        assert_eq!(store.task(&"x".into()).unwrap().status, Status::Done);
    }

    #[tokio::test]
    async fn test_same_column_reorder_is_local_only() {
        let (gw, store, engine) = setup(vec![
            task("a", Status::Todo, Priority::Urgent),
            task("b", Status::Todo, Priority::High),
            task("c", Status::Todo, Priority::Low),
        ])
        .await;
        engine.drag_start(&"c".into()).unwrap();
        assert!(engine.drag_over(&DropTarget::Card("b".into())));
        assert_eq!(column(&store, Status::Todo), vec!["a", "c", "b"]);
        assert!(engine.drag_over(&DropTarget::Card("a".into())));
        assert_eq!(column(&store, Status::Todo), vec!["c", "a", "b"]);

        let persist = engine.drag_end(Some(DropTarget::Card("a".into())), None).unwrap();
        persist.await;
        assert_eq!(gw.call_count(Endpoint::UpdateTask), 0);

        store.refresh().await;
        assert_eq!(column(&store, Status::Todo), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_hovering_self_or_unknown_is_noop() {
        let (_gw, store, engine) = setup(vec![
            task("a", Status::Todo, Priority::Urgent),
            task("b", Status::Todo, Priority::Low),
        ])
        .await;
        assert!(!engine.drag_over(&DropTarget::Column(Status::Done)));

        engine.drag_start(&"a".into()).unwrap();
        assert!(!engine.drag_over(&DropTarget::Card("a".into())));
        assert!(!engine.drag_over(&DropTarget::Card("ghost".into())));
        assert!(!engine.drag_over(&DropTarget::Column(Status::Todo)));
        assert_eq!(column(&store, Status::Todo), vec!["a", "b"]);
        assert!(engine.drag_start(&"ghost".into()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_on_nothing_shakes_then_clears() {
        let (gw, store, engine) = setup(vec![task("X", Status::Todo, Priority::None)]).await;
        engine.drag_start(&"X".into()).unwrap();
        engine.drag_over(&DropTarget::Column(Status::InProgress));

        assert!(engine.drag_end(None, None).is_none());
        assert!(engine.session().unwrap().is_shaking);

        tokio::time::sleep(Duration::from_millis(450)).await;
        assert!(engine.session().is_some());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(engine.session().is_none());

        assert_eq!(store.task(&"X".into()).unwrap().status, Status::InProgress);
        assert_eq!(gw.call_count(Endpoint::UpdateTask), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_drag_survives_stale_shake_timer() {
        let (_gw, _store, engine) = setup(vec![
            task("a", Status::Todo, Priority::None),
            task("b", Status::Todo, Priority::None),
        ])
        .await;
        engine.drag_start(&"a".into()).unwrap();
        engine.cancel();
        engine.drag_start(&"b".into()).unwrap();

        tokio::time::sleep(Duration::from_millis(600)).await;
        let session = engine.session().unwrap();
        assert_eq!(session.active, TaskId::from("b"));
        assert!(!session.is_shaking);
    }

    #[tokio::test]
    async fn test_session_changes_do_not_wake_store() {
        let (_gw, store, engine) = setup(vec![task("a", Status::Todo, Priority::None)]).await;
        let mut store_rx = store.subscribe();
        let _ = store_rx.borrow_and_update();
        let mut drag_rx = engine.subscribe();
        let _ = drag_rx.borrow_and_update();

        engine.drag_start(&"a".into()).unwrap();
        assert!(drag_rx.has_changed().unwrap());
        assert!(!store_rx.has_changed().unwrap());
        assert_eq!(engine.active_task().unwrap().id, TaskId::from("a"));
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(DropTarget::parse("in-progress"), DropTarget::Column(Status::InProgress));
        assert_eq!(DropTarget::parse("17"), DropTarget::Card("17".into()));
    }
}
