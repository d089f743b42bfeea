//! End-to-end board flows over the in-memory task service.

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use kanban_board::api::memory::{Endpoint, MemoryGateway};
use kanban_board::config::BoardConfig;
use kanban_board::drag::{DragEngine, DropTarget};
use kanban_board::fields::{Direction, Priority, Status};
use kanban_board::store::{Notice, Point, TaskStore};
use kanban_board::task::{AddTaskOptions, Task, TaskId};

fn seeded(id: &str, title: &str, status: Status, priority: Priority, minute: u32) -> Task {
    let mut t = Task::new(id, title, status);
    t.priority = priority;
    t.created_at = Utc.with_ymd_and_hms(2025, 12, 1, 9, minute, 0).unwrap();
    t
}

async fn board(tasks: Vec<Task>) -> (Arc<MemoryGateway>, TaskStore, DragEngine) {
    let gateway = Arc::new(MemoryGateway::with_tasks(tasks));
    let config = BoardConfig::default();
    let store = TaskStore::new(gateway.clone(), &config);
    let drag = DragEngine::new(store.clone(), &config);
    store.load().await;
    gateway.clear_calls();
    (gateway, store, drag)
}

fn titles(store: &TaskStore, status: Status) -> Vec<String> {
    store
        .view()
        .column(status)
        .tasks
        .iter()
        .map(|t| t.title.clone())
        .collect()
}

#[tokio::test]
async fn test_added_task_is_sorted_into_its_column() {
    let (_gw, store, _drag) = board(vec![seeded("1", "Wash dishes", Status::Todo, Priority::None, 0)]).await;

    let options = AddTaskOptions {
        priority: Some(Priority::Urgent),
        ..Default::default()
    };
    let created = store.add_task("Buy milk", Status::Todo, options).await.unwrap();

    assert_ne!(created.id, TaskId::from("1"));
    assert_eq!(titles(&store, Status::Todo), vec!["Buy milk", "Wash dishes"]);
}

#[tokio::test]
async fn test_drag_to_done_persists_status_and_celebrates() {
    let (gw, store, drag) = board(vec![
        seeded("1", "Fold laundry", Status::Todo, Priority::Med, 0),
        seeded("2", "Vacuum stairs", Status::InProgress, Priority::Low, 1),
    ])
    .await;
    let id = TaskId::from("1");

    drag.drag_start(&id).unwrap();
    assert!(drag.drag_over(&DropTarget::Card("2".into())));
    assert_eq!(titles(&store, Status::InProgress), vec!["Fold laundry", "Vacuum stairs"]);
    assert!(drag.drag_over(&DropTarget::parse("done")));
    assert_eq!(titles(&store, Status::Done), vec!["Fold laundry"]);
    assert_eq!(gw.call_count(Endpoint::UpdateTask), 0);

    let persist = drag
        .drag_end(Some(DropTarget::Column(Status::Done)), Some(Point::new(40.0, 12.0)))
        .unwrap();
    assert!(drag.session().is_none());
    persist.await;

    assert_eq!(gw.call_count(Endpoint::UpdateTask), 1);
    assert_eq!(gw.task(&id).unwrap().status, Status::Done);
    let celebration = store.celebration();
    assert!(celebration.show);
    assert_eq!(celebration.position, Some(Point::new(40.0, 12.0)));
    assert!(store.take_notices().is_empty());
}

#[tokio::test]
async fn test_refused_drop_returns_card_to_origin() {
    let (gw, store, drag) = board(vec![seeded("1", "Water plants", Status::Todo, Priority::None, 0)]).await;
    gw.fail_next(Endpoint::UpdateTask, 500, "database locked");
    let id = TaskId::from("1");

    drag.drag_start(&id).unwrap();
    drag.drag_over(&DropTarget::Column(Status::InProgress));
    drag.drag_end(Some(DropTarget::Column(Status::InProgress)), None)
        .unwrap()
        .await;

    assert_eq!(store.task(&id).unwrap().status, Status::Todo);
    assert_eq!(gw.task(&id).unwrap().status, Status::Todo);
    assert_eq!(store.take_notices(), vec![Notice::error("Failed to move task")]);
    assert!(!store.celebration().show);
}

#[tokio::test]
async fn test_filters_narrow_every_column() {
    let mut groceries = seeded("1", "Buy groceries", Status::Todo, Priority::High, 0);
    groceries.tags = Some(vec!["errands".into()]);
    let (_gw, store, _drag) = board(vec![
        groceries,
        seeded("2", "Buy stamps", Status::Done, Priority::Low, 1),
        seeded("3", "Clean gutters", Status::InProgress, Priority::High, 2),
    ])
    .await;

    store.set_search_text("buy");
    assert_eq!(store.view().visible_count(), 2);
    store.toggle_priority_filter(Priority::High);
    assert_eq!(titles(&store, Status::Todo), vec!["Buy groceries"]);
    assert!(titles(&store, Status::Done).is_empty());

    store.reset_filters();
    let view = store.view();
    assert_eq!(view.visible_count(), 3);
    assert_eq!(view.unique_tags, vec!["errands".to_string()]);
    assert!(view.filters.is_empty());
}

#[tokio::test]
async fn test_delete_then_undo_recreates_the_task() {
    let (gw, store, _drag) = board(vec![seeded("7", "Pay electricity bill", Status::Todo, Priority::High, 0)]).await;
    let id = TaskId::from("7");

    store.delete_task(&id).unwrap().await.unwrap();
    assert!(store.tasks().is_empty());
    assert!(gw.task(&id).is_none());
    assert_eq!(store.last_deleted(), Some(id.clone()));

    let restored = store.undo_delete(&id).unwrap().await.unwrap();
    assert_ne!(restored.id, id);
    assert_eq!(restored.priority, Priority::High);
    let tasks = store.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, restored.id);
    assert_eq!(gw.task_ids(), vec![restored.id.clone()]);
    assert_eq!(
        store.take_notices(),
        vec![
            Notice::info("Task deleted: Pay electricity bill"),
            Notice::info("Task restored"),
        ]
    );
}

#[tokio::test]
async fn test_dependency_shows_on_both_tasks() {
    let (_gw, store, _drag) = board(vec![
        seeded("1", "Buy paint", Status::Todo, Priority::None, 0),
        seeded("2", "Paint fence", Status::Todo, Priority::None, 1),
    ])
    .await;
    let paint = TaskId::from("1");
    let fence = TaskId::from("2");

    store.add_dependency(&fence, &paint, Direction::BlockedBy).await.unwrap();
    assert_eq!(store.task(&fence).unwrap().blocked_by, vec![paint.clone()]);
    assert_eq!(store.task(&paint).unwrap().blocking, vec![fence.clone()]);

    let err = store
        .add_dependency(&paint, &fence, Direction::BlockedBy)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Circular dependency detected"), "{err}");

    store.remove_dependency(&fence, &paint, Direction::BlockedBy).await.unwrap();
    assert!(store.task(&fence).unwrap().blocked_by.is_empty());
    assert!(store.task(&paint).unwrap().blocking.is_empty());
}
