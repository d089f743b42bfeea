//! Filter and derivation pipeline.
//!
//! Pure functions from the task collection and the filter state to what the board
//! shows: the visible subset, the per-status columns and the assignee/tag facets.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::fields::{Priority, Status, TaskType};
use crate::task::{Task, TaskId, User};

/// Active board filters. OR within a field, AND across fields; an empty field
/// places no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    pub search_text: String,
    pub priorities: Vec<Priority>,
    /// User ids.
    pub assignees: Vec<String>,
    pub task_types: Vec<TaskType>,
    pub tags: Vec<String>,
}

fn toggle<T: PartialEq>(list: &mut Vec<T>, value: T) {
    match list.iter().position(|v| *v == value) {
        Some(pos) => {
            list.remove(pos);
        }
        None => list.push(value),
    }
}

impl FilterState {
    pub fn is_empty(&self) -> bool {
        *self == FilterState::default()
    }

    pub fn set_search_text(&mut self, text: impl Into<String>) {
        self.search_text = text.into();
    }

    pub fn toggle_priority(&mut self, priority: Priority) {
        toggle(&mut self.priorities, priority);
    }

    pub fn toggle_assignee(&mut self, user_id: impl Into<String>) {
        toggle(&mut self.assignees, user_id.into());
    }

    pub fn toggle_task_type(&mut self, task_type: TaskType) {
        toggle(&mut self.task_types, task_type);
    }

    pub fn toggle_tag(&mut self, tag: impl Into<String>) {
        toggle(&mut self.tags, tag.into());
    }

    pub fn reset(&mut self) {
        *self = FilterState::default();
    }
}

/// Whether `task` passes every active criterion of `filters`.
pub fn matches(task: &Task, filters: &FilterState) -> bool {
    if !filters.search_text.is_empty() {
        let needle = filters.search_text.to_lowercase();
        if !task.title.to_lowercase().contains(&needle) && !task.id.as_str().to_lowercase().contains(&needle) {
            return false;
        }
    }
    if !filters.priorities.is_empty() && !filters.priorities.contains(&task.priority) {
        return false;
    }
    if !filters.assignees.is_empty()
        && !task
            .assignee
            .as_ref()
            .is_some_and(|u| filters.assignees.contains(&u.id))
    {
        return false;
    }
    if !filters.task_types.is_empty() && !task.task_type.is_some_and(|t| filters.task_types.contains(&t)) {
        return false;
    }
    if !filters.tags.is_empty() && !task.tags().iter().any(|t| filters.tags.contains(t)) {
        return false;
    }
    true
}

pub fn visible_tasks<'a>(tasks: &'a [Task], filters: &FilterState) -> Vec<&'a Task> {
    tasks.iter().filter(|t| matches(t, filters)).collect()
}

/// Default column order: priority weight descending, then newest first.
pub fn default_order(a: &Task, b: &Task) -> Ordering {
    b.priority
        .weight()
        .cmp(&a.priority.weight())
        .then_with(|| b.created_at.cmp(&a.created_at))
}

/// Manual intra-column order written by drag gestures.
///
/// Lives only on this client and never reaches the server. A full refetch clears
/// it, so a reload falls back to the default order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewOrder {
    ranks: HashMap<Status, Vec<TaskId>>,
}

impl ViewOrder {
    pub fn is_empty(&self) -> bool {
        self.ranks.values().all(Vec::is_empty)
    }

    /// Ranked ids of `status`, in rank order.
    pub fn column(&self, status: Status) -> &[TaskId] {
        self.ranks.get(&status).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_column(&mut self, status: Status, ids: Vec<TaskId>) {
        self.ranks.insert(status, ids);
    }

    /// Drop `id` from every column's ranking.
    pub fn forget(&mut self, id: &TaskId) {
        for ids in self.ranks.values_mut() {
            ids.retain(|r| r != id);
        }
    }

    pub fn clear(&mut self) {
        self.ranks.clear();
    }
}

/// Tasks of `status` among `tasks`, ranked ids first then the rest in default order.
pub fn order_column<'a>(tasks: impl IntoIterator<Item = &'a Task>, status: Status, order: &ViewOrder) -> Vec<&'a Task> {
    let mut members: Vec<&Task> = tasks.into_iter().filter(|t| t.status == status).collect();
    members.sort_by(|a, b| default_order(a, b));

    let ranked = order.column(status);
    if ranked.is_empty() {
        return members;
    }
    let mut out: Vec<&Task> = Vec::with_capacity(members.len());
    let mut placed: HashSet<&TaskId> = HashSet::new();
    for id in ranked {
        if let Some(&task) = members.iter().find(|t| &t.id == id) {
            if placed.insert(&task.id) {
                out.push(task);
            }
        }
    }
    out.extend(members.iter().copied().filter(|t| !placed.contains(&t.id)));
    out
}

/// Ids of the full, unfiltered column in display order.
pub fn column_ids(tasks: &[Task], status: Status, order: &ViewOrder) -> Vec<TaskId> {
    order_column(tasks, status, order)
        .into_iter()
        .map(|t| t.id.clone())
        .collect()
}

/// A derived grouping of tasks by status.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub status: Status,
    pub title: &'static str,
    pub tasks: Vec<Task>,
}

impl Column {
    pub fn id(&self) -> &'static str {
        self.status.as_str()
    }
}

/// One column per status, in board order, over the visible tasks.
pub fn columns(tasks: &[Task], filters: &FilterState, order: &ViewOrder) -> Vec<Column> {
    let visible = visible_tasks(tasks, filters);
    Status::ALL
        .iter()
        .map(|&status| Column {
            status,
            title: status.title(),
            tasks: order_column(visible.iter().copied(), status, order)
                .into_iter()
                .cloned()
                .collect(),
        })
        .collect()
}

/// Distinct assignees by id, in first-seen order, over the unfiltered set.
pub fn unique_assignees(tasks: &[Task]) -> Vec<User> {
    let mut seen = HashSet::new();
    tasks
        .iter()
        .filter_map(|t| t.assignee.as_ref())
        .filter(|u| seen.insert(u.id.clone()))
        .cloned()
        .collect()
}

/// Distinct tags, sorted, over the unfiltered set.
pub fn unique_tags(tasks: &[Task]) -> Vec<String> {
    tasks
        .iter()
        .flat_map(|t| t.tags().iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Everything the board composition layer reads.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardView {
    pub columns: Vec<Column>,
    pub unique_assignees: Vec<User>,
    pub unique_tags: Vec<String>,
    pub filters: FilterState,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl BoardView {
    pub fn build(tasks: &[Task], filters: &FilterState, order: &ViewOrder) -> Self {
        BoardView {
            columns: columns(tasks, filters, order),
            unique_assignees: unique_assignees(tasks),
            unique_tags: unique_tags(tasks),
            filters: filters.clone(),
            is_loading: false,
            error: None,
        }
    }

    pub fn column(&self, status: Status) -> &Column {
        &self.columns[status.index()]
    }

    pub fn visible_count(&self) -> usize {
        self.columns.iter().map(|c| c.tasks.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    fn task(id: &str, status: Status, priority: Priority, age_secs: i64) -> Task {
        let mut t = Task::new(id, format!("Task {id}"), status);
        t.priority = priority;
        t.created_at = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap() - Duration::seconds(age_secs);
        t
    }

    fn user(id: &str) -> User {
        User {
            id: id.into(),
            name: format!("User {id}"),
            avatar: None,
        }
    }

    #[test]
    fn test_search_matches_title_or_id_case_insensitively() {
        let tasks = vec![task("T-12", Status::Todo, Priority::None, 0), task("7", Status::Todo, Priority::None, 0)];
        let mut filters = FilterState::default();
        filters.set_search_text("t-1");
        let ids: Vec<&str> = visible_tasks(&tasks, &filters).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["T-12"]);

        filters.set_search_text("TASK 7");
        assert_eq!(visible_tasks(&tasks, &filters).len(), 1);
    }

    #[test]
    fn test_or_within_and_across_fields() {
        let mut a = task("1", Status::Todo, Priority::High, 0);
        a.tags = Some(vec!["home".into()]);
        a.assignee = Some(user("u1"));
        let mut b = task("2", Status::Todo, Priority::Low, 0);
        b.tags = Some(vec!["work".into()]);
        let c = task("3", Status::Todo, Priority::High, 0);
        let tasks = vec![a, b, c];

        let mut filters = FilterState::default();
        filters.toggle_priority(Priority::High);
        filters.toggle_priority(Priority::Low);
        assert_eq!(visible_tasks(&tasks, &filters).len(), 3);

        filters.toggle_tag("home");
        filters.toggle_tag("work");
        assert_eq!(visible_tasks(&tasks, &filters).len(), 2);

        filters.toggle_assignee("u1");
        let ids: Vec<&str> = visible_tasks(&tasks, &filters).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["1"]);

        filters.toggle_assignee("u1");
        assert!(filters.assignees.is_empty());
        filters.reset();
        assert!(filters.is_empty());
    }

    #[test]
    fn test_untyped_task_fails_type_filter() {
        let tasks = vec![task("1", Status::Todo, Priority::None, 0)];
        let mut filters = FilterState::default();
        filters.toggle_task_type(TaskType::Other);
        assert!(visible_tasks(&tasks, &filters).is_empty());
    }

    #[test]
    fn test_ranks_override_default_order() {
        let tasks = vec![
            task("a", Status::Todo, Priority::Urgent, 0),
            task("b", Status::Todo, Priority::Low, 0),
            task("c", Status::Todo, Priority::Med, 0),
        ];
        let mut order = ViewOrder::default();
        assert_eq!(
            column_ids(&tasks, Status::Todo, &order),
            vec![TaskId::from("a"), TaskId::from("c"), TaskId::from("b")]
        );

        order.set_column(Status::Todo, vec!["b".into(), "a".into()]);
        let ids = column_ids(&tasks, Status::Todo, &order);
        assert_eq!(ids, vec![TaskId::from("b"), TaskId::from("a"), TaskId::from("c")]);

        order.forget(&"b".into());
        assert_eq!(column_ids(&tasks, Status::Todo, &order)[0], TaskId::from("a"));
        order.clear();
        assert!(order.is_empty());
    }

    #[test]
    fn test_facets_cover_unfiltered_set() {
        let mut a = task("1", Status::Todo, Priority::None, 0);
        a.assignee = Some(user("u2"));
        a.tags = Some(vec!["z".into(), "a".into()]);
        let mut b = task("2", Status::Done, Priority::None, 0);
        b.assignee = Some(user("u1"));
        b.tags = Some(vec!["a".into()]);
        let mut c = task("3", Status::Done, Priority::None, 0);
        c.assignee = Some(user("u2"));
        let tasks = vec![a, b, c];

        let ids: Vec<String> = unique_assignees(&tasks).into_iter().map(|u| u.id).collect();
        assert_eq!(ids, vec!["u2", "u1"]);
        assert_eq!(unique_tags(&tasks), vec!["a", "z"]);
    }

    fn arb_task() -> impl Strategy<Value = Task> {
        (
            0u32..40,
            prop::sample::select(Status::ALL.to_vec()),
            prop::sample::select(Priority::ALL.to_vec()),
            0i64..10_000,
            prop::option::of(prop::sample::select(vec!["u1", "u2", "u3"])),
            prop::option::of(prop::sample::select(vec![TaskType::Chore, TaskType::Errand, TaskType::Other])),
            prop::sample::subsequence(vec!["home", "work", "kids", "yard"], 0..3),
            prop::sample::select(vec!["Buy milk", "Wash dishes", "Call plumber", "Rake leaves"]),
        )
            .prop_map(|(n, status, priority, age, assignee, task_type, tags, title)| {
                let mut t = task(&n.to_string(), status, priority, age);
                t.title = title.to_string();
                t.assignee = assignee.map(user);
                t.task_type = task_type;
                if !tags.is_empty() {
                    t.tags = Some(tags.into_iter().map(str::to_string).collect());
                }
                t
            })
    }

    fn arb_tasks() -> impl Strategy<Value = Vec<Task>> {
        prop::collection::vec(arb_task(), 0..30).prop_map(|mut tasks| {
            let mut seen = HashSet::new();
            tasks.retain(|t| seen.insert(t.id.clone()));
            tasks
        })
    }

    fn arb_filters() -> impl Strategy<Value = FilterState> {
        (
            prop::sample::select(vec!["", "milk", "WASH", "1", "zz"]),
            prop::sample::subsequence(Priority::ALL.to_vec(), 0..3),
            prop::sample::subsequence(vec!["u1", "u2", "u3"], 0..2),
            prop::sample::subsequence(vec![TaskType::Chore, TaskType::Errand, TaskType::Other], 0..2),
            prop::sample::subsequence(vec!["home", "work", "kids", "yard"], 0..2),
        )
            .prop_map(|(search, priorities, assignees, task_types, tags)| FilterState {
                search_text: search.to_string(),
                priorities,
                assignees: assignees.into_iter().map(str::to_string).collect(),
                task_types,
                tags: tags.into_iter().map(str::to_string).collect(),
            })
    }

    fn ids(tasks: &[&Task]) -> HashSet<TaskId> {
        tasks.iter().map(|t| t.id.clone()).collect()
    }

    proptest! {
        #[test]
        fn prop_empty_filters_show_everything(tasks in arb_tasks()) {
            let visible = visible_tasks(&tasks, &FilterState::default());
            prop_assert_eq!(visible.len(), tasks.len());
        }

        #[test]
        fn prop_adding_a_criterion_never_grows_result(
            tasks in arb_tasks(),
            filters in arb_filters(),
            extra_priority in prop::sample::select(Priority::ALL.to_vec()),
            extra_tag in prop::sample::select(vec!["home", "work"]),
            suffix in "[a-z]{1,2}",
        ) {
            let base = ids(&visible_tasks(&tasks, &filters));
            prop_assert!(base.len() <= tasks.len());

            let mut narrowed = Vec::new();
            if filters.priorities.is_empty() {
                let mut f = filters.clone();
                f.toggle_priority(extra_priority);
                narrowed.push(f);
            }
            if filters.tags.is_empty() {
                let mut f = filters.clone();
                f.toggle_tag(extra_tag);
                narrowed.push(f);
            }
            let mut longer = filters.clone();
            longer.search_text.push_str(&suffix);
            narrowed.push(longer);

            for f in narrowed {
                let subset = ids(&visible_tasks(&tasks, &f));
                prop_assert!(subset.is_subset(&base));
            }
        }

        #[test]
        fn prop_columns_partition_visible_tasks(tasks in arb_tasks(), filters in arb_filters()) {
            let cols = columns(&tasks, &filters, &ViewOrder::default());
            let flattened: Vec<TaskId> = cols.iter().flat_map(|c| c.tasks.iter().map(|t| t.id.clone())).collect();
            let unique: HashSet<TaskId> = flattened.iter().cloned().collect();
            prop_assert_eq!(unique.len(), flattened.len());
            prop_assert_eq!(unique, ids(&visible_tasks(&tasks, &filters)));
            for col in &cols {
                prop_assert!(col.tasks.iter().all(|t| t.status == col.status));
            }
        }

        #[test]
        fn prop_columns_sorted_by_weight_then_recency(tasks in arb_tasks(), filters in arb_filters()) {
            for col in columns(&tasks, &filters, &ViewOrder::default()) {
                for pair in col.tasks.windows(2) {
                    let (a, b) = (&pair[0], &pair[1]);
                    let (wa, wb) = (a.priority.weight(), b.priority.weight());
                    prop_assert!(wa > wb || (wa == wb && a.created_at >= b.created_at));
                }
            }
        }
    }
}
