//! Enumerations and field types for board tasks.
//!
//! This module defines the structured values used to place and categorise tasks:
//! column status, priority (with its sort weight), task type and the direction of a
//! dependency edge relative to the task being edited.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Column membership of a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    #[default]
    Todo,
    InProgress,
    Done,
}

impl Status {
    /// Board columns in display order.
    pub const ALL: [Status; 3] = [Status::Todo, Status::InProgress, Status::Done];

    /// Wire and column identifier ("todo", "in-progress", "done").
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Todo => "todo",
            Status::InProgress => "in-progress",
            Status::Done => "done",
        }
    }

    /// Column heading.
    pub fn title(self) -> &'static str {
        match self {
            Status::Todo => "To Do",
            Status::InProgress => "In Progress",
            Status::Done => "Done",
        }
    }

    /// Position of this status in [`Status::ALL`].
    pub fn index(self) -> usize {
        match self {
            Status::Todo => 0,
            Status::InProgress => 1,
            Status::Done => 2,
        }
    }

    /// Resolve a drop-target identifier to a column, if it names one.
    pub fn from_column_id(id: &str) -> Option<Status> {
        match id {
            "todo" => Some(Status::Todo),
            "in-progress" => Some(Status::InProgress),
            "done" => Some(Status::Done),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority. Only used for ordering inside a column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    Urgent,
    High,
    Med,
    Low,
    #[default]
    None,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::Urgent,
        Priority::High,
        Priority::Med,
        Priority::Low,
        Priority::None,
    ];

    /// Sort weight, urgent=4 down to none=0.
    pub fn weight(self) -> u8 {
        match self {
            Priority::Urgent => 4,
            Priority::High => 3,
            Priority::Med => 2,
            Priority::Low => 1,
            Priority::None => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Med => "med",
            Priority::Low => "low",
            Priority::None => "none",
        }
    }

    /// Next priority in the urgent→none cycle, wrapping around.
    pub fn cycle(self) -> Priority {
        match self {
            Priority::Urgent => Priority::None,
            Priority::High => Priority::Urgent,
            Priority::Med => Priority::High,
            Priority::Low => Priority::Med,
            Priority::None => Priority::Low,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of chore a task represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    Chore,
    Errand,
    Homework,
    Appointment,
    #[default]
    Other,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Chore => "chore",
            TaskType::Errand => "errand",
            TaskType::Homework => "homework",
            TaskType::Appointment => "appointment",
            TaskType::Other => "other",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a dependency edge as seen from the task being edited.
///
/// `BlockedBy` means the edited task depends on the other one; `Blocking` means the
/// other task depends on the edited one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    BlockedBy,
    Blocking,
}

/// Server-side sort field for task listing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    DueDate,
    Priority,
    CreatedAt,
}

impl SortBy {
    pub fn as_str(self) -> &'static str {
        match self {
            SortBy::DueDate => "due_date",
            SortBy::Priority => "priority",
            SortBy::CreatedAt => "created_at",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::from_column_id(&s.trim().to_lowercase())
            .ok_or_else(|| format!("unknown status '{s}'"))
    }
}
