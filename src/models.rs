//! Task data models (shared between the HTTP surface, the store and the engine)
//!
//! Field names are camelCase on the wire to match browser clients.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};

use crate::error::TaskError;

/// Identifier assigned by the store; never reused within a collection
pub type TaskId = u64;

/// Priority level for tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    #[serde(alias = "low")]
    Low,
    #[default]
    #[serde(alias = "medium")]
    Medium,
    #[serde(alias = "high")]
    High,
}

impl Priority {
    /// Numeric weight used for display ordering (higher sorts first)
    pub fn weight(self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
        }
    }
}

impl FromStr for Priority {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Priority::Low),
            "MEDIUM" => Ok(Priority::Medium),
            "HIGH" => Ok(Priority::High),
            other => Err(TaskError::validation(format!("unknown priority '{other}'"))),
        }
    }
}

/// A 24-hour `HH:MM` time of day.
///
/// Construction validates the format, so a `DueTime` always compares
/// correctly as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DueTime(String);

impl DueTime {
    pub fn parse(value: &str) -> Result<Self, TaskError> {
        let invalid = || TaskError::validation(format!("due time '{value}' is not HH:MM"));

        let (hours, minutes) = value.split_once(':').ok_or_else(invalid)?;
        if hours.len() != 2 || minutes.len() != 2 {
            return Err(invalid());
        }
        let hours: u8 = hours.parse().map_err(|_| invalid())?;
        let minutes: u8 = minutes.parse().map_err(|_| invalid())?;
        if hours > 23 || minutes > 59 {
            return Err(invalid());
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DueTime {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DueTime {
    type Error = TaskError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DueTime> for String {
    fn from(value: DueTime) -> Self {
        value.0
    }
}

impl fmt::Display for DueTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A task/todo item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    #[serde(alias = "text")]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_time: Option<DueTime>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate counts derived from a task collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatistics {
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub pending_tasks: u32,
    /// Whole percentage, rounded half up
    pub completion_rate: u32,
}

/// Which completion states a listing retains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl FromStr for StatusFilter {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(StatusFilter::All),
            "active" | "pending" | "not-started" => Ok(StatusFilter::Active),
            "completed" | "done" => Ok(StatusFilter::Completed),
            other => Err(TaskError::validation(format!("unknown status '{other}'"))),
        }
    }
}

impl TryFrom<String> for StatusFilter {
    type Error = TaskError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Request to create a task.
///
/// Empty strings in optional fields mean "not given", as form inputs send them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    #[serde(alias = "text")]
    pub title: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub due_time: Option<DueTime>,
    #[serde(default)]
    pub completed: Option<bool>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Partial edit of a task's content.
///
/// `None` leaves a field untouched. For clearable fields the inner
/// `Option` distinguishes "set" from "clear"; JSON `null` and `""` both clear.
/// Completion is not part of an edit.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, alias = "text")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "present")]
    pub category: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "present")]
    pub due_time: Option<Option<DueTime>>,
}

/// Body of `PUT /api/todos/{id}`: an edit plus an optional completion state
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTask {
    #[serde(flatten)]
    pub patch: TaskPatch,
    #[serde(default)]
    pub completed: Option<bool>,
}

impl From<TaskPatch> for UpdateTask {
    fn from(patch: TaskPatch) -> Self {
        Self {
            patch,
            completed: None,
        }
    }
}

/// `null`, a missing field and a blank string all become `None`
fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(value) if !value.trim().is_empty() => {
            value.parse().map(Some).map_err(de::Error::custom)
        }
        _ => Ok(None),
    }
}

/// Marks a field as present, keeping `null` and `""` as `Some(None)`
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    blank_as_none(deserializer).map(Some)
}

/// The persisted unit: one owner's tasks plus the id counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCollection {
    pub next_id: TaskId,
    pub tasks: Vec<Task>,
}

impl Default for TaskCollection {
    fn default() -> Self {
        Self {
            next_id: 1,
            tasks: Vec::new(),
        }
    }
}

impl TaskCollection {
    /// Hand out the next id; the counter only moves forward
    pub fn allocate_id(&mut self) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn position(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }
}
