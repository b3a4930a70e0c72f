// Data models for TodoFlow

use chrono::NaiveDate;
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// A single entry in the task list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub completed: bool,
    /// Calendar due date; older data writes `""` for "no due date"
    #[serde(default, with = "due_date", skip_serializing_if = "Option::is_none")]
    pub due: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sort: i64,
}

impl Task {
    /// Create a task with a fresh id and default status
    pub fn new(title: &str, due: Option<NaiveDate>, priority: Priority, sort: i64) -> Self {
        Self {
            id: new_id(),
            title: title.trim().to_string(),
            completed: false,
            due,
            priority,
            sort,
        }
    }

    /// Merge the set fields of `patch` into this task
    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title = title.trim().to_string();
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if let Some(due) = patch.due {
            self.due = due;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(sort) = patch.sort {
            self.sort = sort;
        }
    }

    /// Trailing fragment of the id, enough to tell tasks apart on screen
    pub fn short_id(&self) -> &str {
        let start = self.id.len().saturating_sub(SHORT_ID_LEN);
        self.id.get(start..).unwrap_or(&self.id)
    }
}

/// Number of trailing id characters shown by `Task::short_id`
pub const SHORT_ID_LEN: usize = 8;

/// Task priority; stored as the `p1`/`p2`/`p3` tokens older data uses
///
/// Reading is lenient: any value other than a known token is Medium, so one
/// odd record never invalidates the whole stored list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Priority {
    #[serde(rename = "p1")]
    High,
    #[default]
    #[serde(rename = "p2")]
    Medium,
    #[serde(rename = "p3")]
    Low,
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        let priority = match raw.as_str().map(|s| s.parse::<Priority>()) {
            Some(Ok(p)) => p,
            _ => {
                debug!(value = %raw, "Unknown priority, reading as medium");
                Priority::Medium
            }
        };
        Ok(priority)
    }
}

impl Priority {
    /// Human-facing label
    pub fn label(self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

impl FromStr for Priority {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "high" | "p1" => Ok(Priority::High),
            "medium" | "p2" => Ok(Priority::Medium),
            "low" | "p3" => Ok(Priority::Low),
            other => Err(eyre!("Invalid priority: {} (expected high, medium or low)", other)),
        }
    }
}

/// Partial update for a task; `None` leaves the field untouched
///
/// `due` is doubly optional so a patch can clear the date (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub completed: Option<bool>,
    pub due: Option<Option<NaiveDate>>,
    pub priority: Option<Priority>,
    pub sort: Option<i64>,
}

impl TaskPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn due(mut self, due: Option<NaiveDate>) -> Self {
        self.due = Some(due);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn sort(mut self, sort: i64) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Color theme preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(eyre!("Invalid theme: {} (expected light or dark)", other)),
        }
    }
}

/// The three example tasks shown when there is nothing usable in storage
pub fn demo_tasks(today: NaiveDate) -> Vec<Task> {
    let proposal = Task::new("Finish the project proposal", Some(today), Priority::High, 0);
    let groceries = Task::new("Buy groceries (milk, eggs, veggies)", None, Priority::Medium, 1);

    let mut reading = Task::new("Read 10 pages of a book", None, Priority::Low, 2);
    reading.completed = true;

    vec![proposal, groceries, reading]
}

/// Generate a fresh task id
pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Helper function to get current timestamp in milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|e| eyre!("Invalid date '{}': {}", s.trim(), e))
}

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// `null` reads as the field's default, like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

mod due_date {
    use super::DATE_FORMAT;
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(due: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error> {
        match due {
            Some(date) => serializer.serialize_str(&date.format(DATE_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => NaiveDate::parse_from_str(s, DATE_FORMAT)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
