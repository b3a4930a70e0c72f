// Visible-list projection: ordering, search and filter modes

use crate::models::{Priority, Task};
use chrono::NaiveDate;
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};

/// Single active filter applied on top of the search text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    All,
    Active,
    Completed,
    Today,
    Overdue,
    High,
}

impl FilterMode {
    pub const ALL: [FilterMode; 6] = [
        FilterMode::All,
        FilterMode::Active,
        FilterMode::Completed,
        FilterMode::Today,
        FilterMode::Overdue,
        FilterMode::High,
    ];

    /// Whether `task` passes this filter on the given day
    pub fn matches(self, task: &Task, today: NaiveDate) -> bool {
        match self {
            FilterMode::All => true,
            FilterMode::Active => !task.completed,
            FilterMode::Completed => task.completed,
            FilterMode::Today => task.due == Some(today),
            FilterMode::Overdue => !task.completed && task.due.is_some_and(|due| due < today),
            FilterMode::High => task.priority == Priority::High,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FilterMode::All => "all",
            FilterMode::Active => "active",
            FilterMode::Completed => "completed",
            FilterMode::Today => "today",
            FilterMode::Overdue => "overdue",
            FilterMode::High => "high",
        }
    }
}

impl std::fmt::Display for FilterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FilterMode {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == wanted)
            .ok_or_else(|| eyre!("Invalid filter: {} (expected one of all, active, completed, today, overdue, high)", s))
    }
}

/// Filter mode plus free-text search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub filter: FilterMode,
    pub search: String,
}

impl Query {
    pub fn new(filter: FilterMode) -> Self {
        Self {
            filter,
            search: String::new(),
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    /// Lowercased, trimmed needle; empty means "match everything"
    fn needle(&self) -> String {
        self.search.trim().to_lowercase()
    }
}

/// Tasks to display for `query`, ordered ascending by `sort`
///
/// The sort is stable, so tasks with equal `sort` keep their stored order.
pub fn visible<'a>(tasks: &'a [Task], query: &Query, today: NaiveDate) -> Vec<&'a Task> {
    let needle = query.needle();

    let mut ordered: Vec<&Task> = tasks.iter().collect();
    ordered.sort_by_key(|task| task.sort);

    ordered
        .into_iter()
        .filter(|task| needle.is_empty() || task.title.to_lowercase().contains(&needle))
        .filter(|task| query.filter.matches(task, today))
        .collect()
}

/// Number of incomplete tasks, ignoring any filter or search
pub fn active_count(tasks: &[Task]) -> usize {
    tasks.iter().filter(|task| !task.completed).count()
}

/// Running-total label, e.g. `"1 item left"` or `"3 items left"`
pub fn items_left_label(count: usize) -> String {
    format!("{} item{} left", count, if count == 1 { "" } else { "s" })
}

/// Today's date on the local calendar
///
/// The browser version used the UTC date, so around midnight the `today`
/// and `overdue` boundaries can differ from it by one day.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
