use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::models::Task;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Pending,
    Completed,
    Overdue,
}

impl StatusFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::Pending => "pending",
            StatusFilter::Completed => "completed",
            StatusFilter::Overdue => "overdue",
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(StatusFilter::All),
            "pending" => Ok(StatusFilter::Pending),
            "completed" => Ok(StatusFilter::Completed),
            "overdue" => Ok(StatusFilter::Overdue),
            other => Err(format!("unknown filter `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SortMode {
    #[default]
    Newest,
    Oldest,
    DueDate,
    Priority,
    Alphabetical,
}

impl SortMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SortMode::Newest => "newest",
            SortMode::Oldest => "oldest",
            SortMode::DueDate => "dueDate",
            SortMode::Priority => "priority",
            SortMode::Alphabetical => "alphabetical",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "newest" => Ok(SortMode::Newest),
            "oldest" => Ok(SortMode::Oldest),
            "duedate" | "due-date" | "due" => Ok(SortMode::DueDate),
            "priority" => Ok(SortMode::Priority),
            "alphabetical" | "name" => Ok(SortMode::Alphabetical),
            other => Err(format!("unknown sort `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ViewCriteria {
    #[serde(default)]
    pub search_text: String,
    #[serde(default)]
    pub status_filter: StatusFilter,
    #[serde(default)]
    pub sort_mode: SortMode,
}

/// Deadline used when a due date has no time of day.
pub fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN)
}

/// The moment after which an unfinished task counts as overdue.
pub fn deadline(task: &Task) -> Option<NaiveDateTime> {
    let date = task.due_date?;
    Some(date.and_time(task.due_time.unwrap_or_else(end_of_day)))
}

/// True when `task` is unfinished and `now` (local wall time) is strictly past its
/// deadline. Completed and undated tasks are never overdue.
pub fn is_overdue(task: &Task, now: NaiveDateTime) -> bool {
    if task.completed {
        return false;
    }
    match deadline(task) {
        Some(deadline) => now > deadline,
        None => false,
    }
}

/// Derives the visible list: search, then status filter, then a stable sort. The input
/// slice is never reordered.
pub fn view<'a>(tasks: &'a [Task], criteria: &ViewCriteria, now: NaiveDateTime) -> Vec<&'a Task> {
    let needle = criteria.search_text.trim().to_lowercase();
    let mut out: Vec<&Task> = tasks
        .iter()
        .filter(|task| needle.is_empty() || matches_search(task, &needle))
        .filter(|task| matches_status(task, criteria.status_filter, now))
        .collect();
    sort_tasks(&mut out, criteria.sort_mode);
    out
}

fn matches_search(task: &Task, needle: &str) -> bool {
    task.name.to_lowercase().contains(needle) || task.category.as_str().contains(needle)
}

fn matches_status(task: &Task, filter: StatusFilter, now: NaiveDateTime) -> bool {
    match filter {
        StatusFilter::All => true,
        StatusFilter::Pending => !task.completed,
        StatusFilter::Completed => task.completed,
        StatusFilter::Overdue => is_overdue(task, now),
    }
}

pub fn sort_tasks(tasks: &mut [&Task], mode: SortMode) {
    match mode {
        SortMode::Newest => tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortMode::Oldest => tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        SortMode::DueDate => tasks.sort_by(|a, b| compare_due(a, b)),
        SortMode::Priority => tasks.sort_by(|a, b| b.priority.rank().cmp(&a.priority.rank())),
        SortMode::Alphabetical => tasks.sort_by_cached_key(|task| collation_key(&task.name)),
    }
}

/// Dated tasks first, earliest first; a missing time sorts as the start of the day.
fn compare_due(a: &Task, b: &Task) -> Ordering {
    let key = |task: &Task| {
        task.due_date
            .map(|date| date.and_time(task.due_time.unwrap_or(NaiveTime::MIN)))
    };
    match (key(a), key(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// Case-insensitive ordering on the ASCII transliteration, so accented and non-Latin
// letters sort next to their base letter. The original name breaks ties.
fn collation_key(name: &str) -> (String, String) {
    (deunicode::deunicode(name).to_lowercase(), name.to_string())
}
