use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::models::Task;
use crate::query::is_overdue;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub overdue: usize,
    /// Whole percent, 0 for an empty collection.
    pub completion_rate: u32,
    pub days_active: i64,
}

impl Statistics {
    /// Aggregates over the whole, unfiltered collection.
    pub fn compute(tasks: &[Task], now: DateTime<Utc>, local_now: NaiveDateTime) -> Self {
        let total = tasks.len();
        let completed = tasks.iter().filter(|task| task.completed).count();
        let overdue = tasks
            .iter()
            .filter(|task| is_overdue(task, local_now))
            .count();
        Self {
            total,
            completed,
            pending: total - completed,
            overdue,
            completion_rate: completion_rate(completed, total),
            days_active: days_active(tasks, now),
        }
    }
}

fn completion_rate(completed: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (completed as f64 / total as f64 * 100.0).round() as u32
}

/// Whole days, rounded up, since the earliest creation stamp.
fn days_active(tasks: &[Task], now: DateTime<Utc>) -> i64 {
    let Some(first) = tasks.iter().map(|task| task.created_at).min() else {
        return 0;
    };
    let elapsed = (now - first).num_milliseconds();
    if elapsed <= 0 {
        return 0;
    }
    (elapsed + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY
}
