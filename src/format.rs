use chrono::{NaiveDate, NaiveTime};

use crate::models::{Priority, Timestamp};

/// `Sat, Oct 17`, with ` at 3:05 PM` appended when a time is set.
pub fn format_due(date: NaiveDate, time: Option<NaiveTime>) -> String {
    let mut out = date.format("%a, %b %-d").to_string();
    if let Some(time) = time {
        out.push_str(" at ");
        out.push_str(&time.format("%-I:%M %p").to_string());
    }
    out
}

/// Coarse age of `then` relative to `now`. Stamps in the future read as `just now`.
pub fn format_relative(then: Timestamp, now: Timestamp) -> String {
    let seconds = (now - then).num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }
    if seconds < 3_600 {
        return format!("{}m ago", seconds / 60);
    }
    if seconds < 86_400 {
        return format!("{}h ago", seconds / 3_600);
    }
    match seconds / 86_400 {
        1 => "yesterday".to_string(),
        days if days < 7 => format!("{days}d ago"),
        _ => then.format("%b %-d").to_string(),
    }
}

pub fn task_count_label(count: usize) -> String {
    if count == 1 {
        "1 task".to_string()
    } else {
        format!("{count} tasks")
    }
}

pub fn priority_label(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "🔴 High",
        Priority::Medium => "🟡 Medium",
        Priority::Low => "🟢 Low",
    }
}
