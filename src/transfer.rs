use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use crate::models::{iso, Category, Task, Timestamp};
use crate::store::TaskStore;

pub const EXPORT_FILE_PREFIX: &str = "todo-tasks";

#[derive(Debug)]
pub enum ImportError {
    /// The payload is not JSON, or its top level is not an array.
    Format(String),
    /// The array held no entry with both a name and an id.
    Empty,
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportError::Format(reason) => write!(f, "invalid import format: {reason}"),
            ImportError::Empty => write!(f, "no valid tasks found in file"),
        }
    }
}

impl std::error::Error for ImportError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportFile {
    pub filename: String,
    pub contents: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub added: usize,
    pub skipped: usize,
    pub rejected: usize,
}

/// Valid entries of an import payload plus the count of entries that were dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportBatch {
    pub tasks: Vec<Task>,
    pub rejected: usize,
}

pub fn export_filename(date: NaiveDate) -> String {
    format!("{EXPORT_FILE_PREFIX}-{}.json", date.format(iso::DATE_FORMAT))
}

/// Pretty-printed JSON array of the whole collection.
pub fn export_all(tasks: &[Task], date: NaiveDate) -> Result<ExportFile, serde_json::Error> {
    Ok(ExportFile {
        filename: export_filename(date),
        contents: serde_json::to_string_pretty(tasks)?,
    })
}

/// Parses an import payload. Entries that are not objects with a non-empty `name` and
/// `id` are counted as rejected; remaining fields are read leniently, a value of the
/// wrong type counting as absent. `imported_at` stands in for a missing or unreadable
/// creation stamp.
pub fn parse_import(contents: &str, imported_at: Timestamp) -> Result<ImportBatch, ImportError> {
    let value: Value =
        serde_json::from_str(contents).map_err(|err| ImportError::Format(err.to_string()))?;
    let Value::Array(entries) = value else {
        return Err(ImportError::Format("expected a JSON array of tasks".to_string()));
    };

    let total = entries.len();
    let tasks: Vec<Task> = entries
        .into_iter()
        .filter_map(|entry| task_from_entry(entry, imported_at))
        .collect();
    if tasks.is_empty() {
        return Err(ImportError::Empty);
    }
    Ok(ImportBatch {
        rejected: total - tasks.len(),
        tasks,
    })
}

/// Parses `contents` and merges the valid entries into `store`. Nothing is merged when
/// the payload as a whole is unusable.
pub fn import_into(store: &mut TaskStore, contents: &str) -> Result<ImportReport, ImportError> {
    let imported_at = store.clock().now();
    let batch = parse_import(contents, imported_at)?;
    let rejected = batch.rejected;
    let outcome = store.replace_all(batch.tasks);
    log::info!(
        "transfer: import added={} skipped={} rejected={rejected}",
        outcome.added,
        outcome.skipped
    );
    Ok(ImportReport {
        added: outcome.added,
        skipped: outcome.skipped,
        rejected,
    })
}

fn task_from_entry(entry: Value, imported_at: Timestamp) -> Option<Task> {
    let Value::Object(fields) = entry else {
        return None;
    };
    let id = key_text(fields.get("id"))?;
    let name = key_text(fields.get("name"))?;

    let text = |key: &str| fields.get(key).and_then(Value::as_str);
    let stamp = |key: &str| fields.get(key).and_then(timestamp_value);

    let due_date = text("dueDate").and_then(|raw| iso::parse_date(raw).ok());
    let due_time = due_date.and(text("dueTime").and_then(|raw| iso::parse_time(raw).ok()));
    let completed = fields
        .get("completed")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let completed_at = completed.then(|| stamp("completedAt").unwrap_or(imported_at));

    Some(Task {
        id,
        name,
        priority: text("priority")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default(),
        category: text("category")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(Category::Other),
        due_date,
        due_time,
        completed,
        created_at: stamp("createdAt").unwrap_or(imported_at),
        completed_at,
    })
}

/// `id` and `name` may be strings or numbers; anything else, or blank text, rejects
/// the entry.
fn key_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// RFC 3339 text or epoch milliseconds. Other shapes read as absent.
fn timestamp_value(value: &Value) -> Option<Timestamp> {
    match value {
        Value::String(raw) => iso::parse_timestamp(raw).ok(),
        Value::Number(number) => number
            .as_i64()
            .and_then(chrono::DateTime::from_timestamp_millis),
        _ => None,
    }
}
