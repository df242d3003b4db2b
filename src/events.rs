use serde::Serialize;

use crate::models::{Profile, Task};
use crate::query::ViewCriteria;
use crate::stats::Statistics;

pub const EVENT_STATE_UPDATED: &str = "state_updated";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Error,
    Info,
}

/// A short user-facing message, shown by whatever toast mechanism the front end has.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the log only. Backs `Persistence::unattended`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => log::error!("notice: {}", notice.message),
            NoticeLevel::Success | NoticeLevel::Info => log::info!("notice: {}", notice.message),
        }
    }
}

/// Everything a front end needs to redraw after a change.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePayload {
    pub tasks: Vec<Task>,
    pub stats: Statistics,
    pub criteria: ViewCriteria,
    pub task_count: String,
    pub profile: Profile,
}
