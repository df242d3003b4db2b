pub mod autosave;
pub mod clock;
pub mod commands;
pub mod events;
pub mod format;
pub mod models;
pub mod query;
pub mod state;
pub mod stats;
pub mod storage;
pub mod store;
pub mod transfer;

#[cfg(feature = "cli")]
mod cli;
#[cfg(feature = "cli")]
pub mod config;
#[cfg(feature = "cli")]
pub mod logging;

#[cfg(feature = "cli")]
pub use crate::cli::run;
pub use crate::models::{Category, Priority, Profile, Task, TaskDraft, TaskPatch};
pub use crate::query::{SortMode, StatusFilter, ViewCriteria};
pub use crate::state::AppState;
pub use crate::store::{TaskError, TaskStore};
