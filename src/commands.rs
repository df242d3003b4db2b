use crate::events::{Notice, Notifier, StatePayload};
use crate::models::{Profile, Task, TaskDraft, TaskPatch};
use crate::query::{SortMode, StatusFilter};
use crate::state::AppState;
use crate::store::TaskError;
use crate::transfer::{ExportFile, ImportReport};

#[derive(Debug, serde::Serialize)]
pub struct CommandResult<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

/// What a front end provides to the command layer: a place for notices and a channel
/// for refreshed state.
pub trait CommandCtx: Notifier {
    fn emit_state_updated(&self, payload: StatePayload);
}

fn ok<T>(data: T) -> CommandResult<T> {
    CommandResult {
        ok: true,
        data: Some(data),
        error: None,
    }
}

fn err<T>(message: &str) -> CommandResult<T> {
    CommandResult {
        ok: false,
        data: None,
        error: Some(message.to_string()),
    }
}

fn publish(ctx: &impl CommandCtx, state: &AppState) -> StatePayload {
    let payload = state.payload();
    ctx.emit_state_updated(payload.clone());
    payload
}

fn task_error<T>(ctx: &impl CommandCtx, error: TaskError) -> CommandResult<T> {
    if let TaskError::Validation(_) = error {
        ctx.notify(Notice::error("Please enter a task name!"));
    }
    log::warn!("commands: rejected: {error}");
    err(&error.to_string())
}

/// Publishes the state loaded at startup and greets the user when the profile asks for it.
pub fn load_state(ctx: &impl CommandCtx, state: &AppState) -> CommandResult<StatePayload> {
    let payload = publish(ctx, state);
    if let Some(message) = payload.profile.welcome_message() {
        ctx.notify(Notice::info(message));
    }
    ok(payload)
}

pub fn create_task(ctx: &impl CommandCtx, state: &AppState, draft: TaskDraft) -> CommandResult<Task> {
    match state.with_store(|store| store.add(draft)) {
        Ok(task) => {
            ctx.notify(Notice::success("Task added successfully! 🎉"));
            publish(ctx, state);
            ok(task)
        }
        Err(error) => task_error(ctx, error),
    }
}

pub fn update_task(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_id: String,
    patch: TaskPatch,
) -> CommandResult<Task> {
    match state.with_store(|store| store.update(&task_id, patch)) {
        Ok(task) => {
            ctx.notify(Notice::success("Task updated successfully! ✅"));
            publish(ctx, state);
            ok(task)
        }
        Err(error) => task_error(ctx, error),
    }
}

pub fn toggle_task(ctx: &impl CommandCtx, state: &AppState, task_id: String) -> CommandResult<Task> {
    match state.with_store(|store| store.toggle_complete(&task_id)) {
        Ok(task) => {
            let message = if task.completed {
                "Task completed! 🎉"
            } else {
                "Task marked as pending ⏳"
            };
            ctx.notify(Notice::success(message));
            publish(ctx, state);
            ok(task)
        }
        Err(error) => task_error(ctx, error),
    }
}

/// Removes without asking; confirmation belongs to the front end.
pub fn delete_task(ctx: &impl CommandCtx, state: &AppState, task_id: String) -> CommandResult<Task> {
    match state.with_store(|store| store.remove(&task_id)) {
        Ok(task) => {
            ctx.notify(Notice::success("Task deleted successfully! 🗑️"));
            publish(ctx, state);
            ok(task)
        }
        Err(error) => task_error(ctx, error),
    }
}

pub fn duplicate_task(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_id: String,
) -> CommandResult<Task> {
    match state.with_store(|store| store.duplicate(&task_id)) {
        Ok(task) => {
            ctx.notify(Notice::success("Task duplicated successfully! 📋"));
            publish(ctx, state);
            ok(task)
        }
        Err(error) => task_error(ctx, error),
    }
}

pub fn set_search(ctx: &impl CommandCtx, state: &AppState, text: String) -> CommandResult<StatePayload> {
    state.set_search(&text);
    ok(publish(ctx, state))
}

pub fn set_filter(
    ctx: &impl CommandCtx,
    state: &AppState,
    filter: StatusFilter,
) -> CommandResult<StatePayload> {
    state.set_filter(filter);
    ok(publish(ctx, state))
}

pub fn set_sort(ctx: &impl CommandCtx, state: &AppState, sort: SortMode) -> CommandResult<StatePayload> {
    state.set_sort(sort);
    ok(publish(ctx, state))
}

/// Current view and statistics without emitting anything.
pub fn query_state(state: &AppState) -> CommandResult<StatePayload> {
    ok(state.payload())
}

pub fn save_now(state: &AppState) -> CommandResult<usize> {
    if state.save_now() {
        ok(state.with_store(|store| store.len()))
    } else {
        err("failed to save tasks")
    }
}

pub fn export_tasks(ctx: &impl CommandCtx, state: &AppState) -> CommandResult<ExportFile> {
    match state.export() {
        Ok(file) => {
            ctx.notify(Notice::success("Tasks exported successfully! 📤"));
            ok(file)
        }
        Err(error) => {
            log::error!("commands: export failed: {error}");
            ctx.notify(Notice::error("Error exporting tasks. Please try again."));
            err(&format!("export error: {error}"))
        }
    }
}

pub fn import_tasks(
    ctx: &impl CommandCtx,
    state: &AppState,
    contents: String,
) -> CommandResult<ImportReport> {
    match state.import(&contents) {
        Ok(report) => {
            ctx.notify(Notice::success(format!(
                "Imported {} tasks successfully! 📥",
                report.added
            )));
            publish(ctx, state);
            ok(report)
        }
        Err(error) => {
            log::warn!("commands: import failed: {error}");
            ctx.notify(Notice::error(
                "Error importing tasks. Please check the file format.",
            ));
            err(&error.to_string())
        }
    }
}

pub fn load_profile(state: &AppState) -> CommandResult<Profile> {
    ok(state.profile())
}

pub fn save_profile(
    ctx: &impl CommandCtx,
    state: &AppState,
    profile: Profile,
) -> CommandResult<Profile> {
    let (profile, saved) = state.save_profile(profile);
    publish(ctx, state);
    if !saved {
        // Persistence already told the user.
        return err("failed to save profile");
    }
    ctx.notify(Notice::success("Profile saved successfully! 💾"));
    ok(profile)
}

pub fn clear_profile(ctx: &impl CommandCtx, state: &AppState) -> CommandResult<Profile> {
    let cleared = state.clear_profile();
    publish(ctx, state);
    if !cleared {
        return err("failed to clear profile");
    }
    ctx.notify(Notice::success("Profile cleared successfully! 🗑️"));
    ok(state.profile())
}
