use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};

pub const APP_DIR_NAME: &str = "todo-list";
pub const DATA_DIR_ENV: &str = "TODO_LIST_DATA_DIR";
pub const LOG_ENV: &str = "TODO_LIST_LOG";

/// Where the task collection, the profile and the log files live.
///
/// Order: the `--data-dir` flag, then `TODO_LIST_DATA_DIR`, then the platform data
/// directory joined with `todo-list`. The directory is created when missing.
pub fn resolve_data_dir(override_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = pick_data_dir(override_dir, env_value(DATA_DIR_ENV), dirs::data_dir())
        .ok_or_else(|| anyhow!("cannot determine a data directory; pass --data-dir"))?;
    if !dir.exists() {
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    Ok(dir)
}

fn pick_data_dir(
    override_dir: Option<&Path>,
    env_dir: Option<String>,
    platform_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(path) = override_dir {
        return Some(path.to_path_buf());
    }
    if let Some(value) = env_dir {
        return Some(PathBuf::from(value));
    }
    platform_dir.map(|base| base.join(APP_DIR_NAME))
}

/// Log filter: `TODO_LIST_LOG`, then `RUST_LOG`, then a default that `-v` makes chattier
/// for this crate only.
pub fn log_spec(verbose: u8) -> String {
    pick_log_spec(env_value(LOG_ENV), env_value("RUST_LOG"), verbose)
}

fn pick_log_spec(primary: Option<String>, fallback: Option<String>, verbose: u8) -> String {
    if let Some(spec) = primary.or(fallback) {
        return spec;
    }
    let level = match verbose {
        0 if cfg!(debug_assertions) => "debug",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    format!("warn,todo_list_lib={level}")
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
