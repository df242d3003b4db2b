use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::events::{LogNotifier, Notice, Notifier};
use crate::models::{Profile, Task};

pub const TASKS_KEY: &str = "todoTasks";
pub const PROFILE_KEY: &str = "userProfile";

#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Json(serde_json::Error),
    QuotaExceeded { needed: usize, quota: usize },
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(err) => write!(f, "io error: {err}"),
            StorageError::Json(err) => write!(f, "json error: {err}"),
            StorageError::QuotaExceeded { needed, quota } => {
                write!(f, "storage quota exceeded: need {needed} bytes, quota {quota}")
            }
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        StorageError::Io(value)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        StorageError::Json(value)
    }
}

/// Flat string store addressed by fixed keys.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// One `<key>.json` file per key under `root`.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn ensure_dirs(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(buf) => Ok(Some(buf)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        write_atomic(&self.path_for(key), value.as_bytes())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Writes to a sibling temp file, syncs, then renames over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(temp_path, path)?;
    Ok(())
}

/// In-process store with an optional byte quota across all keys.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota: Some(quota),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self.entries.lock().expect("memory store poisoned");
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut guard = self.entries.lock().expect("memory store poisoned");
        if let Some(quota) = self.quota {
            let others: usize = guard
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(existing, stored)| existing.len() + stored.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > quota {
                return Err(StorageError::QuotaExceeded { needed, quota });
            }
        }
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self.entries.lock().expect("memory store poisoned");
        guard.remove(key);
        Ok(())
    }
}

/// Reads and writes the task collection and the profile under their fixed keys.
///
/// The plain methods are fail-soft: a failure is logged, reported through the notifier
/// and turned into a `false`/empty result, so the in-memory state stays authoritative.
/// The `try_` variants return the error instead.
pub struct Persistence {
    kv: Box<dyn KeyValueStore>,
    notifier: Arc<dyn Notifier>,
}

impl Persistence {
    pub fn new(kv: Box<dyn KeyValueStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { kv, notifier }
    }

    /// For embedders with no front end: failures only reach the log.
    pub fn unattended(kv: Box<dyn KeyValueStore>) -> Self {
        Self::new(kv, Arc::new(LogNotifier))
    }

    pub fn try_save_tasks(&self, tasks: &[Task]) -> Result<(), StorageError> {
        self.write_json(TASKS_KEY, &tasks)
    }

    pub fn try_load_tasks(&self) -> Result<Option<Vec<Task>>, StorageError> {
        self.read_json(TASKS_KEY)
    }

    pub fn try_save_profile(&self, profile: &Profile) -> Result<(), StorageError> {
        self.write_json(PROFILE_KEY, profile)
    }

    pub fn try_load_profile(&self) -> Result<Option<Profile>, StorageError> {
        self.read_json(PROFILE_KEY)
    }

    pub fn save_tasks(&self, tasks: &[Task]) -> bool {
        match self.try_save_tasks(tasks) {
            Ok(()) => {
                log::debug!("storage: saved tasks count={}", tasks.len());
                true
            }
            Err(err) => {
                self.report("Error saving tasks. Please try again.", "save tasks", &err);
                false
            }
        }
    }

    /// Missing key or unreadable data both yield an empty collection.
    pub fn load_tasks(&self) -> Vec<Task> {
        match self.try_load_tasks() {
            Ok(Some(tasks)) => {
                log::info!("storage: loaded tasks count={}", tasks.len());
                tasks
            }
            Ok(None) => Vec::new(),
            Err(err) => {
                self.report("Error loading saved tasks.", "load tasks", &err);
                Vec::new()
            }
        }
    }

    pub fn save_profile(&self, profile: &Profile) -> bool {
        match self.try_save_profile(profile) {
            Ok(()) => true,
            Err(err) => {
                self.report("Error saving profile. Please try again.", "save profile", &err);
                false
            }
        }
    }

    pub fn load_profile(&self) -> Option<Profile> {
        match self.try_load_profile() {
            Ok(profile) => profile,
            Err(err) => {
                self.report("Error loading profile.", "load profile", &err);
                None
            }
        }
    }

    pub fn clear_profile(&self) -> bool {
        match self.kv.remove(PROFILE_KEY) {
            Ok(()) => true,
            Err(err) => {
                self.report("Error clearing profile.", "clear profile", &err);
                false
            }
        }
    }

    fn write_json<T: Serialize + ?Sized>(&self, key: &str, data: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string(data)?;
        self.kv.set(key, &json)
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.kv.get(key)? {
            Some(buf) => Ok(Some(serde_json::from_str(&buf)?)),
            None => Ok(None),
        }
    }

    fn report(&self, message: &str, action: &str, err: &StorageError) {
        log::error!("storage: {action} failed: {err}");
        self.notifier.notify(Notice::error(message));
    }
}
