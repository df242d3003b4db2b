use std::sync::{Arc, Mutex};

use crate::autosave::AutoSaveHandle;
use crate::clock::{Clock, IdGenerator};
use crate::events::StatePayload;
use crate::format::task_count_label;
use crate::models::{Profile, Task};
use crate::query::{view, SortMode, StatusFilter, ViewCriteria};
use crate::stats::Statistics;
use crate::storage::Persistence;
use crate::store::TaskStore;
use crate::transfer::{self, ExportFile, ImportError, ImportReport};

/// Shared application state: the task store, the view criteria and the profile.
///
/// Every store mutation is handed to the auto-saver through a mutation hook, so callers
/// never persist the collection themselves.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Mutex<AppData>>,
    persistence: Arc<Persistence>,
    autosave: AutoSaveHandle,
}

impl AppState {
    /// Loads the persisted collection and profile. Unreadable data falls back to an empty
    /// collection and the default profile.
    pub fn open(
        persistence: Arc<Persistence>,
        autosave: AutoSaveHandle,
        clock: Arc<dyn Clock>,
        ids: Box<dyn IdGenerator>,
    ) -> Self {
        let tasks = persistence.load_tasks();
        let profile = persistence.load_profile().unwrap_or_default();
        autosave.set_enabled(profile.auto_save);

        let mut store = TaskStore::with_tasks(tasks, clock, ids);
        let hook = autosave.clone();
        store.on_mutation(move |tasks| hook.tasks_changed(tasks));
        log::info!(
            "state: opened tasks={} auto_save={}",
            store.len(),
            profile.auto_save
        );

        Self {
            inner: Arc::new(Mutex::new(AppData {
                store,
                profile,
                criteria: ViewCriteria::default(),
            })),
            persistence,
            autosave,
        }
    }

    /// Runs `f` against the store. Mutations made through it are saved automatically.
    pub fn with_store<R>(&self, f: impl FnOnce(&mut TaskStore) -> R) -> R {
        let mut guard = self.inner.lock().expect("state poisoned");
        f(&mut guard.store)
    }

    pub fn tasks(&self) -> Vec<Task> {
        let guard = self.inner.lock().expect("state poisoned");
        guard.store.tasks().to_vec()
    }

    pub fn criteria(&self) -> ViewCriteria {
        let guard = self.inner.lock().expect("state poisoned");
        guard.criteria.clone()
    }

    pub fn set_search(&self, text: &str) {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.criteria.search_text = text.to_string();
    }

    pub fn set_filter(&self, filter: StatusFilter) {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.criteria.status_filter = filter;
    }

    pub fn set_sort(&self, sort: SortMode) {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.criteria.sort_mode = sort;
    }

    /// The filtered and sorted view, owned.
    pub fn visible_tasks(&self) -> Vec<Task> {
        let guard = self.inner.lock().expect("state poisoned");
        let now = guard.store.clock().local_now();
        view(guard.store.tasks(), &guard.criteria, now)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn statistics(&self) -> Statistics {
        let guard = self.inner.lock().expect("state poisoned");
        let clock = guard.store.clock();
        Statistics::compute(guard.store.tasks(), clock.now(), clock.local_now())
    }

    pub fn payload(&self) -> StatePayload {
        let guard = self.inner.lock().expect("state poisoned");
        let clock = guard.store.clock();
        let now = clock.local_now();
        let tasks: Vec<Task> = view(guard.store.tasks(), &guard.criteria, now)
            .into_iter()
            .cloned()
            .collect();
        StatePayload {
            task_count: task_count_label(tasks.len()),
            stats: Statistics::compute(guard.store.tasks(), clock.now(), now),
            criteria: guard.criteria.clone(),
            profile: guard.profile.clone(),
            tasks,
        }
    }

    pub fn profile(&self) -> Profile {
        let guard = self.inner.lock().expect("state poisoned");
        guard.profile.clone()
    }

    /// Stores `profile`, stamping `last_updated`. The in-memory copy is replaced even when
    /// the write fails.
    pub fn save_profile(&self, mut profile: Profile) -> (Profile, bool) {
        let mut guard = self.inner.lock().expect("state poisoned");
        profile.last_updated = Some(guard.store.clock().now());
        self.autosave.set_enabled(profile.auto_save);
        guard.profile = profile.clone();
        drop(guard);
        let saved = self.persistence.save_profile(&profile);
        (profile, saved)
    }

    pub fn clear_profile(&self) -> bool {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.profile = Profile::default();
        self.autosave.set_enabled(guard.profile.auto_save);
        drop(guard);
        self.persistence.clear_profile()
    }

    /// Writes the collection right away, bypassing the quiet period.
    pub fn save_now(&self) -> bool {
        let guard = self.inner.lock().expect("state poisoned");
        self.autosave.save_now(guard.store.tasks())
    }

    pub fn export(&self) -> Result<ExportFile, serde_json::Error> {
        let guard = self.inner.lock().expect("state poisoned");
        let today = guard.store.clock().now().date_naive();
        transfer::export_all(guard.store.tasks(), today)
    }

    pub fn import(&self, contents: &str) -> Result<ImportReport, ImportError> {
        let mut guard = self.inner.lock().expect("state poisoned");
        transfer::import_into(&mut guard.store, contents)
    }
}

struct AppData {
    store: TaskStore,
    profile: Profile,
    criteria: ViewCriteria,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autosave::AutoSaver;
    use crate::clock::{ManualClock, SequentialIds};
    use crate::events::{Notice, Notifier};
    use crate::models::TaskDraft;
    use crate::storage::{KeyValueStore, MemoryStore, PROFILE_KEY, TASKS_KEY};
    use chrono::{Duration, TimeZone, Utc};

    #[derive(Default)]
    struct RecordingNotifier {
        notices: Mutex<Vec<Notice>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notice: Notice) {
            self.notices.lock().unwrap().push(notice);
        }
    }

    /// Shares one in-memory backend between the persistence layer and the test body.
    #[derive(Clone, Default)]
    struct SharedStore(Arc<MemoryStore>);

    impl KeyValueStore for SharedStore {
        fn get(&self, key: &str) -> Result<Option<String>, crate::storage::StorageError> {
            self.0.get(key)
        }
        fn set(&self, key: &str, value: &str) -> Result<(), crate::storage::StorageError> {
            self.0.set(key, value)
        }
        fn remove(&self, key: &str) -> Result<(), crate::storage::StorageError> {
            self.0.remove(key)
        }
    }

    fn open_state(kv: SharedStore, clock: Arc<ManualClock>) -> (AppState, AutoSaver) {
        let persistence = Arc::new(Persistence::new(
            Box::new(kv),
            Arc::new(RecordingNotifier::default()),
        ));
        let writer = persistence.clone();
        let saver = AutoSaver::immediate(move |tasks: &[Task]| writer.save_tasks(tasks));
        let state = AppState::open(
            persistence,
            saver.handle(),
            clock,
            Box::new(SequentialIds::new("t")),
        );
        (state, saver)
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        ))
    }

    #[test]
    fn mutations_are_persisted_and_survive_reopen() {
        let kv = SharedStore::default();
        let (state, _saver) = open_state(kv.clone(), clock());

        let added = state
            .with_store(|store| store.add(TaskDraft::new("Write report")))
            .unwrap();
        assert!(kv.get(TASKS_KEY).unwrap().unwrap().contains("Write report"));

        state.with_store(|store| store.toggle_complete(&added.id)).unwrap();
        let (reopened, _saver) = open_state(kv, clock());
        let tasks = reopened.tasks();
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].completed);
    }

    #[test]
    fn payload_reflects_criteria_and_whole_collection_stats() {
        let (state, _saver) = open_state(SharedStore::default(), clock());
        state.with_store(|store| {
            store.add(TaskDraft::new("alpha")).unwrap();
            let beta = store.add(TaskDraft::new("beta")).unwrap();
            store.toggle_complete(&beta.id).unwrap();
        });

        state.set_filter(StatusFilter::Completed);
        let payload = state.payload();
        assert_eq!(payload.tasks.len(), 1);
        assert_eq!(payload.tasks[0].name, "beta");
        assert_eq!(payload.task_count, "1 task");
        assert_eq!(payload.stats.total, 2);
        assert_eq!(payload.stats.completion_rate, 50);

        state.set_filter(StatusFilter::All);
        state.set_search("ALP");
        state.set_sort(SortMode::Alphabetical);
        assert_eq!(state.visible_tasks().len(), 1);
        assert_eq!(state.criteria().search_text, "ALP");
    }

    #[test]
    fn profile_save_stamps_and_clear_resets() {
        let kv = SharedStore::default();
        let clock = clock();
        let (state, _saver) = open_state(kv.clone(), clock.clone());
        assert_eq!(state.profile(), Profile::default());

        clock.advance(Duration::minutes(5));
        let (saved, ok) = state.save_profile(Profile {
            name: "Ada".to_string(),
            auto_save: false,
            ..Profile::default()
        });
        assert!(ok);
        assert_eq!(saved.last_updated, Some(clock.now()));
        assert!(kv.get(PROFILE_KEY).unwrap().unwrap().contains("Ada"));

        let (reopened, _saver) = open_state(kv.clone(), clock.clone());
        assert_eq!(reopened.profile().name, "Ada");

        assert!(state.clear_profile());
        assert_eq!(state.profile(), Profile::default());
        assert_eq!(kv.get(PROFILE_KEY).unwrap(), None);
    }

    #[test]
    fn save_now_failure_is_reported() {
        let persistence = Arc::new(Persistence::new(
            Box::new(MemoryStore::with_quota(8)),
            Arc::new(RecordingNotifier::default()),
        ));
        let writer = persistence.clone();
        let saver = AutoSaver::immediate(move |tasks: &[Task]| writer.save_tasks(tasks));
        let state = AppState::open(
            persistence,
            saver.handle(),
            clock(),
            Box::new(SequentialIds::new("t")),
        );

        // The collection stays authoritative in memory even though the write failed.
        state
            .with_store(|store| store.add(TaskDraft::new("too big to fit")))
            .unwrap();
        assert_eq!(state.tasks().len(), 1);
        assert!(!state.save_now());
    }

    #[test]
    fn export_and_import_go_through_the_store() {
        let (state, _saver) = open_state(SharedStore::default(), clock());
        state.with_store(|store| store.add(TaskDraft::new("one"))).unwrap();
        let file = state.export().unwrap();
        assert_eq!(file.filename, "todo-tasks-2024-03-01.json");

        let (other, _saver) = open_state(SharedStore::default(), clock());
        let report = other.import(&file.contents).unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(other.tasks(), state.tasks());
    }
}
