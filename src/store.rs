use std::collections::HashSet;
use std::sync::Arc;

use crate::clock::{Clock, IdGenerator};
use crate::models::{Task, TaskDraft, TaskPatch};

const COPY_SUFFIX: &str = " (Copy)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    Validation(String),
    NotFound(String),
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskError::Validation(reason) => write!(f, "validation error: {reason}"),
            TaskError::NotFound(id) => write!(f, "task not found: {id}"),
        }
    }
}

impl std::error::Error for TaskError {}

/// How many records a merge appended and how many it left out because their id was
/// already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MergeOutcome {
    pub added: usize,
    pub skipped: usize,
}

type MutationHook = Box<dyn Fn(&[Task]) + Send>;

/// Ordered task collection. Insertion order is the backing order every view is derived
/// from; ids are unique and `completed_at` tracks `completed`.
pub struct TaskStore {
    tasks: Vec<Task>,
    clock: Arc<dyn Clock>,
    ids: Box<dyn IdGenerator>,
    hooks: Vec<MutationHook>,
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore")
            .field("tasks", &self.tasks)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl TaskStore {
    pub fn new(clock: Arc<dyn Clock>, ids: Box<dyn IdGenerator>) -> Self {
        Self {
            tasks: Vec::new(),
            clock,
            ids,
            hooks: Vec::new(),
        }
    }

    /// Builds a store from previously persisted records, repairing anything that would
    /// break the collection invariants.
    pub fn with_tasks(tasks: Vec<Task>, clock: Arc<dyn Clock>, ids: Box<dyn IdGenerator>) -> Self {
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(tasks.len());
        for mut task in tasks {
            if task.name.trim().is_empty() {
                log::warn!("store: dropping record with empty name id={}", task.id);
                continue;
            }
            if !seen.insert(task.id.clone()) {
                log::warn!("store: dropping duplicate record id={}", task.id);
                continue;
            }
            if task.due_date.is_none() && task.due_time.take().is_some() {
                log::warn!("store: dropping dueTime without dueDate id={}", task.id);
            }
            normalize_completion(&mut task);
            kept.push(task);
        }
        let mut store = Self::new(clock, ids);
        store.tasks = kept;
        store
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Registers a hook that runs after every successful mutation with the full
    /// collection.
    pub fn on_mutation(&mut self, hook: impl Fn(&[Task]) + Send + 'static) {
        self.hooks.push(Box::new(hook));
    }

    pub fn add(&mut self, draft: TaskDraft) -> Result<Task, TaskError> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(TaskError::Validation("task name must not be empty".to_string()));
        }
        let task = Task {
            id: self.fresh_id(),
            name: name.to_string(),
            priority: draft.priority,
            category: draft.category,
            due_date: draft.due_date,
            due_time: draft.due_date.and(draft.due_time),
            completed: false,
            created_at: self.clock.now(),
            completed_at: None,
        };
        self.tasks.push(task.clone());
        log::info!("store: add id={} priority={}", task.id, task.priority);
        self.changed();
        Ok(task)
    }

    pub fn update(&mut self, id: &str, patch: TaskPatch) -> Result<Task, TaskError> {
        let name = match &patch.name {
            Some(name) => {
                let trimmed = name.trim();
                if trimmed.is_empty() {
                    return Err(TaskError::Validation("task name must not be empty".to_string()));
                }
                Some(trimmed.to_string())
            }
            None => None,
        };
        let task = self.find_mut(id)?;
        if let Some(name) = name {
            task.name = name;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(category) = patch.category {
            task.category = category;
        }
        if let Some(due_date) = patch.due_date {
            task.due_date = due_date;
        }
        if let Some(due_time) = patch.due_time {
            task.due_time = due_time;
        }
        if task.due_date.is_none() {
            task.due_time = None;
        }
        let updated = task.clone();
        log::info!("store: update id={id}");
        self.changed();
        Ok(updated)
    }

    pub fn toggle_complete(&mut self, id: &str) -> Result<Task, TaskError> {
        let now = self.clock.now();
        let task = self.find_mut(id)?;
        task.completed = !task.completed;
        task.completed_at = task.completed.then_some(now);
        let toggled = task.clone();
        log::info!("store: toggle id={id} completed={}", toggled.completed);
        self.changed();
        Ok(toggled)
    }

    pub fn remove(&mut self, id: &str) -> Result<Task, TaskError> {
        let index = self
            .tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        let removed = self.tasks.remove(index);
        log::info!("store: remove id={id}");
        self.changed();
        Ok(removed)
    }

    pub fn duplicate(&mut self, id: &str) -> Result<Task, TaskError> {
        let source = self
            .get(id)
            .cloned()
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        let copy = Task {
            id: self.fresh_id(),
            name: format!("{}{COPY_SUFFIX}", source.name),
            completed: false,
            created_at: self.clock.now(),
            completed_at: None,
            ..source
        };
        self.tasks.push(copy.clone());
        log::info!("store: duplicate source={id} id={}", copy.id);
        self.changed();
        Ok(copy)
    }

    /// Appends the records whose id is not already present. Existing records win, and
    /// within `records` the first occurrence of an id wins.
    pub fn replace_all(&mut self, records: Vec<Task>) -> MergeOutcome {
        let mut taken: HashSet<String> = self.tasks.iter().map(|task| task.id.clone()).collect();
        let mut outcome = MergeOutcome::default();
        for mut record in records {
            if !taken.insert(record.id.clone()) {
                outcome.skipped += 1;
                continue;
            }
            normalize_completion(&mut record);
            self.tasks.push(record);
            outcome.added += 1;
        }
        log::info!(
            "store: merge added={} skipped={}",
            outcome.added,
            outcome.skipped
        );
        if outcome.added > 0 {
            self.changed();
        }
        outcome
    }

    fn find_mut(&mut self, id: &str) -> Result<&mut Task, TaskError> {
        self.tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))
    }

    fn fresh_id(&mut self) -> String {
        loop {
            let id = self.ids.next_id();
            if self.get(&id).is_none() {
                return id;
            }
            log::debug!("store: generated id collided, drawing again id={id}");
        }
    }

    fn changed(&self) {
        for hook in &self.hooks {
            hook(&self.tasks);
        }
    }
}

fn normalize_completion(task: &mut Task) {
    match (task.completed, task.completed_at) {
        (true, None) => {
            log::warn!("store: completed record without completedAt id={}", task.id);
            task.completed_at = Some(task.created_at);
        }
        (false, Some(_)) => {
            log::warn!("store: pending record with completedAt id={}", task.id);
            task.completed_at = None;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SequentialIds};
    use crate::models::{Category, Priority};
    use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
    use std::sync::Mutex;

    fn make_store() -> (TaskStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        ));
        let store = TaskStore::new(clock.clone(), Box::new(SequentialIds::new("t")));
        (store, clock)
    }

    fn make_task(id: &str, completed: bool) -> Task {
        Task {
            id: id.to_string(),
            name: format!("task-{id}"),
            priority: Priority::Medium,
            category: Category::Other,
            due_date: None,
            due_time: None,
            completed,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            completed_at: None,
        }
    }

    fn assert_completion_coherent(store: &TaskStore) {
        for task in store.tasks() {
            assert_eq!(task.completed, task.completed_at.is_some(), "task {}", task.id);
        }
    }

    #[test]
    fn add_assigns_identity_and_trims_name() {
        let (mut store, clock) = make_store();
        let task = store
            .add(TaskDraft::new("  Write report  ").priority(Priority::High))
            .expect("valid draft");

        assert_eq!(task.id, "t-1");
        assert_eq!(task.name, "Write report");
        assert_eq!(task.priority, Priority::High);
        assert!(!task.completed);
        assert_eq!(task.completed_at, None);
        assert_eq!(task.created_at, clock.now());
        assert_eq!(store.tasks(), &[task]);
    }

    #[test]
    fn add_rejects_blank_name_without_changing_collection() {
        let (mut store, _) = make_store();
        store.add(TaskDraft::new("keep")).unwrap();

        let result = store.add(TaskDraft::new(" \t\n "));
        assert!(matches!(result, Err(TaskError::Validation(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn add_drops_time_without_date() {
        let (mut store, _) = make_store();
        let mut draft = TaskDraft::new("timeless");
        draft.due_time = NaiveTime::from_hms_opt(10, 0, 0);
        let task = store.add(draft).unwrap();
        assert_eq!(task.due_time, None);
    }

    #[test]
    fn add_appends_in_insertion_order() {
        let (mut store, _) = make_store();
        for name in ["a", "b", "c"] {
            store.add(TaskDraft::new(name)).unwrap();
        }
        let names: Vec<_> = store.tasks().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn update_applies_patch_and_keeps_identity() {
        let (mut store, clock) = make_store();
        let original = store.add(TaskDraft::new("old")).unwrap();
        store.toggle_complete(&original.id).unwrap();
        clock.advance(Duration::hours(1));

        let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let updated = store
            .update(
                &original.id,
                TaskPatch {
                    name: Some(" new ".to_string()),
                    category: Some(Category::Work),
                    due_date: Some(Some(date)),
                    due_time: Some(NaiveTime::from_hms_opt(8, 0, 0)),
                    ..TaskPatch::default()
                },
            )
            .unwrap();

        assert_eq!(updated.id, original.id);
        assert_eq!(updated.created_at, original.created_at);
        assert_eq!(updated.name, "new");
        assert_eq!(updated.priority, Priority::Medium);
        assert_eq!(updated.category, Category::Work);
        assert_eq!(updated.due_date, Some(date));
        assert!(updated.completed);
        assert!(updated.completed_at.is_some());
    }

    #[test]
    fn update_clearing_date_clears_time() {
        let (mut store, _) = make_store();
        let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let task = store
            .add(TaskDraft::new("dated").due(date, NaiveTime::from_hms_opt(8, 0, 0)))
            .unwrap();

        let updated = store
            .update(
                &task.id,
                TaskPatch {
                    due_date: Some(None),
                    ..TaskPatch::default()
                },
            )
            .unwrap();
        assert_eq!(updated.due_date, None);
        assert_eq!(updated.due_time, None);
    }

    #[test]
    fn update_rejects_blank_name_and_unknown_id() {
        let (mut store, _) = make_store();
        let task = store.add(TaskDraft::new("name")).unwrap();

        let blank = TaskPatch {
            name: Some("   ".to_string()),
            ..TaskPatch::default()
        };
        assert!(matches!(
            store.update(&task.id, blank),
            Err(TaskError::Validation(_))
        ));
        assert_eq!(store.get(&task.id).unwrap().name, "name");

        assert_eq!(
            store.update("missing", TaskPatch::default()),
            Err(TaskError::NotFound("missing".to_string()))
        );
    }

    #[test]
    fn toggle_keeps_completed_at_coherent() {
        let (mut store, clock) = make_store();
        let task = store.add(TaskDraft::new("flip")).unwrap();

        for step in 0..5 {
            clock.advance(Duration::minutes(5));
            let toggled = store.toggle_complete(&task.id).unwrap();
            assert_eq!(toggled.completed, step % 2 == 0);
            if toggled.completed {
                assert_eq!(toggled.completed_at, Some(clock.now()));
            } else {
                assert_eq!(toggled.completed_at, None);
            }
            assert_completion_coherent(&store);
        }

        assert!(matches!(
            store.toggle_complete("missing"),
            Err(TaskError::NotFound(_))
        ));
    }

    #[test]
    fn remove_deletes_only_matching_record() {
        let (mut store, _) = make_store();
        let a = store.add(TaskDraft::new("a")).unwrap();
        let b = store.add(TaskDraft::new("b")).unwrap();

        let removed = store.remove(&a.id).unwrap();
        assert_eq!(removed.id, a.id);
        assert_eq!(store.tasks(), &[b]);

        assert!(matches!(store.remove(&a.id), Err(TaskError::NotFound(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn duplicate_copies_fields_with_fresh_identity() {
        let (mut store, clock) = make_store();
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let original = store
            .add(
                TaskDraft::new("Plan trip")
                    .priority(Priority::High)
                    .category(Category::Personal)
                    .due(date, NaiveTime::from_hms_opt(18, 30, 0)),
            )
            .unwrap();
        let original = store.toggle_complete(&original.id).unwrap();
        clock.advance(Duration::days(1));

        let copy = store.duplicate(&original.id).unwrap();
        assert_ne!(copy.id, original.id);
        assert_eq!(copy.name, "Plan trip (Copy)");
        assert_eq!(copy.priority, original.priority);
        assert_eq!(copy.category, original.category);
        assert_eq!(copy.due_date, original.due_date);
        assert_eq!(copy.due_time, original.due_time);
        assert!(!copy.completed);
        assert_eq!(copy.completed_at, None);
        assert_eq!(copy.created_at, clock.now());

        assert_eq!(store.get(&original.id), Some(&original));
        assert_eq!(store.tasks().last(), Some(&copy));
        assert!(matches!(store.duplicate("missing"), Err(TaskError::NotFound(_))));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn generated_ids_skip_existing_ones() {
        let (mut store, _) = make_store();
        store.replace_all(vec![make_task("t-1", false), make_task("t-2", false)]);
        let task = store.add(TaskDraft::new("fresh")).unwrap();
        assert_eq!(task.id, "t-3");
    }

    #[test]
    fn replace_all_suppresses_duplicate_ids() {
        let (mut store, _) = make_store();
        store.replace_all(vec![make_task("a", false)]);

        let mut incoming_a = make_task("a", true);
        incoming_a.name = "imported a".to_string();
        let outcome = store.replace_all(vec![
            incoming_a,
            make_task("b", false),
            make_task("b", true),
        ]);

        assert_eq!(outcome, MergeOutcome { added: 1, skipped: 2 });
        let ids: Vec<_> = store.tasks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(store.get("a").unwrap().name, "task-a");
        assert!(!store.get("b").unwrap().completed);
    }

    #[test]
    fn replace_all_repairs_completion_fields() {
        let (mut store, _) = make_store();
        let mut stale = make_task("stale", false);
        stale.completed_at = Some(Utc::now());
        store.replace_all(vec![make_task("done", true), stale]);
        assert_completion_coherent(&store);
        assert_eq!(
            store.get("done").unwrap().completed_at,
            Some(store.get("done").unwrap().created_at)
        );
    }

    #[test]
    fn with_tasks_repairs_loaded_records() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut blank = make_task("blank", false);
        blank.name = "  ".to_string();
        let store = TaskStore::with_tasks(
            vec![
                make_task("a", true),
                make_task("a", false),
                blank,
                make_task("b", false),
            ],
            clock,
            Box::new(SequentialIds::new("t")),
        );

        let ids: Vec<_> = store.tasks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_completion_coherent(&store);
    }

    #[test]
    fn with_tasks_drops_time_without_date() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut orphan = make_task("orphan", false);
        orphan.due_time = NaiveTime::from_hms_opt(9, 30, 0);
        let mut dated = make_task("dated", false);
        dated.due_date = NaiveDate::from_ymd_opt(2024, 6, 2);
        dated.due_time = NaiveTime::from_hms_opt(9, 30, 0);

        let store = TaskStore::with_tasks(
            vec![orphan, dated],
            clock,
            Box::new(SequentialIds::new("t")),
        );

        assert_eq!(store.get("orphan").unwrap().due_time, None);
        assert_eq!(
            store.get("dated").unwrap().due_time,
            NaiveTime::from_hms_opt(9, 30, 0)
        );
    }

    #[test]
    fn hooks_fire_after_successful_mutations_only() {
        let (mut store, _) = make_store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.on_mutation(move |tasks| sink.lock().unwrap().push(tasks.len()));

        let task = store.add(TaskDraft::new("a")).unwrap();
        store.toggle_complete(&task.id).unwrap();
        store.duplicate(&task.id).unwrap();
        let _ = store.add(TaskDraft::new(""));
        let _ = store.remove("missing");
        store.replace_all(vec![task.clone()]);
        store.remove(&task.id).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 1, 2, 1]);
    }
}
