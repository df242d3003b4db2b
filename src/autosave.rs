use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::Task;

pub const AUTO_SAVE_QUIET_PERIOD: Duration = Duration::from_secs(1);

/// Returns whether the write landed.
type Writer = Arc<dyn Fn(&[Task]) -> bool + Send + Sync>;

struct Shared {
    enabled: AtomicBool,
    /// Held across the staleness check and the write, so a delayed snapshot can never
    /// land after a newer synchronous write.
    generation: Mutex<u64>,
    writer: Writer,
}

impl Shared {
    fn new(enabled: bool, writer: Writer) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            generation: Mutex::new(0),
            writer,
        }
    }

    fn write_latest(&self, tasks: &[Task]) -> bool {
        let mut generation = self.generation.lock().expect("autosave poisoned");
        *generation += 1;
        (self.writer)(tasks)
    }
}

/// Coalesces collection writes.
///
/// While enabled, every change restarts a quiet-period timer and only the latest
/// snapshot is written once the timer runs out. While disabled (or when built without a
/// worker) each change is written on the spot. A delayed snapshot is dropped if a newer
/// synchronous write happened in the meantime.
pub struct AutoSaver {
    shared: Arc<Shared>,
    tx: Option<mpsc::UnboundedSender<Message>>,
    worker: Option<JoinHandle<()>>,
}

enum Message {
    Snapshot(u64, Vec<Task>),
    Shutdown,
}

enum Wake {
    Quiet,
    Message(Option<Message>),
}

/// Cheap handle for mutation hooks.
#[derive(Clone)]
pub struct AutoSaveHandle {
    shared: Arc<Shared>,
    tx: Option<mpsc::UnboundedSender<Message>>,
}

impl AutoSaver {
    /// Starts the debounce worker. Must be called from within a tokio runtime.
    pub fn spawn<F>(quiet: Duration, enabled: bool, writer: F) -> Self
    where
        F: Fn(&[Task]) -> bool + Send + Sync + 'static,
    {
        let shared = Arc::new(Shared::new(enabled, Arc::new(writer)));
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(rx, quiet, shared.clone()));
        log::debug!("autosave: worker started quiet_ms={}", quiet.as_millis());
        Self {
            shared,
            tx: Some(tx),
            worker: Some(worker),
        }
    }

    /// No background worker: every change is written synchronously.
    pub fn immediate<F>(writer: F) -> Self
    where
        F: Fn(&[Task]) -> bool + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared::new(false, Arc::new(writer))),
            tx: None,
            worker: None,
        }
    }

    pub fn handle(&self) -> AutoSaveHandle {
        AutoSaveHandle {
            shared: self.shared.clone(),
            tx: self.tx.clone(),
        }
    }

    /// Writes any pending snapshot right away and stops the worker. Handles that
    /// outlive the worker fall back to synchronous writes.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Message::Shutdown);
        }
        if let Some(worker) = self.worker.take() {
            if let Err(err) = worker.await {
                log::error!("autosave: worker failed: {err}");
            }
        }
    }
}

impl AutoSaveHandle {
    pub fn is_debounced(&self) -> bool {
        self.tx.is_some() && self.shared.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn tasks_changed(&self, tasks: &[Task]) {
        if self.is_debounced() {
            if let Some(tx) = &self.tx {
                let generation = {
                    let mut current = self.shared.generation.lock().expect("autosave poisoned");
                    *current += 1;
                    *current
                };
                if tx.send(Message::Snapshot(generation, tasks.to_vec())).is_ok() {
                    return;
                }
                log::warn!("autosave: worker gone, writing synchronously");
            }
        }
        self.shared.write_latest(tasks);
    }

    /// Writes `tasks` now, superseding any pending delayed write.
    pub fn save_now(&self, tasks: &[Task]) -> bool {
        self.shared.write_latest(tasks)
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<Message>,
    quiet: Duration,
    shared: Arc<Shared>,
) {
    let mut pending: Option<(u64, Vec<Task>)> = None;
    loop {
        let wake = if pending.is_some() {
            tokio::select! {
                _ = tokio::time::sleep(quiet) => Wake::Quiet,
                message = rx.recv() => Wake::Message(message),
            }
        } else {
            Wake::Message(rx.recv().await)
        };
        match wake {
            Wake::Quiet => flush(&shared, pending.take()),
            Wake::Message(Some(Message::Snapshot(generation, tasks))) => {
                pending = Some((generation, tasks));
            }
            Wake::Message(Some(Message::Shutdown)) | Wake::Message(None) => {
                flush(&shared, pending.take());
                break;
            }
        }
    }
    log::debug!("autosave: worker stopped");
}

fn flush(shared: &Shared, pending: Option<(u64, Vec<Task>)>) {
    let Some((generation, tasks)) = pending else {
        return;
    };
    let current = shared.generation.lock().expect("autosave poisoned");
    if *current != generation {
        log::debug!("autosave: dropping stale snapshot generation={generation}");
        return;
    }
    log::debug!("autosave: writing snapshot count={}", tasks.len());
    if !(shared.writer)(&tasks) {
        log::warn!("autosave: delayed write failed count={}", tasks.len());
    }
    drop(current);
}
