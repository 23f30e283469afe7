use crate::domain::{DailyCompletionStat, Priority, PriorityStat, Task};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Mutex, MutexGuard};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Stored layout version. Schema evolution policy is destructive: a version
/// bump drops the old table and recreates it empty.
pub const SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task store I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("task store encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// On-disk layout: a single table of task records keyed by id
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    next_id: i64,
    tasks: Vec<Task>,
}

struct StoreInner {
    tasks: Vec<Task>,
    next_id: i64,
    subscribers: Vec<Sender<Vec<Task>>>,
}

/// Durable table of task records.
///
/// Mutations are serialized through an internal lock and committed with an
/// atomic temp-file-then-rename write before they become visible; every
/// committed mutation pushes a fresh ordered snapshot to all subscribers.
/// The store persists and aggregates; it never schedules alarms or touches
/// the widget.
pub struct TaskStore {
    path: PathBuf,
    inner: Mutex<StoreInner>,
}

impl TaskStore {
    /// Open the store at `path`, creating it if absent.
    ///
    /// An unreadable file or a schema version mismatch drops the table and
    /// recreates it empty. That data loss is the accepted policy for this
    /// application class, so it is logged, not an error.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<TaskStore> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let (tasks, next_id) = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<StoreFile>(&content) {
                Ok(file) if file.version == SCHEMA_VERSION => (file.tasks, file.next_id.max(1)),
                Ok(file) => {
                    log::warn!(
                        "task file {} has schema version {} (expected {}); dropping and recreating",
                        path.display(),
                        file.version,
                        SCHEMA_VERSION
                    );
                    (Vec::new(), 1)
                }
                Err(err) => {
                    log::warn!(
                        "task file {} is unreadable ({}); dropping and recreating",
                        path.display(),
                        err
                    );
                    (Vec::new(), 1)
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => (Vec::new(), 1),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        let store = TaskStore {
            path,
            inner: Mutex::new(StoreInner {
                tasks,
                next_id,
                subscribers: Vec::new(),
            }),
        };
        // Rewrites a recreated table immediately so a crash cannot resurrect
        // the old schema
        {
            let inner = store.lock();
            store.write_file(&inner.tasks, inner.next_id)?;
        }
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// All tasks in default order: priority descending, then id descending
    /// (newest first within a tier)
    pub fn list(&self) -> Vec<Task> {
        ordered(&self.lock().tasks)
    }

    /// Look up a single task by id
    pub fn find(&self, id: i64) -> Option<Task> {
        self.lock().tasks.iter().find(|t| t.id == id).cloned()
    }

    /// Register an observer. Each committed mutation delivers a fresh ordered
    /// snapshot; dropped receivers are pruned on the next publish.
    pub fn subscribe(&self) -> Receiver<Vec<Task>> {
        let (tx, rx) = channel();
        self.lock().subscribers.push(tx);
        rx
    }

    /// Insert a task, assigning an id when none is set. An existing id is
    /// replaced (upsert). Returns the stored record.
    pub fn insert(&self, mut task: Task) -> StoreResult<Task> {
        let stored = self.commit(|tasks, next_id| {
            if task.id == 0 {
                task.id = *next_id;
                *next_id += 1;
            } else if task.id >= *next_id {
                *next_id = task.id + 1;
            }
            match tasks.iter_mut().find(|t| t.id == task.id) {
                Some(existing) => *existing = task.clone(),
                None => tasks.push(task.clone()),
            }
            Some(task.clone())
        })?;
        Ok(stored.unwrap_or(task))
    }

    /// Replace the row matching `task.id`. A stale or missing id is a silent
    /// no-op; callers operate on records previously read from the store.
    pub fn update(&self, task: &Task) -> StoreResult<()> {
        let applied = self.commit(|tasks, _| {
            let existing = tasks.iter_mut().find(|t| t.id == task.id)?;
            *existing = task.clone();
            Some(())
        })?;
        if applied.is_none() {
            log::debug!("update for unknown task id {} ignored", task.id);
        }
        Ok(())
    }

    /// Delete by id; unknown ids are a no-op
    pub fn delete(&self, id: i64) -> StoreResult<()> {
        self.commit(|tasks, _| {
            let before = tasks.len();
            tasks.retain(|t| t.id != id);
            (tasks.len() != before).then_some(())
        })?;
        Ok(())
    }

    pub fn delete_all(&self) -> StoreResult<()> {
        self.commit(|tasks, _| {
            tasks.clear();
            Some(())
        })?;
        Ok(())
    }

    /// Bulk-restore every completed task back to incomplete, clearing its
    /// accrued time and completion timestamp. Incomplete tasks are untouched.
    pub fn restore_all_completed(&self) -> StoreResult<()> {
        self.commit(|tasks, _| {
            for task in tasks.iter_mut().filter(|t| t.is_completed) {
                task.is_completed = false;
                task.accumulated_time = 0;
                task.completed_at = None;
            }
            Some(())
        })?;
        Ok(())
    }

    /// Bulk-clear all stopwatch state app-wide, independent of completion
    pub fn reset_all_timers(&self) -> StoreResult<()> {
        self.commit(|tasks, _| {
            for task in tasks.iter_mut() {
                task.is_running = false;
                task.accumulated_time = 0;
                task.elapsed_time = 0;
                task.start_time = None;
            }
            Some(())
        })?;
        Ok(())
    }

    /// Sum of accumulated time across completed tasks
    pub fn total_focused_time_of_completed(&self) -> i64 {
        self.lock()
            .tasks
            .iter()
            .filter(|t| t.is_completed)
            .map(|t| t.accumulated_time)
            .sum()
    }

    /// Accumulated time of completed tasks grouped by priority, highest first
    pub fn time_by_priority_of_completed(&self) -> Vec<PriorityStat> {
        let mut by_priority: BTreeMap<Priority, i64> = BTreeMap::new();
        for task in self.lock().tasks.iter().filter(|t| t.is_completed) {
            *by_priority.entry(task.priority).or_insert(0) += task.accumulated_time;
        }
        by_priority
            .into_iter()
            .rev()
            .map(|(priority, total_ms)| PriorityStat { priority, total_ms })
            .collect()
    }

    /// Completion counts grouped by local calendar day of `completed_at`,
    /// most recent day first, capped at `limit` entries
    pub fn completion_counts_by_day(&self, limit: usize) -> Vec<DailyCompletionStat> {
        let mut by_day: BTreeMap<chrono::NaiveDate, u32> = BTreeMap::new();
        for task in self.lock().tasks.iter().filter(|t| t.is_completed) {
            if let Some(day) = task.completed_day() {
                *by_day.entry(day).or_insert(0) += 1;
            }
        }
        by_day
            .into_iter()
            .rev()
            .take(limit)
            .map(|(date, count)| DailyCompletionStat { date, count })
            .collect()
    }

    /// Apply a mutation, persist, then swap it in and publish. The in-memory
    /// table is only replaced after the write lands, so a persistence failure
    /// leaves state unchanged. A `None` from the closure means nothing
    /// changed: no write, no publish.
    fn commit<R>(
        &self,
        mutate: impl FnOnce(&mut Vec<Task>, &mut i64) -> Option<R>,
    ) -> StoreResult<Option<R>> {
        let mut inner = self.lock();
        let mut tasks = inner.tasks.clone();
        let mut next_id = inner.next_id;
        let out = match mutate(&mut tasks, &mut next_id) {
            Some(out) => out,
            None => return Ok(None),
        };
        self.write_file(&tasks, next_id)?;
        inner.tasks = tasks;
        inner.next_id = next_id;
        publish(&mut inner);
        Ok(Some(out))
    }

    /// Atomically write the table using temp file + rename
    fn write_file(&self, tasks: &[Task], next_id: i64) -> StoreResult<()> {
        let file = StoreFile {
            version: SCHEMA_VERSION,
            next_id,
            tasks: tasks.to_vec(),
        };
        let content = serde_json::to_string_pretty(&file)?;

        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp_file = NamedTempFile::new_in(dir).map_err(io_err)?;
        temp_file.write_all(content.as_bytes()).map_err(io_err)?;
        temp_file.as_file().sync_all().map_err(io_err)?;
        temp_file
            .persist(&self.path)
            .map_err(|err| io_err(err.error))?;
        Ok(())
    }
}

fn ordered(tasks: &[Task]) -> Vec<Task> {
    let mut out = tasks.to_vec();
    out.sort_by(|a, b| b.priority.cmp(&a.priority).then(b.id.cmp(&a.id)));
    out
}

fn publish(inner: &mut StoreInner) {
    let snapshot = ordered(&inner.tasks);
    inner
        .subscribers
        .retain(|tx| tx.send(snapshot.clone()).is_ok());
}
