//! Task Store - durable task records and per-category indexes
//!
//! Records are JSON files under a directory named after their category; each
//! category also keeps an index file listing its ids, oldest first.
//!
//! Reads favour availability: a missing or unparsable record or index is
//! treated as absent/empty and logged with `warn!`, never returned as an
//! error. Writes propagate their I/O errors.
//!
//! The CLI and the executor daemon are separate processes working on the
//! same directory, so every read-modify-write runs under `<data>/.lock`.

use crate::state::{Category, TaskStatus};
use crate::task::{NewTask, Task, TaskId};
use parking_lot::Mutex;
use relay_foundation::{Error, JsonStore, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Attempts at drawing an id that is not already on disk
const MAX_ID_ATTEMPTS: usize = 8;

/// Lock file shared by every process opening the data directory
const LOCK_FILE: &str = ".lock";

/// Error recorded for a task found in progress with no budget left
const EXHAUSTED_ERROR: &str = "Retry budget exhausted before the last attempt was recorded";

/// Outcome of spending one attempt of a task's retry budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back in the ready pool; `attempt` is the new `currentRetry`
    Retry { attempt: u32, max: u32 },
    /// Budget spent; the task is already in `failed`
    Exhausted { attempt: u32, max: u32 },
}

/// What [`TaskStore::reconcile`] repaired
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Record files that had no index entry
    pub added: usize,
    /// Index entries that had no record file
    pub dropped: usize,
    /// Ready records left behind by an interrupted move to a terminal category
    pub duplicates: usize,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.added == 0 && self.dropped == 0 && self.duplicates == 0
    }
}

/// Task counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub ready: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StoreStats {
    pub fn total(&self) -> usize {
        self.ready + self.in_progress + self.completed + self.failed
    }
}

/// Durable task storage rooted at one data directory
#[derive(Debug)]
pub struct TaskStore {
    files: JsonStore,

    /// Retry budget for submissions that don't carry one
    default_max_retries: u32,

    /// Serializes read-modify-writes within this process; `LOCK_FILE`
    /// covers other processes
    write_lock: Mutex<()>,
}

impl TaskStore {
    /// Open (and lay out) a store at `data_dir`
    pub fn open(data_dir: impl Into<PathBuf>, default_max_retries: u32) -> Result<Self> {
        let files = JsonStore::new(data_dir);
        for category in Category::ALL {
            files.ensure_dir(category.dir_name())?;
        }
        Ok(Self {
            files,
            default_max_retries: default_max_retries.max(1),
            write_lock: Mutex::new(()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        self.files.base_dir()
    }

    pub fn default_max_retries(&self) -> u32 {
        self.default_max_retries
    }

    /// Run `f` holding both the in-process mutex and the directory lock
    fn locked<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let _guard = self.write_lock.lock();
        self.files.with_lock(LOCK_FILE, f)
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Persist a new task in `ready` and append it to the ready index
    pub fn create(&self, new: NewTask) -> Result<Task> {
        new.validate()?;

        let task = self.locked(|| {
            let mut task = Task::from_new(new, self.default_max_retries);
            let mut attempts = 1;
            while self.exists_anywhere(&task.id) {
                if attempts >= MAX_ID_ATTEMPTS {
                    return Err(Error::Storage(format!(
                        "could not allocate a free task id after {} attempts",
                        attempts
                    )));
                }
                task.id = TaskId::at(task.created_at);
                attempts += 1;
            }

            self.write(&task, Category::Ready)?;
            let mut index = self.read_index(Category::Ready);
            index.push(task.id.clone());
            self.write_index(Category::Ready, &index)?;
            Ok(task)
        })?;

        info!("Created task {} ({})", task.id, task.priority);
        Ok(task)
    }

    fn exists_anywhere(&self, id: &TaskId) -> bool {
        Category::ALL
            .iter()
            .any(|category| self.files.exists(&category.record_file(id.as_str())))
    }

    /// Read a record from a known category; absent or corrupt reads as `None`
    pub fn read(&self, id: &TaskId, category: Category) -> Option<Task> {
        match self
            .files
            .load_optional::<Task>(&category.record_file(id.as_str()))
        {
            Ok(task) => task,
            Err(e) => {
                warn!("Treating unreadable task record {} as absent: {}", id, e);
                None
            }
        }
    }

    /// Look a task up in every category (ready, completed, failed)
    pub fn get(&self, id: &TaskId) -> Option<Task> {
        Category::ALL
            .iter()
            .find_map(|category| self.read(id, *category))
    }

    /// Atomically write a record into `category`
    pub fn write(&self, task: &Task, category: Category) -> Result<()> {
        self.files
            .save(&category.record_file(task.id.as_str()), task)
    }

    /// Remove a record file. The caller updates the index.
    pub fn delete(&self, id: &TaskId, category: Category) -> Result<()> {
        self.files.remove(&category.record_file(id.as_str()))
    }

    // ========================================================================
    // Indexes
    // ========================================================================

    /// Ids of a category, oldest first; missing or corrupt reads as empty
    pub fn read_index(&self, category: Category) -> Vec<TaskId> {
        match self.files.load_optional::<Vec<TaskId>>(category.index_file()) {
            Ok(index) => index.unwrap_or_default(),
            Err(e) => {
                warn!("Treating unreadable {} index as empty: {}", category, e);
                Vec::new()
            }
        }
    }

    fn write_index(&self, category: Category, ids: &[TaskId]) -> Result<()> {
        self.files.save(category.index_file(), &ids)
    }

    fn remove_from_index(&self, category: Category, id: &TaskId) -> Result<()> {
        let mut index = self.read_index(category);
        let before = index.len();
        index.retain(|entry| entry != id);
        if index.len() != before {
            self.write_index(category, &index)?;
        }
        Ok(())
    }

    // ========================================================================
    // Listings
    // ========================================================================

    fn list_by_status(&self, status: TaskStatus) -> Vec<Task> {
        self.read_index(Category::Ready)
            .iter()
            .filter_map(|id| self.read(id, Category::Ready))
            .filter(|task| task.status == status)
            .collect()
    }

    /// Tasks waiting to run, in index order
    pub fn list_ready(&self) -> Vec<Task> {
        self.list_by_status(TaskStatus::Ready)
    }

    /// Tasks currently dispatched
    pub fn list_in_progress(&self) -> Vec<Task> {
        self.list_by_status(TaskStatus::InProgress)
    }

    fn list_recent(&self, category: Category, limit: usize) -> Vec<Task> {
        let index = self.read_index(category);
        let start = index.len().saturating_sub(limit);
        index[start..]
            .iter()
            .rev()
            .filter_map(|id| self.read(id, category))
            .collect()
    }

    /// Last `limit` completed tasks, most recent first
    pub fn list_completed(&self, limit: usize) -> Vec<Task> {
        self.list_recent(Category::Completed, limit)
    }

    /// Last `limit` failed tasks, most recent first
    pub fn list_failed(&self, limit: usize) -> Vec<Task> {
        self.list_recent(Category::Failed, limit)
    }

    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats::default();
        for task in self
            .read_index(Category::Ready)
            .iter()
            .filter_map(|id| self.read(id, Category::Ready))
        {
            match task.status {
                TaskStatus::InProgress => stats.in_progress += 1,
                _ => stats.ready += 1,
            }
        }
        stats.completed = self.read_index(Category::Completed).len();
        stats.failed = self.read_index(Category::Failed).len();
        stats
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Rewrite a record under `to`, drop it from `from`, and move its id
    /// between the two indexes (appended at the end of `to`).
    ///
    /// Returns `None` when the record is not in `from`.
    pub fn move_category(
        &self,
        id: &TaskId,
        from: Category,
        to: Category,
        mutate: impl FnOnce(&mut Task),
    ) -> Result<Option<Task>> {
        self.locked(|| {
            let Some(mut task) = self.read(id, from) else {
                debug!("Task {} not found in {}, nothing to move", id, from);
                return Ok(None);
            };
            mutate(&mut task);
            self.relocate(&task, from, to)?;
            Ok(Some(task))
        })
    }

    /// Write `task` under `to`, then drop it from `from`. Caller holds the lock.
    ///
    /// The new record lands before the old one goes, so a crash in between
    /// leaves a duplicate that [`TaskStore::reconcile`] removes, never a loss.
    fn relocate(&self, task: &Task, from: Category, to: Category) -> Result<()> {
        self.write(task, to)?;
        if from != to {
            self.delete(&task.id, from)?;
            self.remove_from_index(from, &task.id)?;
            let mut index = self.read_index(to);
            if !index.contains(&task.id) {
                index.push(task.id.clone());
            }
            self.write_index(to, &index)?;
        }
        Ok(())
    }

    /// Read-modify-write a ready-category record; `apply` returning `false`
    /// leaves the record untouched.
    fn update_ready(
        &self,
        id: &TaskId,
        apply: impl FnOnce(&mut Task) -> bool,
    ) -> Result<Option<Task>> {
        self.locked(|| {
            let Some(mut task) = self.read(id, Category::Ready) else {
                return Ok(None);
            };
            if !apply(&mut task) {
                return Ok(None);
            }
            self.write(&task, Category::Ready)?;
            Ok(Some(task))
        })
    }

    /// `ready` → `inProgress`, stamping `startedAt`
    pub fn start(&self, id: &TaskId) -> Result<Option<Task>> {
        self.update_ready(id, |task| {
            if task.status != TaskStatus::Ready {
                debug!("Task {} is {}, not starting it", task.id, task.status);
                return false;
            }
            task.start();
            true
        })
    }

    /// Move to `completed`, keeping the full output
    pub fn complete(&self, id: &TaskId, output: impl Into<String>) -> Result<Option<Task>> {
        let output = output.into();
        self.move_category(id, Category::Ready, Category::Completed, |task| {
            task.complete(output)
        })
    }

    /// Move to `failed` with the given error text
    pub fn fail(&self, id: &TaskId, error: impl Into<String>) -> Result<Option<Task>> {
        let error = error.into();
        self.move_category(id, Category::Ready, Category::Failed, |task| {
            task.fail(error)
        })
    }

    /// Spend one attempt. A retry puts the task back to `ready`; an exhausted
    /// budget moves it to `failed` with `error` in the same locked step, so
    /// no spent task is ever left behind in the ready pool.
    pub fn record_failure(
        &self,
        id: &TaskId,
        error: impl Into<String>,
    ) -> Result<Option<RetryDecision>> {
        let error = error.into();
        self.locked(|| {
            let Some(mut task) = self.read(id, Category::Ready) else {
                return Ok(None);
            };
            if task.record_failure() {
                self.write(&task, Category::Ready)?;
                return Ok(Some(RetryDecision::Retry {
                    attempt: task.current_retry,
                    max: task.max_retries,
                }));
            }

            let decision = RetryDecision::Exhausted {
                attempt: task.current_retry,
                max: task.max_retries,
            };
            task.fail(error);
            self.relocate(&task, Category::Ready, Category::Failed)?;
            Ok(Some(decision))
        })
    }

    /// `inProgress` → `ready` without touching the retry counter
    pub fn requeue(&self, id: &TaskId) -> Result<Option<Task>> {
        self.update_ready(id, |task| {
            if task.status != TaskStatus::InProgress {
                return false;
            }
            task.requeue();
            true
        })
    }

    /// Remove a ready or in-progress task outright.
    ///
    /// Returns the removed record so the caller can tell whether a live
    /// process has to be killed. Terminal tasks cannot be cancelled.
    pub fn cancel(&self, id: &TaskId) -> Result<Option<Task>> {
        let removed = self.locked(|| {
            let Some(task) = self.read(id, Category::Ready) else {
                return Ok(None);
            };
            self.delete(id, Category::Ready)?;
            self.remove_from_index(Category::Ready, id)?;
            Ok(Some(task))
        })?;
        if let Some(task) = &removed {
            info!("Cancelled task {} ({})", id, task.status);
        }
        Ok(removed)
    }

    /// Reset every `inProgress` task to `ready`; used at startup when no
    /// process can still own them. Returns how many were requeued.
    ///
    /// An orphan whose budget is already spent goes to `failed` instead.
    pub fn recover_orphans(&self) -> Result<usize> {
        self.locked(|| {
            let mut recovered = 0;
            for id in self.read_index(Category::Ready) {
                let Some(mut task) = self.read(&id, Category::Ready) else {
                    continue;
                };
                if task.status != TaskStatus::InProgress {
                    continue;
                }
                if task.can_retry() {
                    task.requeue();
                    self.write(&task, Category::Ready)?;
                    recovered += 1;
                } else {
                    warn!(
                        "Task {} was left in progress with {} attempts spent, failing it",
                        id,
                        task.retry_label()
                    );
                    let error = task
                        .error
                        .clone()
                        .unwrap_or_else(|| EXHAUSTED_ERROR.to_string());
                    task.fail(error);
                    self.relocate(&task, Category::Ready, Category::Failed)?;
                }
            }
            if recovered > 0 {
                info!("Recovered {} orphan task(s)", recovered);
            }
            Ok(recovered)
        })
    }

    /// Bring indexes back in line with the record files on disk.
    ///
    /// The directory listing wins: unindexed records are appended (ids sort by
    /// creation time), entries without a record are dropped, and a ready
    /// record that also exists in a terminal category is removed.
    pub fn reconcile(&self) -> Result<ReconcileReport> {
        let report = self.locked(|| self.reconcile_locked())?;
        if !report.is_clean() {
            warn!(
                "Reconciled task indexes: {} added, {} dropped, {} duplicate(s) removed",
                report.added, report.dropped, report.duplicates
            );
        }
        Ok(report)
    }

    fn reconcile_locked(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let terminal: HashSet<String> = [Category::Completed, Category::Failed]
            .iter()
            .map(|category| self.files.list_stems(category.dir_name()))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();

        for category in Category::ALL {
            let mut on_disk = self.files.list_stems(category.dir_name())?;

            if category == Category::Ready {
                let before = on_disk.len();
                for stem in on_disk.iter().filter(|stem| terminal.contains(*stem)) {
                    self.delete(&TaskId::from(stem.as_str()), Category::Ready)?;
                }
                on_disk.retain(|stem| !terminal.contains(stem));
                report.duplicates += before - on_disk.len();
            }

            let present: HashSet<&str> = on_disk.iter().map(String::as_str).collect();
            let index = self.read_index(category);
            let mut seen = HashSet::new();
            let mut repaired: Vec<TaskId> = Vec::with_capacity(on_disk.len());

            for id in &index {
                if present.contains(id.as_str()) && seen.insert(id.as_str().to_string()) {
                    repaired.push(id.clone());
                } else {
                    report.dropped += 1;
                }
            }
            for stem in &on_disk {
                if !seen.contains(stem) {
                    repaired.push(TaskId::from(stem.as_str()));
                    report.added += 1;
                }
            }

            if repaired != index {
                self.write_index(category, &repaired)?;
            }
        }
        Ok(report)
    }

    /// Delete every record and empty every index
    pub fn reset(&self) -> Result<()> {
        self.locked(|| {
            for category in Category::ALL {
                for stem in self.files.list_stems(category.dir_name())? {
                    self.delete(&TaskId::from(stem), category)?;
                }
                self.write_index(category, &[])?;
            }
            Ok(())
        })?;
        info!("Reset task store at {}", self.data_dir().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Priority;

    fn open_store() -> (tempfile::TempDir, TaskStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::open(dir.path(), 15).unwrap();
        (dir, store)
    }

    #[test]
    fn test_create_and_read_back() {
        let (_dir, store) = open_store();
        let task = store
            .create(
                NewTask::new("refactor parser")
                    .with_priority(Priority::High)
                    .with_attachment("a.png"),
            )
            .unwrap();

        let read = store.read(&task.id, Category::Ready).unwrap();
        assert_eq!(read, task);
        assert_eq!(read.max_retries, 15);
        assert_eq!(store.read_index(Category::Ready), vec![task.id.clone()]);
    }

    #[test]
    fn test_create_rejects_empty_requirement() {
        let (_dir, store) = open_store();
        assert!(matches!(
            store.create(NewTask::new("")),
            Err(Error::InvalidInput(_))
        ));
        assert!(store.read_index(Category::Ready).is_empty());
    }

    #[test]
    fn test_corrupt_record_is_skipped() {
        let (dir, store) = open_store();
        let good = store.create(NewTask::new("good")).unwrap();
        let bad = store.create(NewTask::new("bad")).unwrap();
        std::fs::write(
            dir.path().join(Category::Ready.record_file(bad.id.as_str())),
            "{ not json",
        )
        .unwrap();

        let ready = store.list_ready();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, good.id);
        assert!(store.get(&bad.id).is_none());
    }

    #[test]
    fn test_corrupt_index_reads_empty() {
        let (dir, store) = open_store();
        std::fs::write(dir.path().join("completed.json"), "[oops").unwrap();
        assert!(store.list_completed(10).is_empty());
    }

    #[test]
    fn test_move_category_removes_from_old_listing() {
        let (_dir, store) = open_store();
        let task = store.create(NewTask::new("move me")).unwrap();

        let moved = store.complete(&task.id, "all good").unwrap().unwrap();
        assert_eq!(moved.status, TaskStatus::Completed);
        assert_eq!(moved.output.as_deref(), Some("all good"));

        assert!(store.read(&task.id, Category::Ready).is_none());
        assert!(store.list_ready().is_empty());
        assert!(!store.read_index(Category::Ready).contains(&task.id));

        let fetched = store.get(&task.id).unwrap();
        assert_eq!(fetched.id, task.id);
        assert_eq!(fetched.requirement, task.requirement);
        assert_eq!(store.list_completed(10)[0].id, task.id);
    }

    #[test]
    fn test_recent_listing_is_most_recent_first() {
        let (_dir, store) = open_store();
        let mut ids = Vec::new();
        for n in 0..4 {
            let task = store.create(NewTask::new(format!("task {}", n))).unwrap();
            store.fail(&task.id, "nope").unwrap();
            ids.push(task.id);
        }

        let failed: Vec<TaskId> = store.list_failed(3).into_iter().map(|t| t.id).collect();
        assert_eq!(failed, vec![ids[3].clone(), ids[2].clone(), ids[1].clone()]);
    }

    #[test]
    fn test_start_only_from_ready() {
        let (_dir, store) = open_store();
        let task = store.create(NewTask::new("run")).unwrap();

        let started = store.start(&task.id).unwrap().unwrap();
        assert_eq!(started.status, TaskStatus::InProgress);
        assert!(started.started_at.is_some());

        assert!(store.start(&task.id).unwrap().is_none());
        assert_eq!(store.list_in_progress().len(), 1);
        assert!(store.list_ready().is_empty());
    }

    #[test]
    fn test_record_failure_then_fail() {
        let (_dir, store) = open_store();
        let task = store
            .create(NewTask::new("flaky").with_max_retries(2))
            .unwrap();

        store.start(&task.id).unwrap();
        assert_eq!(
            store.record_failure(&task.id, "first").unwrap(),
            Some(RetryDecision::Retry { attempt: 1, max: 2 })
        );
        assert_eq!(store.list_ready()[0].current_retry, 1);

        store.start(&task.id).unwrap();
        assert_eq!(
            store.record_failure(&task.id, "gave up").unwrap(),
            Some(RetryDecision::Exhausted { attempt: 2, max: 2 })
        );

        // Exhaustion lands in `failed` without a separate step
        assert!(store.read(&task.id, Category::Ready).is_none());
        assert!(store.read_index(Category::Ready).is_empty());
        let failed = store.read(&task.id, Category::Failed).unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.current_retry, failed.max_retries);
        assert_eq!(failed.error.as_deref(), Some("gave up"));
        assert_eq!(store.read_index(Category::Failed), vec![task.id.clone()]);
    }

    #[test]
    fn test_fail_moves_with_error() {
        let (_dir, store) = open_store();
        let task = store.create(NewTask::new("doomed")).unwrap();
        let failed = store.fail(&task.id, "boom").unwrap().unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert!(store.fail(&task.id, "again").unwrap().is_none());
    }

    #[test]
    fn test_cancel_removes_record_and_index_entry() {
        let (_dir, store) = open_store();
        let task = store.create(NewTask::new("never mind")).unwrap();

        let removed = store.cancel(&task.id).unwrap().unwrap();
        assert_eq!(removed.id, task.id);
        assert!(store.get(&task.id).is_none());
        assert!(store.read_index(Category::Ready).is_empty());
        assert!(store.cancel(&task.id).unwrap().is_none());
    }

    #[test]
    fn test_cancel_ignores_terminal_tasks() {
        let (_dir, store) = open_store();
        let task = store.create(NewTask::new("done")).unwrap();
        store.complete(&task.id, "ok").unwrap();
        assert!(store.cancel(&task.id).unwrap().is_none());
        assert!(store.get(&task.id).is_some());
    }

    #[test]
    fn test_recover_orphans_keeps_retry_counter() {
        let (_dir, store) = open_store();
        let task = store.create(NewTask::new("orphan")).unwrap();
        store.start(&task.id).unwrap();
        store.record_failure(&task.id, "first").unwrap();
        store.start(&task.id).unwrap();

        // Simulated restart: a fresh store over the same directory
        let reopened = TaskStore::open(store.data_dir(), 15).unwrap();
        assert_eq!(reopened.recover_orphans().unwrap(), 1);

        let recovered = reopened.get(&task.id).unwrap();
        assert_eq!(recovered.status, TaskStatus::Ready);
        assert_eq!(recovered.current_retry, 1);
        assert_eq!(reopened.recover_orphans().unwrap(), 0);
    }

    #[test]
    fn test_recover_orphans_fails_spent_tasks() {
        let (dir, store) = open_store();
        let task = store
            .create(NewTask::new("spent").with_max_retries(1))
            .unwrap();
        store.start(&task.id).unwrap();

        // Record left in progress with the counter already at the cap, as a
        // crash mid-transition in an older layout could leave it
        let mut stuck = store.read(&task.id, Category::Ready).unwrap();
        stuck.current_retry = 1;
        store.write(&stuck, Category::Ready).unwrap();

        let reopened = TaskStore::open(dir.path(), 15).unwrap();
        assert_eq!(reopened.recover_orphans().unwrap(), 0);

        assert!(reopened.list_ready().is_empty());
        assert!(reopened.read_index(Category::Ready).is_empty());
        let failed = reopened.get(&task.id).unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.current_retry, 1);
        assert_eq!(failed.error.as_deref(), Some(EXHAUSTED_ERROR));
        assert_eq!(reopened.list_failed(10)[0].id, task.id);
    }

    #[test]
    fn test_exhausted_task_stays_failed_across_restart() {
        let (dir, store) = open_store();
        let task = store
            .create(NewTask::new("one shot").with_max_retries(1))
            .unwrap();
        store.start(&task.id).unwrap();
        assert_eq!(
            store.record_failure(&task.id, "Error: nope").unwrap(),
            Some(RetryDecision::Exhausted { attempt: 1, max: 1 })
        );

        // Daemon dies right after recording the failure
        let reopened = TaskStore::open(dir.path(), 15).unwrap();
        assert!(reopened.reconcile().unwrap().is_clean());
        assert_eq!(reopened.recover_orphans().unwrap(), 0);
        assert!(reopened.list_ready().is_empty());
        assert_eq!(reopened.get(&task.id).unwrap().status, TaskStatus::Failed);
    }

    #[test]
    fn test_reconcile_repairs_drift() {
        let (dir, store) = open_store();
        let kept = store.create(NewTask::new("kept")).unwrap();
        let lost = store.create(NewTask::new("lost record")).unwrap();
        let done = store.create(NewTask::new("done")).unwrap();

        // Record file vanished, index still lists it
        std::fs::remove_file(dir.path().join(Category::Ready.record_file(lost.id.as_str()))).unwrap();

        // Crash between writing the completed record and updating indexes
        let mut completed = done.clone();
        completed.complete("ok");
        store.write(&completed, Category::Completed).unwrap();

        let report = store.reconcile().unwrap();
        assert_eq!(report.dropped, 2);
        assert_eq!(report.added, 1);
        assert_eq!(report.duplicates, 1);

        assert_eq!(store.read_index(Category::Ready), vec![kept.id.clone()]);
        assert_eq!(store.read_index(Category::Completed), vec![done.id.clone()]);
        assert!(store.read(&done.id, Category::Ready).is_none());
        assert!(store.reconcile().unwrap().is_clean());
    }

    #[test]
    fn test_reset_and_stats() {
        let (_dir, store) = open_store();
        let a = store.create(NewTask::new("a")).unwrap();
        let b = store.create(NewTask::new("b")).unwrap();
        store.create(NewTask::new("c")).unwrap();
        store.start(&a.id).unwrap();
        store.complete(&b.id, "").unwrap();

        assert_eq!(
            store.stats(),
            StoreStats {
                ready: 1,
                in_progress: 1,
                completed: 1,
                failed: 0
            }
        );

        store.reset().unwrap();
        assert_eq!(store.stats().total(), 0);
        assert!(store.get(&a.id).is_none());
    }
}
