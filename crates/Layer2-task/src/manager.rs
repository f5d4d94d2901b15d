//! Task Manager - the surface collaborators talk to
//!
//! Wraps the store and the executor: task submission, listings, lookups,
//! cancellation and live output snapshots.

use crate::executor::{Executor, ExecutorConfig};
use crate::notify::Notifier;
use crate::runner::{ProcessRunner, RunningProcess};
use crate::store::{StoreStats, TaskStore};
use crate::task::{NewTask, Task, TaskId};
use relay_foundation::{RelayConfig, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Default number of entries for completed/failed listings
pub const DEFAULT_LIST_LIMIT: usize = 10;

/// Status summary for collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerStats {
    pub store: StoreStats,
    /// Live processes right now
    pub running: usize,
    pub executor_running: bool,
}

#[derive(Clone)]
pub struct TaskManager {
    store: Arc<TaskStore>,
    executor: Arc<Executor>,
}

impl TaskManager {
    pub fn new(executor: Arc<Executor>) -> Self {
        Self {
            store: Arc::clone(executor.store()),
            executor,
        }
    }

    /// Open the store at `data_dir` and build an executor over it
    pub fn open(
        data_dir: impl Into<PathBuf>,
        config: &RelayConfig,
        runner: Arc<dyn ProcessRunner>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let store = Arc::new(TaskStore::open(data_dir, config.default_max_retries())?);
        let executor = Arc::new(Executor::new(
            store,
            runner,
            notifier,
            ExecutorConfig::from_relay(config),
        ));
        Ok(Self::new(executor))
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Persist a new task; the next tick may pick it up
    pub fn create_task(&self, new: NewTask) -> Result<Task> {
        self.store.create(new)
    }

    pub fn list_ready(&self) -> Vec<Task> {
        self.store.list_ready()
    }

    pub fn list_in_progress(&self) -> Vec<Task> {
        self.store.list_in_progress()
    }

    pub fn list_completed(&self, limit: usize) -> Vec<Task> {
        self.store.list_completed(limit)
    }

    pub fn list_failed(&self, limit: usize) -> Vec<Task> {
        self.store.list_failed(limit)
    }

    /// `None` for unknown ids and for strings that are not task ids
    pub fn get_by_id(&self, id: &str) -> Option<Task> {
        let id = TaskId::parse(id).ok()?;
        self.store.get(&id)
    }

    /// Cancel a ready or in-progress task. `false` when there was nothing to
    /// cancel (unknown id or already terminal); a malformed id is an error.
    pub async fn cancel(&self, id: &str) -> Result<bool> {
        self.executor.cancel(&TaskId::parse(id)?).await
    }

    pub async fn recent_output(&self, id: &str) -> Vec<String> {
        match TaskId::parse(id) {
            Ok(id) => self.executor.recent_output(&id).await,
            Err(_) => Vec::new(),
        }
    }

    pub async fn running_tasks(&self) -> Vec<RunningProcess> {
        self.executor.running_tasks().await
    }

    pub async fn stats(&self) -> ManagerStats {
        ManagerStats {
            store: self.store.stats(),
            running: self.executor.running_tasks().await.len(),
            executor_running: self.executor.is_running(),
        }
    }

    /// Cancel whatever is running, then wipe every record and index
    pub async fn reset(&self) -> Result<()> {
        for process in self.executor.running_tasks().await {
            self.executor.cancel(&process.task_id).await?;
        }
        self.store.reset()?;
        info!("All tasks removed");
        Ok(())
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("data_dir", &self.store.data_dir())
            .finish_non_exhaustive()
    }
}
