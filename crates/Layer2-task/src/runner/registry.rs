//! Live process registry
//!
//! Each run registers its pid and a one-shot kill channel. Killing goes
//! through the channel, so the run that owns the process handle does the
//! actual termination and nobody else needs access to it.

use crate::task::TaskId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tracing::debug;

/// Why a run is being stopped from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillReason {
    /// The task was cancelled and its record removed
    Cancelled,
    /// The executor is shutting down
    Shutdown,
}

/// A process visible to status queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningProcess {
    pub task_id: TaskId,
    pub pid: Option<u32>,
}

struct Entry {
    pid: Option<u32>,
    kill_tx: oneshot::Sender<KillReason>,
}

#[derive(Clone, Default)]
pub struct ProcessRegistry {
    entries: Arc<RwLock<HashMap<TaskId, Entry>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live process; the returned receiver fires when it must die
    pub async fn register(&self, id: &TaskId, pid: Option<u32>) -> oneshot::Receiver<KillReason> {
        let (kill_tx, kill_rx) = oneshot::channel();
        self.entries
            .write()
            .await
            .insert(id.clone(), Entry { pid, kill_tx });
        kill_rx
    }

    /// Record the pid once the process is up
    pub async fn set_pid(&self, id: &TaskId, pid: Option<u32>) {
        if let Some(entry) = self.entries.write().await.get_mut(id) {
            entry.pid = pid;
        }
    }

    pub async fn unregister(&self, id: &TaskId) {
        self.entries.write().await.remove(id);
    }

    /// Ask the run of `id` to kill its process. Returns whether one was live.
    pub async fn kill(&self, id: &TaskId, reason: KillReason) -> bool {
        let Some(entry) = self.entries.write().await.remove(id) else {
            return false;
        };
        debug!("Killing process of task {} ({:?})", id, reason);
        // The run may have finished in the meantime; that is fine
        let _ = entry.kill_tx.send(reason);
        true
    }

    /// Kill every live process; returns how many were signalled
    pub async fn kill_all(&self, reason: KillReason) -> usize {
        let drained: Vec<(TaskId, Entry)> = self.entries.write().await.drain().collect();
        let count = drained.len();
        for (id, entry) in drained {
            debug!("Killing process of task {} ({:?})", id, reason);
            let _ = entry.kill_tx.send(reason);
        }
        count
    }

    pub async fn task_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.entries.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot of live processes, ordered by task id
    pub async fn running(&self) -> Vec<RunningProcess> {
        let mut running: Vec<RunningProcess> = self
            .entries
            .read()
            .await
            .iter()
            .map(|(id, entry)| RunningProcess {
                task_id: id.clone(),
                pid: entry.pid,
            })
            .collect();
        running.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        running
    }
}

impl std::fmt::Debug for ProcessRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRegistry").finish_non_exhaustive()
    }
}
