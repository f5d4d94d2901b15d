//! Executor - the scheduling loop
//!
//! On every tick the executor works out spare capacity, asks the queue for
//! that many tasks, marks them in progress and runs each on its own tokio
//! task. When a run ends it drives the store transition (complete, retry or
//! fail) and tells the notifier.
//!
//! `tick()` is public and never waits for runs to finish; the interval loop
//! started by [`Executor::start`] only calls it.
//!
//! Store operations touch the filesystem and may wait on the directory lock
//! held by another process, so they run on tokio's blocking pool.

use crate::notify::{LifecycleEvent, Notifier};
use crate::output::OutputRegistry;
use crate::queue::select_next;
use crate::runner::{
    ClaudeCommand, KillReason, ProcessRegistry, ProcessRun, ProcessRunner, RunOutcome,
    RunningProcess, DEFAULT_KILL_GRACE,
};
use crate::state::Category;
use crate::store::{ReconcileReport, RetryDecision, TaskStore};
use crate::task::{Task, TaskId};
use parking_lot::Mutex;
use relay_foundation::{Error, RelayConfig, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long `stop()` waits for interrupted runs to settle
const SHUTDOWN_WAIT: Duration = Duration::from_secs(15);

/// Executor settings
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Run several tasks at once; otherwise strictly one at a time
    pub parallel: bool,

    /// Upper bound on in-progress tasks in parallel mode
    pub max_parallel: usize,

    pub task_timeout: Duration,

    /// Tick period of the loop
    pub poll_interval: Duration,

    /// Pause between two dispatches of one tick
    pub dispatch_delay: Duration,

    /// Time a killed process gets before it is force-killed
    pub kill_grace: Duration,

    pub command: ClaudeCommand,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from_relay(&RelayConfig::with_defaults())
    }
}

impl ExecutorConfig {
    pub fn from_relay(config: &RelayConfig) -> Self {
        Self {
            parallel: config.parallel_execution(),
            max_parallel: config.max_parallel(),
            task_timeout: config.task_timeout(),
            poll_interval: config.poll_interval(),
            dispatch_delay: config.dispatch_delay(),
            kill_grace: DEFAULT_KILL_GRACE,
            command: ClaudeCommand::resolve(config.claude_command()),
        }
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.command = self.command.with_work_dir(dir);
        self
    }

    /// How many tasks may be dispatched given `in_progress` running ones
    pub fn capacity(&self, in_progress: usize) -> usize {
        if self.parallel {
            self.max_parallel.max(1).saturating_sub(in_progress)
        } else if in_progress == 0 {
            1
        } else {
            0
        }
    }
}

/// A run started by [`Executor::tick`]
#[derive(Debug)]
pub struct DispatchedTask {
    pub task_id: TaskId,
    handle: JoinHandle<RunOutcome>,
}

impl DispatchedTask {
    /// Wait for the run and its store transition to finish
    pub async fn join(self) -> Result<RunOutcome> {
        self.handle
            .await
            .map_err(|e| Error::Internal(format!("run of task {} panicked: {}", self.task_id, e)))
    }
}

/// Counts a run as active until dropped
struct ActiveRun {
    active: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl ActiveRun {
    fn new(active: &Arc<AtomicUsize>, idle: &Arc<Notify>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self {
            active: Arc::clone(active),
            idle: Arc::clone(idle),
        }
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

pub struct Executor {
    store: Arc<TaskStore>,
    notifier: Arc<dyn Notifier>,
    process: ProcessRun,
    processes: ProcessRegistry,
    output: OutputRegistry,
    config: ExecutorConfig,

    /// Cleared by `stop()`; a stopped executor dispatches nothing
    accepting: AtomicBool,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    /// Ends the tick loop between two ticks
    shutdown: Notify,
    active: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl Executor {
    pub fn new(
        store: Arc<TaskStore>,
        runner: Arc<dyn ProcessRunner>,
        notifier: Arc<dyn Notifier>,
        config: ExecutorConfig,
    ) -> Self {
        let processes = ProcessRegistry::new();
        let output = OutputRegistry::new();
        let process = ProcessRun::new(
            runner,
            processes.clone(),
            output.clone(),
            config.task_timeout,
        )
        .with_kill_grace(config.kill_grace);

        Self {
            store,
            notifier,
            process,
            processes,
            output,
            config,
            accepting: AtomicBool::new(true),
            loop_handle: Mutex::new(None),
            shutdown: Notify::new(),
            active: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Repair indexes and requeue orphans. Only safe before any run starts.
    pub fn recover(&self) -> Result<(ReconcileReport, usize)> {
        let report = self.store.reconcile()?;
        let orphans = self.store.recover_orphans()?;
        Ok((report, orphans))
    }

    /// Run a store operation on the blocking pool
    async fn with_store<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&TaskStore) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| Error::Internal(format!("store operation panicked: {}", e)))?
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Dispatch as many ready tasks as capacity allows
    pub async fn tick(self: &Arc<Self>) -> Vec<DispatchedTask> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Vec::new();
        }
        self.reap_cancelled().await;

        let snapshot = self
            .with_store(|store| Ok((store.list_in_progress().len(), store.list_ready())))
            .await;
        let (in_progress, ready) = match snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Failed to read the task queue: {}", e);
                return Vec::new();
            }
        };
        let capacity = self.config.capacity(in_progress);
        if capacity == 0 {
            debug!("No capacity ({} in progress)", in_progress);
            return Vec::new();
        }

        let selected = select_next(ready, capacity);
        let mut dispatched = Vec::with_capacity(selected.len());
        for (n, task) in selected.into_iter().enumerate() {
            if n > 0 && !self.config.dispatch_delay.is_zero() {
                tokio::time::sleep(self.config.dispatch_delay).await;
            }
            if !self.accepting.load(Ordering::SeqCst) {
                break;
            }
            match self.dispatch(&task.id).await {
                Ok(Some(run)) => dispatched.push(run),
                Ok(None) => debug!("Task {} left the ready pool before dispatch", task.id),
                Err(e) => error!("Failed to dispatch task {}: {}", task.id, e),
            }
        }
        dispatched
    }

    /// Kill live processes whose record was removed behind our back
    async fn reap_cancelled(&self) {
        let live = self.processes.task_ids().await;
        if live.is_empty() {
            return;
        }
        let removed = self
            .with_store(move |store| {
                Ok(live
                    .into_iter()
                    .filter(|id| store.read(id, Category::Ready).is_none())
                    .collect::<Vec<_>>())
            })
            .await;
        let removed = match removed {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Failed to check running tasks against the store: {}", e);
                return;
            }
        };
        for id in removed {
            if self.processes.kill(&id, KillReason::Cancelled).await {
                info!("Task {} was removed while running, killed its process", id);
            }
        }
    }

    async fn dispatch(self: &Arc<Self>, id: &TaskId) -> Result<Option<DispatchedTask>> {
        let start_id = id.clone();
        let Some(task) = self.with_store(move |store| store.start(&start_id)).await? else {
            return Ok(None);
        };
        let kill_rx = self.processes.register(&task.id, None).await;
        let guard = ActiveRun::new(&self.active, &self.idle);

        info!(
            "Dispatching task {} (attempt {}, {})",
            task.id,
            task.current_retry + 1,
            task.priority
        );
        self.notifier
            .notify(LifecycleEvent::Starting {
                task_id: task.id.clone(),
            })
            .await;

        let this = Arc::clone(self);
        let task_id = task.id.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            let spec = this.config.command.spec_for(&task);
            let outcome = this.process.run(&task.id, &spec, kill_rx).await;
            this.settle(&task, &outcome).await;
            outcome
        });

        Ok(Some(DispatchedTask { task_id, handle }))
    }

    /// Drive the store transition for a finished attempt
    async fn settle(&self, task: &Task, outcome: &RunOutcome) {
        if let Err(e) = self.apply_outcome(task, outcome).await {
            error!("Failed to record {} of task {}: {}", outcome.label(), task.id, e);
        }
    }

    async fn apply_outcome(&self, task: &Task, outcome: &RunOutcome) -> Result<()> {
        let id = &task.id;
        match outcome {
            RunOutcome::Success { output } => {
                let (store_id, output) = (id.clone(), output.clone());
                let completed = self
                    .with_store(move |store| store.complete(&store_id, output))
                    .await?;
                if completed.is_some() {
                    info!("Task {} completed", id);
                    self.notifier
                        .notify(LifecycleEvent::Completed { task_id: id.clone() })
                        .await;
                } else {
                    debug!("Task {} finished but its record is gone", id);
                }
            }
            RunOutcome::Failure { .. } | RunOutcome::TimedOut { .. } => {
                if matches!(outcome, RunOutcome::TimedOut { .. }) {
                    self.notifier
                        .notify(LifecycleEvent::Timeout { task_id: id.clone() })
                        .await;
                }
                let (store_id, error) = (id.clone(), outcome.error_text().unwrap_or_default());
                let decision = self
                    .with_store(move |store| store.record_failure(&store_id, error))
                    .await?;
                match decision {
                    Some(RetryDecision::Retry { attempt, max }) => {
                        info!("Task {} failed, retrying ({}/{})", id, attempt, max);
                        self.notifier
                            .notify(LifecycleEvent::Retrying {
                                task_id: id.clone(),
                                attempt,
                                max,
                            })
                            .await;
                    }
                    Some(RetryDecision::Exhausted { attempt, max }) => {
                        warn!("Task {} failed after {}/{} attempts", id, attempt, max);
                        self.notifier
                            .notify(LifecycleEvent::Failed { task_id: id.clone() })
                            .await;
                    }
                    None => debug!("Task {} failed but its record is gone", id),
                }
            }
            RunOutcome::Cancelled => info!("Task {} cancelled", id),
            RunOutcome::Interrupted => {
                let store_id = id.clone();
                if self
                    .with_store(move |store| store.requeue(&store_id))
                    .await?
                    .is_some()
                {
                    info!("Task {} interrupted, back in the ready pool", id);
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Loop control
    // ========================================================================

    /// Start the tick loop; a second call is a no-op
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.loop_handle.lock();
        if slot.is_some() {
            warn!("Executor already running");
            return;
        }
        self.accepting.store(true, Ordering::SeqCst);

        let this = Arc::clone(self);
        let period = self.config.poll_interval;
        *slot = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = this.shutdown.notified() => break,
                    _ = interval.tick() => {}
                }
                // Runs are detached; their handles are not needed here
                let _ = this.tick().await;
            }
        }));
        info!(
            "Executor started ({}, every {:.1}s)",
            if self.config.parallel {
                format!("up to {} in parallel", self.config.max_parallel)
            } else {
                "serial".to_string()
            },
            period.as_secs_f64()
        );
    }

    /// Stop dispatching, kill every live process and wait for the
    /// interrupted runs to put their tasks back. Returns how many were killed.
    ///
    /// A tick in flight is allowed to finish first, so every task it marked
    /// in progress has a registered run that the kill below reaches.
    pub async fn stop(&self) -> usize {
        self.accepting.store(false, Ordering::SeqCst);
        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle {
            self.shutdown.notify_one();
            if let Err(e) = handle.await {
                warn!("Executor loop ended abnormally: {}", e);
            }
        }

        let killed = self.processes.kill_all(KillReason::Shutdown).await;
        if tokio::time::timeout(SHUTDOWN_WAIT, self.wait_idle())
            .await
            .is_err()
        {
            warn!(
                "{} run(s) still settling after {:.0}s",
                self.active.load(Ordering::SeqCst),
                SHUTDOWN_WAIT.as_secs_f64()
            );
        }
        info!("Executor stopped ({} process(es) killed)", killed);
        killed
    }

    /// Resolve once no run is active
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.loop_handle.lock().is_some() && self.accepting.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Queries and control
    // ========================================================================

    /// Remove a ready or in-progress task, killing its process if live.
    /// Returns whether anything was cancelled.
    pub async fn cancel(&self, id: &TaskId) -> Result<bool> {
        let store_id = id.clone();
        let removed = self.with_store(move |store| store.cancel(&store_id)).await?;
        let killed = self.processes.kill(id, KillReason::Cancelled).await;
        if killed {
            info!("Killed process of cancelled task {}", id);
        }
        Ok(removed.is_some() || killed)
    }

    /// Up to 20 recent non-blank output lines of a running task
    pub async fn recent_output(&self, id: &TaskId) -> Vec<String> {
        self.output.recent(id).await
    }

    pub async fn running_tasks(&self) -> Vec<RunningProcess> {
        self.processes.running().await
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .field("active", &self.active.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
