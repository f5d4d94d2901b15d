//! # relay-task
//!
//! Durable task queue and executor for Relay.
//! Tasks are persisted as JSON records, picked by priority, and handed to an
//! external coding CLI (`claude`) one at a time or with bounded parallelism.
//!
//! ## Components
//!
//! - `store` - task records and per-category indexes on disk
//! - `queue` - which ready tasks run next
//! - `runner` - spawning the CLI, output capture, timeout, kill, outcome
//! - `executor` - the tick loop and the retry/fail policy
//! - `notify` - lifecycle notifications
//! - `manager` - the facade collaborators use

pub mod executor;
pub mod manager;
pub mod notify;
pub mod output;
pub mod queue;
pub mod runner;
pub mod state;
pub mod store;
pub mod task;

// Task model
pub use state::{Category, TaskStatus};
pub use task::{Complexity, NewTask, Priority, Task, TaskId};

// Storage and selection
pub use queue::select_next;
pub use store::{ReconcileReport, RetryDecision, StoreStats, TaskStore};

// Execution
pub use executor::{DispatchedTask, Executor, ExecutorConfig};
pub use output::{OutputBuffer, OutputRegistry, OutputStream, RECENT_OUTPUT_LINES};
pub use runner::{
    ClaudeCommand, CommandSpec, KillReason, LocalRunner, ProcessHandle, ProcessRegistry,
    ProcessRunner, RunOutcome, RunningProcess,
};

// Collaborator surface
pub use manager::{ManagerStats, TaskManager, DEFAULT_LIST_LIMIT};
pub use notify::{ChannelNotifier, LifecycleEvent, Notifier, TracingNotifier};
