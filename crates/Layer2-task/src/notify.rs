//! Lifecycle notifications
//!
//! The executor reports every dispatch and terminal transition through a
//! [`Notifier`]. Delivery is one-way: a notifier cannot fail the task.

use crate::task::TaskId;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// A task lifecycle notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Dispatched to a process
    Starting { task_id: TaskId },

    /// Attempt failed, back in the pool; `attempt` is the new retry counter
    Retrying {
        task_id: TaskId,
        attempt: u32,
        max: u32,
    },

    Completed { task_id: TaskId },

    /// Retry budget exhausted
    Failed { task_id: TaskId },

    /// The attempt hit the task timeout; a `Retrying` or `Failed` follows
    Timeout { task_id: TaskId },
}

impl LifecycleEvent {
    pub fn task_id(&self) -> &TaskId {
        match self {
            LifecycleEvent::Starting { task_id }
            | LifecycleEvent::Retrying { task_id, .. }
            | LifecycleEvent::Completed { task_id }
            | LifecycleEvent::Failed { task_id }
            | LifecycleEvent::Timeout { task_id } => task_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::Starting { .. } => "starting",
            LifecycleEvent::Retrying { .. } => "retrying",
            LifecycleEvent::Completed { .. } => "completed",
            LifecycleEvent::Failed { .. } => "failed",
            LifecycleEvent::Timeout { .. } => "timeout",
        }
    }
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleEvent::Starting { task_id } => write!(f, "Starting task {}", task_id),
            LifecycleEvent::Retrying {
                task_id,
                attempt,
                max,
            } => write!(f, "Retrying task {} ({}/{})", task_id, attempt, max),
            LifecycleEvent::Completed { task_id } => write!(f, "Task {} completed", task_id),
            LifecycleEvent::Failed { task_id } => write!(f, "Task {} failed", task_id),
            LifecycleEvent::Timeout { task_id } => write!(f, "Task {} timed out", task_id),
        }
    }
}

/// Receives lifecycle notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: LifecycleEvent);
}

/// Writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Failed { .. } | LifecycleEvent::Timeout { .. } => warn!("{}", event),
            _ => info!("{}", event),
        }
    }
}

/// Forwards notifications to an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, event: LifecycleEvent) {
        // Nobody listening is not an error
        let _ = self.tx.send(event);
    }
}
