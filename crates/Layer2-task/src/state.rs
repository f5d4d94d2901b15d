//! Task state machine

use serde::{Deserialize, Serialize};

/// Lifecycle status of a task
///
/// ```text
/// Ready ──dispatch──▶ InProgress ──success──▶ Completed
///   ▲                     │
///   └──── retry ──────────┤
///                         └──exhausted──▶ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    /// Waiting in the selection pool
    Ready,

    /// Dispatched; an external process owns the work
    InProgress,

    /// Finished successfully
    Completed,

    /// Retry budget exhausted
    Failed,
}

impl TaskStatus {
    pub fn display_name(&self) -> &'static str {
        match self {
            TaskStatus::Ready => "Ready",
            TaskStatus::InProgress => "In progress",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
        }
    }

    /// Get a symbol for the status (for terminal listings)
    pub fn symbol(&self) -> &'static str {
        match self {
            TaskStatus::Ready => "◯",
            TaskStatus::InProgress => "⟳",
            TaskStatus::Completed => "✓",
            TaskStatus::Failed => "✗",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// On-disk bucket a record lives in.
///
/// `InProgress` is a status, not a category: running tasks stay in `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Ready,
    Completed,
    Failed,
}

impl Category {
    /// All categories in lookup order
    pub const ALL: [Category; 3] = [Category::Ready, Category::Completed, Category::Failed];

    /// Directory holding the record files
    pub fn dir_name(&self) -> &'static str {
        match self {
            Category::Ready => "ready",
            Category::Completed => "completed",
            Category::Failed => "failed",
        }
    }

    /// Index file listing the ids of this category, oldest first
    pub fn index_file(&self) -> &'static str {
        match self {
            Category::Ready => "ready.json",
            Category::Completed => "completed.json",
            Category::Failed => "failed.json",
        }
    }

    /// Relative path of a record
    pub fn record_file(&self, id: &str) -> String {
        format!("{}/{}.json", self.dir_name(), id)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}
