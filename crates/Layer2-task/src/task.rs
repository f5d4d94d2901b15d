//! Task definition and types

use crate::state::TaskStatus;
use chrono::{DateTime, Utc};
use rand::Rng;
use relay_foundation::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const ID_SUFFIX_LEN: usize = 3;
const ID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Unique identifier for a task: `YYYYMMDD-HHMMSS-XYZ`.
///
/// UTC creation time plus a random base-36 suffix, so ids sort by creation
/// time and stay readable in listings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate an id for a task created at `time`
    pub fn at(time: DateTime<Utc>) -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..ID_SUFFIX_LEN)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect();
        Self(format!("{}-{}", time.format("%Y%m%d-%H%M%S"), suffix))
    }

    /// Parse an id typed by a user, rejecting anything not shaped like
    /// `YYYYMMDD-HHMMSS-XYZ`. Ids end up in file names, so this runs before
    /// any path is built from outside input.
    pub fn parse(s: &str) -> Result<Self> {
        let bytes = s.as_bytes();
        let shaped = bytes.len() == 19
            && bytes[8] == b'-'
            && bytes[15] == b'-'
            && bytes[..8].iter().all(u8::is_ascii_digit)
            && bytes[9..15].iter().all(u8::is_ascii_digit)
            && bytes[16..].iter().all(|b| ID_ALPHABET.contains(b));
        if shaped {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::InvalidInput(format!(
                "'{}' is not a task id (expected YYYYMMDD-HHMMSS-XYZ)",
                s
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}


/// Urgency of a task, stored as its number (higher = more urgent)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    Low = 1,
    Normal = 2,
    High = 3,
    Urgent = 4,
}

impl Priority {
    pub fn label(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Normal => "Normal",
            Priority::High => "High",
            Priority::Urgent => "Urgent",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority as u8
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Priority::Low),
            2 => Ok(Priority::Normal),
            3 => Ok(Priority::High),
            4 => Ok(Priority::Urgent),
            other => Err(format!("invalid priority {} (expected 1-4)", other)),
        }
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "1" => Ok(Priority::Low),
            "normal" | "2" => Ok(Priority::Normal),
            "high" | "3" => Ok(Priority::High),
            "urgent" | "4" => Ok(Priority::Urgent),
            other => Err(Error::InvalidInput(format!("unknown priority '{}'", other))),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// How involved a task is; complex tasks with criteria run in plan mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    #[default]
    Simple,
    Complex,
}

impl FromStr for Complexity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(Complexity::Simple),
            "complex" => Ok(Complexity::Complex),
            other => Err(Error::InvalidInput(format!("unknown complexity '{}'", other))),
        }
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Complexity::Simple => f.write_str("simple"),
            Complexity::Complex => f.write_str("complex"),
        }
    }
}

/// What a collaborator submits; the store fills in the rest
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub requirement: String,
    pub completion_criteria: Option<String>,
    pub priority: Priority,
    pub complexity: Complexity,
    /// `None` takes the configured default
    pub max_retries: Option<u32>,
    pub attachments: Vec<String>,
}

impl NewTask {
    pub fn new(requirement: impl Into<String>) -> Self {
        Self {
            requirement: requirement.into(),
            ..Default::default()
        }
    }

    pub fn with_criteria(mut self, criteria: impl Into<String>) -> Self {
        self.completion_criteria = Some(criteria.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_attachment(mut self, attachment: impl Into<String>) -> Self {
        self.attachments.push(attachment.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.requirement.trim().is_empty() {
            return Err(Error::InvalidInput("requirement must not be empty".into()));
        }
        Ok(())
    }
}

/// A persisted task record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,

    /// What the external tool is asked to do
    pub requirement: String,

    /// Success condition; switches the prompt to explicit markers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_criteria: Option<String>,

    pub max_retries: u32,

    pub current_retry: u32,

    pub priority: Priority,

    #[serde(default)]
    pub complexity: Complexity,

    pub status: TaskStatus,

    #[serde(default)]
    pub attachments: Vec<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,

    /// Captured output of the successful run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Tail of the output (or the failure text) of the last failed run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    /// Build a fresh `ready` task from a submission
    pub fn from_new(new: NewTask, default_max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::at(now),
            requirement: new.requirement,
            completion_criteria: new
                .completion_criteria
                .filter(|criteria| !criteria.trim().is_empty()),
            max_retries: new.max_retries.unwrap_or(default_max_retries).max(1),
            current_retry: 0,
            priority: new.priority,
            complexity: new.complexity,
            status: TaskStatus::Ready,
            attachments: new.attachments,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            failed_at: None,
            output: None,
            error: None,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Mark task as dispatched
    pub fn start(&mut self) {
        self.status = TaskStatus::InProgress;
        self.started_at = Some(Utc::now());
        self.touch();
    }

    /// Mark task as completed successfully
    pub fn complete(&mut self, output: impl Into<String>) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.output = Some(output.into());
        self.touch();
    }

    /// Mark task as failed for good
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.failed_at = Some(Utc::now());
        self.error = Some(error.into());
        self.touch();
    }

    /// Consume one attempt of the retry budget.
    ///
    /// Returns `true` when the task goes back to `ready`. When the budget is
    /// spent the counter equals `max_retries` and the status is left for
    /// [`Task::fail`].
    pub fn record_failure(&mut self) -> bool {
        self.current_retry = (self.current_retry + 1).min(self.max_retries);
        self.touch();
        if self.can_retry() {
            self.status = TaskStatus::Ready;
            true
        } else {
            false
        }
    }

    /// Put an interrupted task back in the pool without spending budget
    pub fn requeue(&mut self) {
        self.status = TaskStatus::Ready;
        self.touch();
    }

    pub fn can_retry(&self) -> bool {
        self.current_retry < self.max_retries
    }

    /// Whether the prompt asks for explicit completion markers
    pub fn has_criteria(&self) -> bool {
        self.completion_criteria.is_some()
    }

    /// `current/max` attempt counter
    pub fn retry_label(&self) -> String {
        format!("{}/{}", self.current_retry, self.max_retries)
    }

    /// Requirement shortened to `max_chars`, on a char boundary
    pub fn summary(&self, max_chars: usize) -> String {
        let flat = self.requirement.replace('\n', " ");
        if flat.chars().count() <= max_chars {
            flat
        } else {
            let kept: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
            format!("{}...", kept)
        }
    }
}
