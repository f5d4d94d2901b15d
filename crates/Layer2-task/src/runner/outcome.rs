//! Run outcome - deciding success or failure from what a process printed

use super::command::{COMPLETE_MARKER, FAILED_MARKER};
use crate::output::OutputStream;
use regex::Regex;
use std::sync::OnceLock;

/// Characters of output kept as the error text of a failed task
pub const ERROR_TAIL_CHARS: usize = 1000;

/// Error text stored when the last attempt timed out
pub const TIMEOUT_ERROR: &str = "Task timed out";

fn error_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)(error|failed|exception|fatal):").ok())
        .as_ref()
}

fn looks_like_error(text: &str) -> bool {
    error_pattern().is_some_and(|pattern| pattern.is_match(text))
}

/// Terminal result of one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Judged successful; carries the full output
    Success { output: String },

    /// Judged failed; `reason` is used as error text when output is empty
    Failure { output: String, reason: String },

    /// Killed after exceeding the task timeout
    TimedOut { output: String },

    /// Killed because the task was cancelled; no store transition follows
    Cancelled,

    /// Killed by executor shutdown; the task goes back to the pool
    Interrupted,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }

    /// Text stored on the task if this outcome exhausts its budget
    pub fn error_text(&self) -> Option<String> {
        match self {
            RunOutcome::Failure { output, reason } => {
                if output.trim().is_empty() {
                    Some(reason.clone())
                } else {
                    Some(tail_chars(output, ERROR_TAIL_CHARS))
                }
            }
            RunOutcome::TimedOut { .. } => Some(TIMEOUT_ERROR.to_string()),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Success { .. } => "success",
            RunOutcome::Failure { .. } => "failure",
            RunOutcome::TimedOut { .. } => "timeout",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::Interrupted => "interrupted",
        }
    }
}

/// Last `max` characters of `text`, on a char boundary
pub fn tail_chars(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    text.chars().skip(count - max).collect()
}

/// Everything a run printed, plus the completion markers seen on stdout
#[derive(Debug, Clone, Default)]
pub struct OutputCapture {
    combined: String,
    complete_seen: bool,
    failed_seen: bool,
}

impl OutputCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self, stream: OutputStream, line: &str) {
        if stream == OutputStream::Stdout {
            self.complete_seen |= line.contains(COMPLETE_MARKER);
            self.failed_seen |= line.contains(FAILED_MARKER);
        }
        self.combined.push_str(line);
        self.combined.push('\n');
    }

    pub fn output(&self) -> &str {
        &self.combined
    }

    pub fn into_output(self) -> String {
        self.combined
    }

    pub fn has_marker(&self) -> bool {
        self.complete_seen || self.failed_seen
    }

    /// Judge a process that exited on its own.
    ///
    /// Markers decide when present (a FAILED marker always wins); otherwise
    /// a zero exit code with no error-looking text is a success.
    pub fn is_success(&self, exit_code: Option<i32>) -> bool {
        if self.has_marker() {
            return self.complete_seen && !self.failed_seen;
        }
        exit_code == Some(0) && !looks_like_error(&self.combined)
    }

    pub fn into_outcome(self, exit_code: Option<i32>) -> RunOutcome {
        if self.is_success(exit_code) {
            return RunOutcome::Success {
                output: self.combined,
            };
        }
        let reason = if self.has_marker() {
            "task reported failure".to_string()
        } else {
            match exit_code {
                Some(0) => "error reported in output".to_string(),
                Some(code) => format!("process exited with code {}", code),
                None => "process terminated by signal".to_string(),
            }
        };
        RunOutcome::Failure {
            output: self.combined,
            reason,
        }
    }
}
