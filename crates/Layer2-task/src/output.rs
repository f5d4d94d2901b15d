//! Recent output - per-task ring buffers of the latest output lines
//!
//! Running tasks keep their last non-blank lines so collaborators can peek at
//! progress; the buffer is dropped once the run reaches a terminal outcome.

use crate::task::TaskId;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Lines kept per running task
pub const RECENT_OUTPUT_LINES: usize = 20;

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

/// Bounded buffer of the most recent non-blank lines
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Push one line; blank lines are ignored
    pub fn push(&mut self, line: &str) {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    /// Oldest first
    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(RECENT_OUTPUT_LINES)
    }
}

/// Recent output of every running task
#[derive(Debug, Clone, Default)]
pub struct OutputRegistry {
    buffers: Arc<RwLock<HashMap<TaskId, OutputBuffer>>>,
}

impl OutputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh buffer for a run, replacing any previous one
    pub async fn open(&self, id: &TaskId) {
        self.buffers
            .write()
            .await
            .insert(id.clone(), OutputBuffer::default());
    }

    pub async fn push_line(&self, id: &TaskId, line: &str) {
        if let Some(buffer) = self.buffers.write().await.get_mut(id) {
            buffer.push(line);
        }
    }

    /// Snapshot of the recent lines, empty when the task is not running
    pub async fn recent(&self, id: &TaskId) -> Vec<String> {
        self.buffers
            .read()
            .await
            .get(id)
            .map(OutputBuffer::lines)
            .unwrap_or_default()
    }

    pub async fn close(&self, id: &TaskId) {
        self.buffers.write().await.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_last_lines_only() {
        let mut buffer = OutputBuffer::default();
        for n in 0..25 {
            buffer.push(&format!("line {}", n));
        }
        let lines = buffer.lines();
        assert_eq!(lines.len(), RECENT_OUTPUT_LINES);
        assert_eq!(lines[0], "line 5");
        assert_eq!(lines[19], "line 24");
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let mut buffer = OutputBuffer::new(3);
        buffer.push("first\r\n");
        buffer.push("   ");
        buffer.push("");
        buffer.push("second");
        assert_eq!(buffer.lines(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_registry_lifecycle() {
        let registry = OutputRegistry::new();
        let id = TaskId::from("20250101-000000-AAA");

        registry.push_line(&id, "dropped before open").await;
        assert!(registry.recent(&id).await.is_empty());

        registry.open(&id).await;
        registry.push_line(&id, "working").await;
        assert_eq!(registry.recent(&id).await, vec!["working"]);

        registry.close(&id).await;
        assert!(registry.recent(&id).await.is_empty());
    }
}
