//! Task Queue - selection policy over the ready set

use crate::task::Task;
use std::cmp::Reverse;

/// Pick the next `count` tasks to run.
///
/// Highest priority first; within a priority, oldest first. The sort is
/// stable, so tasks created in the same instant keep their index order.
pub fn select_next(mut ready: Vec<Task>, count: usize) -> Vec<Task> {
    if count == 0 {
        return Vec::new();
    }
    ready.sort_by_key(|task| (Reverse(task.priority), task.created_at));
    ready.truncate(count);
    ready
}
