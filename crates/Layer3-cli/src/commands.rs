//! One-shot commands over the task store
//!
//! These work on the data directory directly, so they can run next to a
//! `relay run` daemon. A cancel issued here removes the record; the daemon
//! kills the matching process on its next tick.

use relay_foundation::RelayConfig;
use relay_task::{NewTask, Task, TaskId, TaskStatus, TaskStore};
use std::path::Path;

const SUMMARY_CHARS: usize = 60;

pub fn open_store(data_dir: &Path, config: &RelayConfig) -> anyhow::Result<TaskStore> {
    Ok(TaskStore::open(data_dir, config.default_max_retries())?)
}

fn task_line(task: &Task) -> String {
    format!(
        "{} {}  [{}]  {}  ({})",
        task.status.symbol(),
        task.id,
        task.priority,
        task.summary(SUMMARY_CHARS),
        task.retry_label()
    )
}

fn print_tasks(title: &str, tasks: &[Task]) {
    println!("{} ({})", title, tasks.len());
    if tasks.is_empty() {
        println!("  (none)");
    }
    for task in tasks {
        println!("  {}", task_line(task));
    }
}

pub fn add(store: &TaskStore, new: NewTask) -> anyhow::Result<()> {
    let task = store.create(new)?;
    println!("✓ Queued task {}", task.id);
    println!("  Priority: {}  Attempts: {}", task.priority, task.max_retries);
    if let Some(criteria) = &task.completion_criteria {
        println!("  Criteria: {}", criteria);
    }
    Ok(())
}

pub fn list(store: &TaskStore) -> anyhow::Result<()> {
    print_tasks("In progress", &store.list_in_progress());
    println!();
    print_tasks("Ready", &relay_task::select_next(store.list_ready(), usize::MAX));
    Ok(())
}

pub fn status(store: &TaskStore) -> anyhow::Result<()> {
    let stats = store.stats();
    println!("Data directory: {}", store.data_dir().display());
    println!(
        "Ready: {}  In progress: {}  Completed: {}  Failed: {}",
        stats.ready, stats.in_progress, stats.completed, stats.failed
    );

    let running = store.list_in_progress();
    if !running.is_empty() {
        println!();
        for task in &running {
            let elapsed = task
                .started_at
                .map(|at| format_elapsed(chrono::Utc::now() - at))
                .unwrap_or_else(|| "-".to_string());
            println!("  {}  running for {}", task_line(task), elapsed);
        }
    }
    Ok(())
}

fn format_elapsed(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

pub fn completed(store: &TaskStore, limit: usize) -> anyhow::Result<()> {
    print_tasks("Completed", &store.list_completed(limit));
    Ok(())
}

pub fn failed(store: &TaskStore, limit: usize) -> anyhow::Result<()> {
    print_tasks("Failed", &store.list_failed(limit));
    Ok(())
}

pub fn show(store: &TaskStore, id: &str, json: bool) -> anyhow::Result<()> {
    let Some(task) = store.get(&TaskId::parse(id)?) else {
        anyhow::bail!("Task {} not found", id);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&task)?);
        return Ok(());
    }

    println!("{} {}", task.status.symbol(), task.id);
    println!("  Status:      {}", task.status);
    println!("  Priority:    {}", task.priority);
    println!("  Complexity:  {}", task.complexity);
    println!("  Attempts:    {}", task.retry_label());
    println!("  Created:     {}", task.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(at) = task.started_at {
        println!("  Started:     {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(at) = task.completed_at {
        println!("  Completed:   {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(at) = task.failed_at {
        println!("  Failed:      {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("\nRequirement:\n  {}", task.requirement);
    if let Some(criteria) = &task.completion_criteria {
        println!("\nCompletion criteria:\n  {}", criteria);
    }
    if !task.attachments.is_empty() {
        println!("\nAttachments:");
        for attachment in &task.attachments {
            println!("  - {}", attachment);
        }
    }
    if let Some(output) = &task.output {
        println!("\nOutput:\n{}", output.trim_end());
    }
    if let Some(error) = &task.error {
        println!("\nError:\n{}", error.trim_end());
    }
    Ok(())
}

pub fn cancel(store: &TaskStore, id: &str) -> anyhow::Result<()> {
    match store.cancel(&TaskId::parse(id)?)? {
        Some(task) if task.status == TaskStatus::InProgress => {
            println!("✓ Cancelled task {} (its process stops on the next executor tick)", id);
        }
        Some(_) => println!("✓ Cancelled task {}", id),
        None => println!("Task {} is not ready or running; nothing to cancel", id),
    }
    Ok(())
}

pub fn reset(store: &TaskStore, yes: bool) -> anyhow::Result<()> {
    let stats = store.stats();
    if !yes {
        println!(
            "This deletes {} task(s) in {}.",
            stats.total(),
            store.data_dir().display()
        );
        println!("Run again with --yes to confirm.");
        return Ok(());
    }
    store.reset()?;
    println!("✓ Removed {} task(s)", stats.total());
    Ok(())
}
