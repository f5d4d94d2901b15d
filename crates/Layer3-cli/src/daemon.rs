//! `relay run` - the executor daemon

use relay_foundation::RelayConfig;
use relay_task::{ExecutorConfig, Executor, LocalRunner, TaskStore, TracingNotifier};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Recover, start the tick loop and run until Ctrl+C
pub async fn run(data_dir: &Path, config: RelayConfig) -> anyhow::Result<()> {
    let store = Arc::new(TaskStore::open(data_dir, config.default_max_retries())?);
    let work_dir = std::env::current_dir()?;
    let executor_config = ExecutorConfig::from_relay(&config).with_work_dir(&work_dir);
    let program = executor_config.command.program().to_string();

    let executor = Arc::new(Executor::new(
        store,
        Arc::new(LocalRunner::new()),
        Arc::new(TracingNotifier),
        executor_config,
    ));

    // No process of ours can be alive yet, so every in-progress record is an orphan
    let (report, orphans) = executor.recover()?;
    if !report.is_clean() {
        warn!(
            "Repaired task indexes ({} added, {} dropped, {} duplicates)",
            report.added, report.dropped, report.duplicates
        );
    }
    if orphans > 0 {
        info!("Requeued {} task(s) left in progress by a previous run", orphans);
    }

    let stats = executor.store().stats();
    println!("Relay executor");
    println!("  Data:     {}", data_dir.display());
    println!("  Work dir: {}", work_dir.display());
    println!("  Command:  {}", program);
    println!(
        "  Mode:     {}",
        if config.parallel_execution() {
            format!("parallel (max {})", config.max_parallel())
        } else {
            "serial".to_string()
        }
    );
    println!("  Queue:    {} ready, {} completed, {} failed", stats.ready, stats.completed, stats.failed);
    println!("\nPress Ctrl+C to stop.\n");

    executor.start();
    tokio::signal::ctrl_c().await?;

    println!("\nStopping...");
    let killed = executor.stop().await;
    if killed > 0 {
        println!("  Requeued {} running task(s)", killed);
    }
    Ok(())
}
