//! Relay init command
//!
//! Creates the data directory layout and a default `config.json`.

use relay_foundation::{RelayConfig, RELAY_CONFIG_FILE};
use relay_task::TaskStore;
use std::path::Path;

/// Initialize a data directory
pub fn init_project(data_dir: &Path, force: bool) -> anyhow::Result<()> {
    let config_path = data_dir.join(RELAY_CONFIG_FILE);

    if config_path.exists() && !force {
        println!("✓ Relay already initialized in {}", data_dir.display());
        println!("  Use --force to reset the config to defaults.");
        return Ok(());
    }

    println!("Initializing Relay...");

    let config = RelayConfig::with_defaults();
    // Creates ready/, completed/ and failed/
    TaskStore::open(data_dir, config.default_max_retries())?;
    config.save_project(data_dir)?;
    println!("  Created {}", config_path.display());

    println!("\n✓ Relay initialized successfully!");
    println!("\nNext steps:");
    println!("  1. Edit {} (parallelExecution, maxParallel, taskTimeout, claudeCommand)", config_path.display());
    println!("  2. Queue work with 'relay add \"<requirement>\"'");
    println!("  3. Run 'relay run' to start the executor");

    Ok(())
}
