//! Relay CLI - Main entry point

mod commands;
mod daemon;
mod init;

use clap::{Parser, Subcommand};
use relay_foundation::RelayConfig;
use relay_task::{Complexity, NewTask, Priority, DEFAULT_LIST_LIMIT};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Relay - a durable task queue that runs coding tasks through the claude CLI
#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Data directory (default: ./.relay)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the data directory and a default config
    Init {
        /// Overwrite an existing config with defaults
        #[arg(short, long)]
        force: bool,
    },
    /// Run the executor until interrupted (Ctrl+C)
    Run {
        /// Run up to N tasks at once (overrides config)
        #[arg(short, long)]
        parallel: Option<usize>,
    },
    /// Queue a new task
    Add {
        /// What the task should accomplish
        requirement: String,

        /// Success condition; enables explicit completion markers
        #[arg(short, long)]
        criteria: Option<String>,

        /// low, normal, high, urgent (or 1-4)
        #[arg(short, long, default_value = "normal")]
        priority: Priority,

        /// Run complex tasks with criteria in plan mode
        #[arg(long)]
        complex: bool,

        /// Total attempts before the task fails (default from config)
        #[arg(short, long)]
        max_retries: Option<u32>,

        /// Opaque attachment reference, repeatable
        #[arg(short, long = "attach")]
        attachments: Vec<String>,
    },
    /// Show ready and in-progress tasks
    List,
    /// Show queue counts and running tasks
    Status,
    /// Show recently completed tasks
    Completed {
        #[arg(short, long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },
    /// Show recently failed tasks
    Failed {
        #[arg(short, long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },
    /// Show one task in detail
    Show {
        id: String,

        /// Print the raw record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Cancel a ready or running task
    Cancel { id: String },
    /// Delete every task
    Reset {
        /// Skip the confirmation check
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let data_dir = match args.data_dir {
        Some(dir) => dir,
        None => RelayConfig::default_data_dir()?,
    };

    if let Command::Init { force } = args.command {
        return init::init_project(&data_dir, force);
    }

    let config = RelayConfig::load(&data_dir).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config: {}", e);
        RelayConfig::default()
    });

    // Initialize logging
    let log_level = if args.debug || config.debug_mode() {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match args.command {
        Command::Init { .. } => Ok(()),
        Command::Run { parallel } => {
            let mut config = config;
            if let Some(n) = parallel {
                config = config.parallel(n);
            }
            daemon::run(&data_dir, config).await
        }
        Command::Add {
            requirement,
            criteria,
            priority,
            complex,
            max_retries,
            attachments,
        } => {
            let mut new = NewTask::new(requirement).with_priority(priority);
            if let Some(criteria) = criteria {
                new = new.with_criteria(criteria);
            }
            if complex {
                new = new.with_complexity(Complexity::Complex);
            }
            if let Some(max) = max_retries {
                new = new.with_max_retries(max);
            }
            for attachment in attachments {
                new = new.with_attachment(attachment);
            }
            commands::add(&commands::open_store(&data_dir, &config)?, new)
        }
        Command::List => commands::list(&commands::open_store(&data_dir, &config)?),
        Command::Status => commands::status(&commands::open_store(&data_dir, &config)?),
        Command::Completed { limit } => {
            commands::completed(&commands::open_store(&data_dir, &config)?, limit)
        }
        Command::Failed { limit } => {
            commands::failed(&commands::open_store(&data_dir, &config)?, limit)
        }
        Command::Show { id, json } => {
            commands::show(&commands::open_store(&data_dir, &config)?, &id, json)
        }
        Command::Cancel { id } => commands::cancel(&commands::open_store(&data_dir, &config)?, &id),
        Command::Reset { yes } => commands::reset(&commands::open_store(&data_dir, &config)?, yes),
    }
}
