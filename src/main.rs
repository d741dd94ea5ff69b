//! # Agentdesk task scheduler CLI
//!
//! Usage:
//!   agentdesk run                          # Run the scheduler until Ctrl-C
//!   agentdesk plan task.json               # Plan a task from a descriptor file
//!   agentdesk list --status completed      # List tasks
//!   agentdesk next schedule.json           # Preview the next run of a schedule
//!
//! `list`, `show` and `stats` only read the store. Commands that change tasks
//! open their own scheduler on the store, so stop `agentdesk run` first.

use std::path::{Path, PathBuf};

use agentdesk_core::AgentdeskConfig;
use agentdesk_scheduler::{
    OpResponse, PlanResponse, Schedule, ScheduleType, Scheduler, TaskDescriptor, TaskStatus,
    StoredTasks, TaskUpdate, recurrence, tasks::parse_datetime,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "agentdesk", version, about = "📅 Agentdesk: task planning and scheduling")]
struct Cli {
    /// Config file (default: ~/.agentdesk/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler loop until interrupted.
    Run,
    /// Plan a task from a JSON descriptor file (stop `run` first).
    Plan { descriptor: PathBuf },
    /// List tasks.
    List {
        /// Only tasks with this status (planned, executing, completed, error).
        #[arg(long)]
        status: Option<TaskStatus>,
    },
    /// Show one task.
    Show { id: String },
    /// Apply a JSON file of changed fields to a task (stop `run` first).
    Update { id: String, fields: PathBuf },
    /// Delete a task (stop `run` first).
    Delete { id: String },
    /// Enable a task (stop `run` first).
    Enable { id: String },
    /// Disable a task (stop `run` first).
    Disable { id: String },
    /// Show task counts.
    Stats,
    /// Preview the next occurrence of a schedule without storing anything.
    Next {
        /// JSON file with `schedule_type` and `schedule_config`.
        schedule: PathBuf,
        /// Reference time (default: now), e.g. 2024-01-15T08:00.
        #[arg(long)]
        now: Option<String>,
    },
}

#[derive(Deserialize)]
struct SchedulePreview {
    schedule_type: ScheduleType,
    #[serde(default)]
    schedule_config: serde_json::Value,
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "agentdesk=debug,agentdesk_scheduler=debug"
    } else {
        "agentdesk=info,agentdesk_scheduler=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => AgentdeskConfig::load_from(&expand_path(path))?,
        None => AgentdeskConfig::load()?,
    };

    if let Command::Next { schedule, now } = &cli.command {
        let preview: SchedulePreview = read_json(schedule)?;
        let now = match now {
            Some(raw) => parse_datetime(raw).with_context(|| format!("Invalid --now '{raw}'"))?,
            None => chrono::Local::now().naive_local(),
        };
        let schedule = Schedule::from_config(preview.schedule_type, &preview.schedule_config)?;
        let next = match recurrence::compute_next(&schedule, now) {
            Ok(next) => serde_json::json!({ "success": true, "next_execution": next.to_string() }),
            Err(e) => serde_json::json!({ "success": false, "error": e.to_string() }),
        };
        return print_json(&next);
    }

    match &cli.command {
        Command::List { status } => {
            let stored = StoredTasks::from_config(&config.scheduler)?;
            return print_json(&stored.get_tasks(*status));
        }
        Command::Show { id } => {
            let stored = StoredTasks::from_config(&config.scheduler)?;
            return match stored.get_task(id) {
                Some(task) => print_json(&task),
                None => print_json(&OpResponse::from(Ok(false))),
            };
        }
        Command::Stats => {
            return print_json(&StoredTasks::from_config(&config.scheduler)?.stats());
        }
        _ => {}
    }

    let scheduler = Scheduler::from_config(&config.scheduler)?;

    match cli.command {
        Command::Run => {
            println!("📅 Agentdesk Scheduler v{}", env!("CARGO_PKG_VERSION"));
            println!("   📂 Data Dir: {}", config.scheduler.data_dir().display());
            println!("   🗄️  Store:    {:?}", config.scheduler.store);
            println!("   ⏱️  Tick:     {}s", config.scheduler.tick_interval().as_secs());
            println!();

            scheduler.start().await;
            tokio::signal::ctrl_c().await?;
            tracing::info!("👋 Shutdown requested");
            scheduler.stop().await;
        }
        Command::Plan { descriptor } => {
            let descriptor: TaskDescriptor = read_json(&descriptor)?;
            print_json(&PlanResponse::from(scheduler.plan_task(descriptor).await))?;
        }
        Command::Update { id, fields } => {
            let update: TaskUpdate = read_json(&fields)?;
            print_json(&OpResponse::from(scheduler.update_task(&id, update).await))?;
        }
        Command::Delete { id } => {
            print_json(&OpResponse::from(scheduler.delete_task(&id).await))?;
        }
        Command::Enable { id } => {
            print_json(&OpResponse::from(scheduler.enable_task(&id).await))?;
        }
        Command::Disable { id } => {
            print_json(&OpResponse::from(scheduler.disable_task(&id).await))?;
        }
        Command::List { .. } | Command::Show { .. } | Command::Stats | Command::Next { .. } => {}
    }

    Ok(())
}
