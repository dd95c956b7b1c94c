//! # TaskPing — personal task manager with staged chat reminders
//!
//! Thin CLI host around the reminder engine: seeds the store, runs the tick
//! loop, and inspects state. All scheduling invariants live in
//! `taskping-engine`; nothing here carries logic of its own.
//!
//! Usage:
//!   taskping run                          # Start the reminder loop
//!   taskping tick                         # One engine pass, then exit
//!   taskping add "Pay rent" --due-in-hours 48 --before 12 --before 1
//!   taskping list
//!   taskping status

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use taskping_core::TaskPingConfig;
use taskping_engine::{
    runner, NotificationSink, NullSink, ReminderEngine, SqliteStore, Task, TelegramSink,
};

#[derive(Parser)]
#[command(name = "taskping", version, about = "⏰ TaskPing — staged task reminders")]
struct Cli {
    /// Config file path (default: ~/.taskping/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the reminder loop (runs until interrupted)
    Run,
    /// Run the engine once and exit
    Tick,
    /// Add a task
    Add {
        title: String,
        /// Hours from now until the task is due
        #[arg(long)]
        due_in_hours: f64,
        /// Remind N hours before due (repeatable)
        #[arg(long)]
        before: Vec<f64>,
        /// Remind at N percent of the task's lifetime (repeatable)
        #[arg(long)]
        percent: Vec<f64>,
        /// Minimum minutes between reminders for this task
        #[arg(long)]
        min_gap: Option<u32>,
        #[arg(long, default_value = "me")]
        user: String,
    },
    /// List all tasks
    List,
    /// Mark a task completed
    Done { id: String },
    /// Snooze a task for N minutes
    Snooze { id: String, minutes: i64 },
    /// Show recent notifications
    Notifications {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Show store summary and engine configuration
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    let config = match &cli.config {
        Some(path) => TaskPingConfig::load_from(path)?,
        None => TaskPingConfig::load()?,
    };
    let store = SqliteStore::open(Path::new(&config.store.db_path))?;

    match cli.command {
        Command::Run => {
            let engine = Arc::new(Mutex::new(build_engine(store, &config)));
            runner::run_reminder_loop(engine, config.engine.tick_interval_secs).await;
        }
        Command::Tick => {
            let mut engine = build_engine(store, &config);
            engine.run_once(Utc::now()).await;
            let stats = engine.stats();
            match &stats.last_error {
                None => println!("Tick complete in {}ms", stats.last_duration_ms),
                Some(e) => println!("Tick failed: {e}"),
            }
        }
        Command::Add {
            title,
            due_in_hours,
            before,
            percent,
            min_gap,
            user,
        } => {
            let due = Utc::now() + Duration::milliseconds((due_in_hours * 3_600_000.0) as i64);
            let mut task = Task::new(&uuid::Uuid::new_v4().to_string(), &user, &title, due);
            task.notify_before_hours = before;
            task.notify_percentage = percent;
            task.min_gap_minutes = min_gap;
            store.insert_task(&task)?;
            println!("Added task {} (due {})", task.id, due.format("%Y-%m-%d %H:%M UTC"));
        }
        Command::List => {
            let tasks = store.list_tasks()?;
            if tasks.is_empty() {
                println!("No tasks.");
            }
            for task in tasks {
                println!(
                    "{}  [{}]  {}  due {}  stages sent: {:?}",
                    task.id,
                    match task.status {
                        taskping_engine::TaskStatus::Pending => "pending",
                        taskping_engine::TaskStatus::Completed => "done",
                    },
                    task.title,
                    task.due_date.format("%Y-%m-%d %H:%M UTC"),
                    task.reminder_stages_sent.labels(),
                );
            }
        }
        Command::Done { id } => {
            if store.complete_task(&id)? {
                println!("Task {id} completed.");
            } else {
                println!("No task with id {id}.");
            }
        }
        Command::Snooze { id, minutes } => {
            let until = Utc::now() + Duration::minutes(minutes);
            if store.snooze_task(&id, until)? {
                println!("Task {id} snoozed until {}.", until.format("%H:%M UTC"));
            } else {
                println!("No task with id {id}.");
            }
        }
        Command::Notifications { limit } => {
            let notifications = store.recent_notifications(limit)?;
            if notifications.is_empty() {
                println!("No notifications.");
            }
            for n in notifications {
                println!(
                    "#{}  {}  [{}]  {}  {}",
                    n.id,
                    n.created_at.format("%Y-%m-%d %H:%M"),
                    n.kind.as_str(),
                    if n.read { "read" } else { "unread" },
                    n.message,
                );
            }
        }
        Command::Status => {
            let tasks = store.list_tasks()?;
            let pending = tasks
                .iter()
                .filter(|t| t.status == taskping_engine::TaskStatus::Pending)
                .count();
            println!("Tasks: {} total, {} pending", tasks.len(), pending);
            println!(
                "Engine: tick every {}s, tolerance {}s, default gap {}min",
                config.engine.tick_interval_secs,
                config.engine.tolerance_window_secs,
                config.engine.default_min_gap_minutes,
            );
            println!(
                "Delivery: {}",
                match &config.telegram {
                    Some(tg) if tg.enabled => format!("telegram (chat {})", tg.chat_id),
                    _ => "none (notifications stored only)".to_string(),
                }
            );
        }
    }

    Ok(())
}

fn build_engine(
    store: SqliteStore,
    config: &TaskPingConfig,
) -> ReminderEngine<SqliteStore, Box<dyn NotificationSink>> {
    let sink: Box<dyn NotificationSink> = match &config.telegram {
        Some(tg) if tg.enabled => Box::new(TelegramSink::new(tg)),
        _ => Box::new(NullSink),
    };
    ReminderEngine::new(store, sink, config.engine.clone())
}
