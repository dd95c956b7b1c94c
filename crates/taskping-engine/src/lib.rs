//! # TaskPing Engine
//!
//! Tick-driven reminder scheduling: decides, for every pending task, whether a
//! notification should fire now — no duplicate stage firing, no bursts after
//! downtime, no concurrent runs.
//!
//! ## Architecture
//! ```text
//! Runner (tokio interval, single-flight guard)
//!   └── ReminderEngine::run_once(now)
//!         ├── ReminderStore::find_pending_candidates  (SQLite)
//!         ├── stages::plan_stages   → ordered candidate stages (pure)
//!         ├── gate::gate_allows     → anti-flood spacing (pure)
//!         ├── ReminderStore::atomic_update_stage_and_notify  (one transaction)
//!         └── NotificationSink::deliver  (Telegram, best-effort)
//! ```
//!
//! At most one stage fires per task per tick. Stages older than the tolerance
//! window are dropped, never retried — that is what keeps a restart after long
//! downtime from flooding the chat with every backlogged reminder.

pub mod dispatch;
pub mod engine;
pub mod gate;
pub mod runner;
pub mod stages;
pub mod store;
pub mod tasks;

pub use dispatch::{NotificationSink, NullSink, TelegramSink};
pub use engine::{EngineStats, HealthStatus, ReminderEngine};
pub use stages::{PlannedStage, Stage, TOLERANCE_WINDOW_SECS};
pub use store::{ReminderStore, SqliteStore};
pub use tasks::{NewNotification, Notification, NotificationKind, StageHistory, Task, TaskStatus};
