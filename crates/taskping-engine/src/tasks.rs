//! Task and notification models — the data the reminder engine reads and writes.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A user task with reminder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID (opaque to the engine).
    pub id: String,
    /// Owner of the task.
    pub user_id: String,
    /// Human-readable title.
    pub title: String,
    /// Creation instant — lower bound for valid reminder stages.
    pub created_at: DateTime<Utc>,
    /// When the task is due.
    pub due_date: DateTime<Utc>,
    /// Current status. Only pending tasks are reminder candidates.
    pub status: TaskStatus,
    /// While in the future, the task is excluded from stage evaluation.
    pub snoozed_until: Option<DateTime<Utc>>,
    /// Hours before the due date at which to remind (time-anchored stages).
    #[serde(default)]
    pub notify_before_hours: Vec<f64>,
    /// Percentages of the created→due span at which to remind (duration-anchored).
    #[serde(default)]
    pub notify_percentage: Vec<f64>,
    /// Minimum minutes between two reminders for this task. None or 0 means
    /// the engine default (58).
    pub min_gap_minutes: Option<u32>,
    /// Stage labels already fired. Append-only, never reordered.
    #[serde(default)]
    pub reminder_stages_sent: StageHistory,
    /// Instant of the most recent reminder for this task.
    pub last_reminder_sent_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a pending task with no reminder stages configured.
    pub fn new(id: &str, user_id: &str, title: &str, due_date: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
            due_date,
            status: TaskStatus::Pending,
            snoozed_until: None,
            notify_before_hours: Vec::new(),
            notify_percentage: Vec::new(),
            min_gap_minutes: None,
            reminder_stages_sent: StageHistory::default(),
            last_reminder_sent_at: None,
        }
    }

    /// Span between creation and due date. Non-positive means the task can
    /// never produce stage-based reminders.
    pub fn duration(&self) -> Duration {
        self.due_date - self.created_at
    }

    /// True when no reminder stages are configured at all.
    pub fn has_no_reminders(&self) -> bool {
        self.notify_before_hours.is_empty() && self.notify_percentage.is_empty()
    }
}

/// Task status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
}

/// Append-only ordered set of fired stage labels.
///
/// Persisted as a plain label array (order matters for readability and
/// compatibility), with a set alongside for O(1) membership checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct StageHistory {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl StageHistory {
    pub fn contains(&self, label: &str) -> bool {
        self.seen.contains(label)
    }

    /// Append a label unless already present. Labels are never removed.
    pub fn push(&mut self, label: &str) {
        if self.seen.insert(label.to_string()) {
            self.order.push(label.to_string());
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}

impl From<Vec<String>> for StageHistory {
    fn from(order: Vec<String>) -> Self {
        let seen = order.iter().cloned().collect();
        Self { order, seen }
    }
}

impl From<StageHistory> for Vec<String> {
    fn from(history: StageHistory) -> Self {
        history.order
    }
}

/// Kind of notification produced by the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Reminder,
    Overdue,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Reminder => "reminder",
            NotificationKind::Overdue => "overdue",
        }
    }
}

/// A notification the engine wants persisted. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: String,
    pub task_id: String,
    pub kind: NotificationKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted notification record. Immutable after creation except for the
/// read flag, which collaborators outside the engine toggle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: String,
    pub task_id: String,
    pub kind: NotificationKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}
