//! SQLite-backed task store — the engine's read/write boundary.
//!
//! Array-valued fields (stage config, fired labels) are stored as JSON in TEXT
//! columns; timestamps as RFC3339. The one contract that matters for
//! correctness: the stage label, the last-sent timestamp, and the notification
//! row are written in a single transaction, so a crash between "decide to
//! fire" and "record as fired" cannot leave a half-applied state that would
//! duplicate the reminder next tick.

use std::path::Path;

use chrono::{DateTime, Utc};
use taskping_core::error::{Result, TaskPingError};

use crate::tasks::{
    NewNotification, Notification, NotificationKind, StageHistory, Task, TaskStatus,
};

/// What the reminder engine needs from persistence.
pub trait ReminderStore {
    /// All tasks that are pending and not currently snoozed.
    fn find_pending_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Task>>;

    /// Atomically record a firing event: append `stage_label` to the task's
    /// fired set (`None` updates the timestamp only), set
    /// `last_reminder_sent_at`, and persist the notification. All-or-nothing.
    /// Returns the new notification's id.
    fn atomic_update_stage_and_notify(
        &mut self,
        task_id: &str,
        stage_label: Option<&str>,
        sent_at: DateTime<Utc>,
        notification: &NewNotification,
    ) -> Result<i64>;
}

/// SQLite implementation. Also carries the small CRUD surface the CLI adapter
/// uses to seed and inspect the store.
pub struct SqliteStore {
    conn: rusqlite::Connection,
}

impl SqliteStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| TaskPingError::Store(format!("DB open: {e}")))?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| TaskPingError::Store(format!("DB open: {e}")))?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                due_date TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                snoozed_until TEXT,
                notify_before_hours TEXT NOT NULL DEFAULT '[]',   -- JSON array
                notify_percentage TEXT NOT NULL DEFAULT '[]',     -- JSON array
                min_gap_minutes INTEGER,
                reminder_stages_sent TEXT NOT NULL DEFAULT '[]',  -- JSON array, append-only
                last_reminder_sent_at TEXT
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                task_id TEXT NOT NULL,
                kind TEXT NOT NULL,               -- 'reminder' or 'overdue'
                message TEXT NOT NULL,
                created_at TEXT NOT NULL,
                read INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
         ",
            )
            .map_err(|e| TaskPingError::Store(format!("Migration: {e}")))?;
        Ok(())
    }

    // ─── Task CRUD (CLI adapter surface) ──────────────────────

    /// Insert or replace a task.
    pub fn insert_task(&self, task: &Task) -> Result<()> {
        let status = match task.status {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
        };
        self.conn
            .execute(
                "INSERT OR REPLACE INTO tasks
                 (id, user_id, title, created_at, due_date, status, snoozed_until,
                  notify_before_hours, notify_percentage, min_gap_minutes,
                  reminder_stages_sent, last_reminder_sent_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    task.id,
                    task.user_id,
                    task.title,
                    task.created_at.to_rfc3339(),
                    task.due_date.to_rfc3339(),
                    status,
                    task.snoozed_until.map(|t| t.to_rfc3339()),
                    serde_json::to_string(&task.notify_before_hours).unwrap_or_default(),
                    serde_json::to_string(&task.notify_percentage).unwrap_or_default(),
                    task.min_gap_minutes,
                    serde_json::to_string(task.reminder_stages_sent.labels())
                        .unwrap_or_default(),
                    task.last_reminder_sent_at.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(|e| TaskPingError::Store(format!("Insert task: {e}")))?;
        Ok(())
    }

    /// Load a single task by id.
    pub fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TASK_SELECT} WHERE id = ?1"))
            .map_err(|e| TaskPingError::Store(format!("Get task: {e}")))?;
        let mut rows = stmt
            .query_map([id], row_to_task)
            .map_err(|e| TaskPingError::Store(format!("Get task: {e}")))?;
        match rows.next() {
            Some(Ok(task)) => Ok(Some(task)),
            Some(Err(e)) => Err(TaskPingError::Store(format!("Get task: {e}"))),
            None => Ok(None),
        }
    }

    /// All tasks, oldest first.
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TASK_SELECT} ORDER BY created_at"))
            .map_err(|e| TaskPingError::Store(format!("List tasks: {e}")))?;
        let rows = stmt
            .query_map([], row_to_task)
            .map_err(|e| TaskPingError::Store(format!("List tasks: {e}")))?;
        Ok(rows.filter_map(|t| t.ok()).collect())
    }

    /// Flip a task to completed. Returns false when the id is unknown.
    pub fn complete_task(&self, id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("UPDATE tasks SET status = 'completed' WHERE id = ?1", [id])
            .map_err(|e| TaskPingError::Store(format!("Complete task: {e}")))?;
        Ok(changed > 0)
    }

    /// Snooze a task until the given instant.
    pub fn snooze_task(&self, id: &str, until: DateTime<Utc>) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE tasks SET snoozed_until = ?1 WHERE id = ?2",
                rusqlite::params![until.to_rfc3339(), id],
            )
            .map_err(|e| TaskPingError::Store(format!("Snooze task: {e}")))?;
        Ok(changed > 0)
    }

    // ─── Notifications ──────────────────────────────────────

    /// Most recent notifications, newest first.
    pub fn recent_notifications(&self, limit: usize) -> Result<Vec<Notification>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, user_id, task_id, kind, message, created_at, read
                 FROM notifications ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|e| TaskPingError::Store(format!("Notifications: {e}")))?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                let kind_str: String = row.get(3)?;
                let created_at_str: String = row.get(5)?;
                Ok(Notification {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    task_id: row.get(2)?,
                    kind: if kind_str == "overdue" {
                        NotificationKind::Overdue
                    } else {
                        NotificationKind::Reminder
                    },
                    message: row.get(4)?,
                    created_at: parse_instant(&created_at_str),
                    read: row.get::<_, i64>(6)? != 0,
                })
            })
            .map_err(|e| TaskPingError::Store(format!("Notifications: {e}")))?;
        Ok(rows.filter_map(|n| n.ok()).collect())
    }

    /// Mark a notification as read. The read flag is the only mutable field.
    pub fn mark_notification_read(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("UPDATE notifications SET read = 1 WHERE id = ?1", [id])
            .map_err(|e| TaskPingError::Store(format!("Mark read: {e}")))?;
        Ok(changed > 0)
    }
}

impl ReminderStore for SqliteStore {
    fn find_pending_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{TASK_SELECT}
                 WHERE status = 'pending'
                   AND (snoozed_until IS NULL OR snoozed_until <= ?1)
                 ORDER BY created_at"
            ))
            .map_err(|e| TaskPingError::Store(format!("Candidate query: {e}")))?;
        let rows = stmt
            .query_map([now.to_rfc3339()], row_to_task)
            .map_err(|e| TaskPingError::Store(format!("Candidate query: {e}")))?;
        Ok(rows.filter_map(|t| t.ok()).collect())
    }

    fn atomic_update_stage_and_notify(
        &mut self,
        task_id: &str,
        stage_label: Option<&str>,
        sent_at: DateTime<Utc>,
        notification: &NewNotification,
    ) -> Result<i64> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| TaskPingError::Store(format!("Begin tx: {e}")))?;

        if let Some(label) = stage_label {
            let sent_json: String = tx
                .query_row(
                    "SELECT reminder_stages_sent FROM tasks WHERE id = ?1",
                    [task_id],
                    |row| row.get(0),
                )
                .map_err(|e| TaskPingError::Store(format!("Read stages for {task_id}: {e}")))?;
            let mut history: StageHistory =
                serde_json::from_str::<Vec<String>>(&sent_json)
                    .unwrap_or_default()
                    .into();
            history.push(label);
            let updated = serde_json::to_string(history.labels())
                .map_err(|e| TaskPingError::Serde(e.to_string()))?;
            tx.execute(
                "UPDATE tasks SET reminder_stages_sent = ?1, last_reminder_sent_at = ?2
                 WHERE id = ?3",
                rusqlite::params![updated, sent_at.to_rfc3339(), task_id],
            )
            .map_err(|e| TaskPingError::Store(format!("Update task {task_id}: {e}")))?;
        } else {
            let changed = tx
                .execute(
                    "UPDATE tasks SET last_reminder_sent_at = ?1 WHERE id = ?2",
                    rusqlite::params![sent_at.to_rfc3339(), task_id],
                )
                .map_err(|e| TaskPingError::Store(format!("Update task {task_id}: {e}")))?;
            if changed == 0 {
                return Err(TaskPingError::Store(format!("no task {task_id}")));
            }
        }

        tx.execute(
            "INSERT INTO notifications (user_id, task_id, kind, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                notification.user_id,
                notification.task_id,
                notification.kind.as_str(),
                notification.message,
                notification.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| TaskPingError::Store(format!("Insert notification: {e}")))?;
        let id = tx.last_insert_rowid();

        tx.commit()
            .map_err(|e| TaskPingError::Store(format!("Commit: {e}")))?;
        Ok(id)
    }
}

const TASK_SELECT: &str = "SELECT id, user_id, title, created_at, due_date, status, snoozed_until,
        notify_before_hours, notify_percentage, min_gap_minutes,
        reminder_stages_sent, last_reminder_sent_at
 FROM tasks";

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let created_at_str: String = row.get(3)?;
    let due_date_str: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let snoozed_str: Option<String> = row.get(6)?;
    let before_json: String = row.get(7)?;
    let percent_json: String = row.get(8)?;
    let sent_json: String = row.get(10)?;
    let last_sent_str: Option<String> = row.get(11)?;

    // Malformed arrays are a data anomaly, not an error: treated as empty.
    let notify_before_hours: Vec<f64> = serde_json::from_str(&before_json).unwrap_or_default();
    let notify_percentage: Vec<f64> = serde_json::from_str(&percent_json).unwrap_or_default();
    let sent: Vec<String> = serde_json::from_str(&sent_json).unwrap_or_default();

    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: parse_required_instant(3, &created_at_str)?,
        due_date: parse_required_instant(4, &due_date_str)?,
        status: if status_str == "completed" {
            TaskStatus::Completed
        } else {
            TaskStatus::Pending
        },
        snoozed_until: snoozed_str.as_deref().and_then(parse_opt_instant),
        notify_before_hours,
        notify_percentage,
        min_gap_minutes: row.get(9)?,
        reminder_stages_sent: sent.into(),
        last_reminder_sent_at: last_sent_str.as_deref().and_then(parse_opt_instant),
    })
}

/// A task row with an unreadable created_at/due_date is corrupt: the row
/// conversion fails and the callers drop it, rather than inventing a
/// timestamp that would turn the row into a near-zero-duration task.
fn parse_required_instant(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_instant(s: &str) -> DateTime<Utc> {
    parse_opt_instant(s).unwrap_or_else(Utc::now)
}

fn parse_opt_instant(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::NotificationKind;
    use chrono::Duration;

    fn seeded_task(id: &str) -> Task {
        let mut task = Task::new(id, "u1", "pay rent", Utc::now() + Duration::hours(4));
        task.notify_before_hours = vec![1.0];
        task.notify_percentage = vec![50.0];
        task
    }

    #[test]
    fn test_insert_and_load_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut task = seeded_task("t1");
        task.reminder_stages_sent.push("percent_50");
        task.min_gap_minutes = Some(30);
        store.insert_task(&task).unwrap();

        let loaded = store.get_task("t1").unwrap().unwrap();
        assert_eq!(loaded.title, "pay rent");
        assert_eq!(loaded.notify_before_hours, vec![1.0]);
        assert_eq!(loaded.notify_percentage, vec![50.0]);
        assert_eq!(loaded.min_gap_minutes, Some(30));
        assert!(loaded.reminder_stages_sent.contains("percent_50"));
        assert_eq!(loaded.status, TaskStatus::Pending);
    }

    #[test]
    fn test_candidate_filtering() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();

        store.insert_task(&seeded_task("pending")).unwrap();

        let mut done = seeded_task("done");
        done.status = TaskStatus::Completed;
        store.insert_task(&done).unwrap();

        let mut snoozed = seeded_task("snoozed");
        snoozed.snoozed_until = Some(now + Duration::hours(1));
        store.insert_task(&snoozed).unwrap();

        let mut snooze_over = seeded_task("snooze-over");
        snooze_over.snoozed_until = Some(now - Duration::minutes(5));
        store.insert_task(&snooze_over).unwrap();

        let candidates = store.find_pending_candidates(now).unwrap();
        let ids: Vec<&str> = candidates.iter().map(|t| t.id.as_str()).collect();
        assert!(ids.contains(&"pending"));
        assert!(ids.contains(&"snooze-over"));
        assert!(!ids.contains(&"done"));
        assert!(!ids.contains(&"snoozed"));
    }

    #[test]
    fn test_atomic_update_appends_stage_and_creates_notification() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let task = seeded_task("t1");
        store.insert_task(&task).unwrap();

        let now = Utc::now();
        let notification = NewNotification {
            user_id: "u1".into(),
            task_id: "t1".into(),
            kind: NotificationKind::Reminder,
            message: "Reminder: Task \"pay rent\" - before_1h".into(),
            created_at: now,
        };
        let id = store
            .atomic_update_stage_and_notify("t1", Some("before_1h"), now, &notification)
            .unwrap();
        assert!(id > 0);

        let updated = store.get_task("t1").unwrap().unwrap();
        assert_eq!(updated.reminder_stages_sent.labels(), ["before_1h"]);
        assert!(updated.last_reminder_sent_at.is_some());

        let recent = store.recent_notifications(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].kind, NotificationKind::Reminder);
        assert!(!recent[0].read);
    }

    #[test]
    fn test_atomic_update_without_label_keeps_history() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut task = seeded_task("t1");
        task.reminder_stages_sent.push("before_1h");
        store.insert_task(&task).unwrap();

        let now = Utc::now();
        let notification = NewNotification {
            user_id: "u1".into(),
            task_id: "t1".into(),
            kind: NotificationKind::Overdue,
            message: "Overdue: Task \"pay rent\" is overdue!".into(),
            created_at: now,
        };
        store
            .atomic_update_stage_and_notify("t1", None, now, &notification)
            .unwrap();

        let updated = store.get_task("t1").unwrap().unwrap();
        // History untouched, timestamp advanced, notification persisted
        assert_eq!(updated.reminder_stages_sent.labels(), ["before_1h"]);
        assert!(updated.last_reminder_sent_at.is_some());
        assert_eq!(store.recent_notifications(10).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_task_update_fails() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let notification = NewNotification {
            user_id: "u1".into(),
            task_id: "ghost".into(),
            kind: NotificationKind::Reminder,
            message: "x".into(),
            created_at: Utc::now(),
        };
        let result =
            store.atomic_update_stage_and_notify("ghost", Some("before_1h"), Utc::now(), &notification);
        assert!(result.is_err());
    }

    #[test]
    fn test_timestamp_only_update_unknown_task_fails() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let notification = NewNotification {
            user_id: "u1".into(),
            task_id: "ghost".into(),
            kind: NotificationKind::Overdue,
            message: "x".into(),
            created_at: Utc::now(),
        };
        // Both arms of the contract behave the same on unknown ids
        let result = store.atomic_update_stage_and_notify("ghost", None, Utc::now(), &notification);
        assert!(result.is_err());
        // The transaction rolled back: no orphaned notification row
        assert!(store.recent_notifications(10).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_timestamp_row_is_dropped() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_task(&seeded_task("good")).unwrap();
        store.insert_task(&seeded_task("corrupt")).unwrap();
        store
            .conn
            .execute(
                "UPDATE tasks SET created_at = 'not-a-timestamp' WHERE id = 'corrupt'",
                [],
            )
            .unwrap();

        // The corrupt row is dropped, not resurrected with an invented instant
        let candidates = store.find_pending_candidates(Utc::now()).unwrap();
        let ids: Vec<&str> = candidates.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["good"]);
        assert_eq!(store.list_tasks().unwrap().len(), 1);
        assert!(store.get_task("corrupt").unwrap_err().to_string().contains("Get task"));
    }

    #[test]
    fn test_complete_snooze_and_read_flag() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.insert_task(&seeded_task("t1")).unwrap();

        assert!(store.complete_task("t1").unwrap());
        assert!(!store.complete_task("ghost").unwrap());
        assert_eq!(
            store.get_task("t1").unwrap().unwrap().status,
            TaskStatus::Completed
        );

        store.insert_task(&seeded_task("t2")).unwrap();
        assert!(store.snooze_task("t2", Utc::now() + Duration::hours(2)).unwrap());
        assert!(
            store
                .find_pending_candidates(Utc::now())
                .unwrap()
                .iter()
                .all(|t| t.id != "t2")
        );

        let notification = NewNotification {
            user_id: "u1".into(),
            task_id: "t2".into(),
            kind: NotificationKind::Reminder,
            message: "m".into(),
            created_at: Utc::now(),
        };
        let id = store
            .atomic_update_stage_and_notify("t2", Some("before_1h"), Utc::now(), &notification)
            .unwrap();
        assert!(store.mark_notification_read(id).unwrap());
        assert!(store.recent_notifications(1).unwrap()[0].read);
    }
}
