//! Reminder engine — the per-tick orchestrator.
//!
//! Each run loads the pending candidates, asks the planner which stage (if
//! any) is due per task, consults the anti-flood gate, persists the firing
//! atomically, and pushes the notification out best-effort. Every task is
//! processed independently: one broken task never blocks the batch, and a
//! failed candidate load aborts only the current tick.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use taskping_core::config::EngineConfig;
use taskping_core::error::Result;

use crate::dispatch::NotificationSink;
use crate::gate::gate_allows;
use crate::stages::{plan_stages, stage_is_eligible, Stage};
use crate::store::ReminderStore;
use crate::tasks::{NewNotification, NotificationKind, Task};

/// Run counters exposed for health checks. Reset on process start.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    pub total_runs: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_duration_ms: u64,
    /// Error message of the last run's tick-level failure, if any.
    /// Per-task failures do not count: they are logged and retried next tick.
    pub last_error: Option<String>,
}

/// Health surface derived from the stats, without affecting engine behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

/// The reminder engine. One instance per process; the runner serializes runs.
pub struct ReminderEngine<S: ReminderStore, N: NotificationSink> {
    store: S,
    sink: N,
    config: EngineConfig,
    stats: EngineStats,
}

impl<S: ReminderStore, N: NotificationSink> ReminderEngine<S, N> {
    pub fn new(store: S, sink: N, config: EngineConfig) -> Self {
        Self {
            store,
            sink,
            config,
            stats: EngineStats::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn health(&self) -> HealthStatus {
        if self.stats.last_error.is_some() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Ok
        }
    }

    /// One engine pass. Never propagates errors: a tick either completes or
    /// is logged and retried from scratch on the next invocation. Calling it
    /// when nothing is due is a no-op.
    pub async fn run_once(&mut self, now: DateTime<Utc>) {
        let started = std::time::Instant::now();
        self.stats.total_runs += 1;
        self.stats.last_run_at = Some(now);
        tracing::debug!("🔍 Reminder check started at {now}");

        match self.run_tick(now).await {
            Ok(fired) => {
                self.stats.last_error = None;
                if fired > 0 {
                    tracing::info!("🔔 Reminder run fired {fired} notification(s)");
                }
            }
            Err(e) => {
                tracing::error!("💥 Reminder run aborted: {e}");
                self.stats.last_error = Some(e.to_string());
            }
        }
        self.stats.last_duration_ms = started.elapsed().as_millis() as u64;
    }

    async fn run_tick(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let tasks = self.store.find_pending_candidates(now)?;
        if tasks.len() > self.config.candidate_warn_threshold {
            tracing::warn!(
                "⚠️ Large candidate batch: {} tasks (threshold {})",
                tasks.len(),
                self.config.candidate_warn_threshold
            );
        }
        tracing::debug!("Processing {} eligible tasks", tasks.len());

        let mut fired = 0;
        for task in &tasks {
            match self.process_task(task, now).await {
                Ok(true) => fired += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!("⚠️ Task {} failed this tick, will retry: {e}", task.id),
            }
        }
        Ok(fired)
    }

    /// Decide and fire for one task. Returns whether a notification went out.
    async fn process_task(&mut self, task: &Task, now: DateTime<Utc>) -> Result<bool> {
        // Non-positive span: never produces reminders of any kind
        if task.duration() <= Duration::zero() {
            return Ok(false);
        }

        let tolerance = Duration::seconds(self.config.tolerance_window_secs as i64);
        let mut stage_fired = false;

        for planned in plan_stages(task) {
            let label = planned.stage.label();
            if !stage_is_eligible(planned.trigger_time, now, tolerance)
                || task.reminder_stages_sent.contains(&label)
            {
                continue;
            }

            // A denied gate is a hard stop for this task, not a skip: firing a
            // later stage while the gate says "wait" would itself be a flood.
            if !gate_allows(
                task.last_reminder_sent_at,
                task.min_gap_minutes,
                self.config.default_min_gap_minutes,
                now,
            ) {
                tracing::debug!("⏳ Anti-flood gate blocked task {}", task.id);
                break;
            }

            match self.fire(task, &planned.stage, NotificationKind::Reminder, now).await {
                Ok(()) => stage_fired = true,
                Err(e) => {
                    tracing::warn!("⚠️ Stage write failed for task {}: {e}", task.id);
                }
            }
            // At most one stage per task per tick, fired or not
            break;
        }

        // Overdue path: exempt from the anti-flood gate, fires at most once
        // per task ever (the stored "overdue" label is the dedup record).
        if !stage_fired
            && now > task.due_date
            && !task.reminder_stages_sent.contains(&Stage::Overdue.label())
        {
            self.fire(task, &Stage::Overdue, NotificationKind::Overdue, now)
                .await?;
            return Ok(true);
        }

        Ok(stage_fired)
    }

    /// Persist one firing event atomically, then push it out best-effort.
    /// Channel failure is logged and swallowed: the stored notification is the
    /// durable record, delivery is fire-and-forget.
    async fn fire(
        &mut self,
        task: &Task,
        stage: &Stage,
        kind: NotificationKind,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let label = stage.label();
        let message = match kind {
            NotificationKind::Reminder => {
                format!("Reminder: Task \"{}\" - {}", task.title, label)
            }
            NotificationKind::Overdue => {
                format!("Overdue: Task \"{}\" is overdue!", task.title)
            }
        };
        let notification = NewNotification {
            user_id: task.user_id.clone(),
            task_id: task.id.clone(),
            kind,
            message: message.clone(),
            created_at: now,
        };

        self.store
            .atomic_update_stage_and_notify(&task.id, Some(&label), now, &notification)?;
        tracing::info!("📣 [{label}] Task {} notification recorded", task.id);

        if let Err(e) = self.sink.deliver(&task.user_id, &task.id, &message).await {
            tracing::warn!("📵 Delivery failed for task {} (notification kept): {e}", task.id);
        }
        Ok(())
    }
}
