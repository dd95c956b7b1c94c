//! Stage planning — pure computation of when a task's reminders trigger.
//!
//! A stage is a named point in a task's timeline: either hours before the due
//! date ("before_1h") or a percentage of the created→due span ("percent_50").
//! The planner produces the ordered candidate list; the engine decides which
//! one, if any, fires this tick.

use chrono::{DateTime, Duration, Utc};

use crate::tasks::Task;

/// Grace period after a stage's trigger time during which it still counts as
/// "due now". Older stages are missed: dropped silently, never retried. Wide
/// enough to absorb one tick of scheduler jitter, narrow enough that a restart
/// after hours of downtime does not fire every backlogged stage at once.
pub const TOLERANCE_WINDOW_SECS: i64 = 60;

/// A reminder stage, with its canonical persisted label.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Fires N hours before the due date.
    BeforeDue(f64),
    /// Fires at N percent of the created→due span.
    AtPercent(f64),
    /// Fires once after the due date has passed.
    Overdue,
}

impl Stage {
    /// Canonical label, stable across implementations: stored labels written
    /// by older deployments must keep matching.
    pub fn label(&self) -> String {
        match self {
            Stage::BeforeDue(hours) => format!("before_{hours}h"),
            Stage::AtPercent(percent) => format!("percent_{percent}"),
            Stage::Overdue => "overdue".to_string(),
        }
    }
}

/// A stage with its computed trigger instant.
#[derive(Debug, Clone)]
pub struct PlannedStage {
    pub stage: Stage,
    pub trigger_time: DateTime<Utc>,
}

/// Compute the ordered reminder stages for a task.
///
/// Time-based stages are generated before percentage-based ones, and the final
/// sort is stable — so two stages with the same trigger instant keep that
/// order. That tie-break is deliberate: at most one stage fires per tick, and
/// the loser of a tie ages out of the tolerance window rather than firing.
///
/// Pure: no I/O, deterministic given the task.
pub fn plan_stages(task: &Task) -> Vec<PlannedStage> {
    if task.has_no_reminders() {
        return Vec::new();
    }

    let start = task.created_at;
    let due = task.due_date;
    let duration_ms = (due - start).num_milliseconds();
    let mut stages = Vec::new();

    for &hours in &task.notify_before_hours {
        let trigger_time = due - Duration::milliseconds((hours * 3_600_000.0) as i64);
        // No retroactive reminders
        if trigger_time <= start {
            continue;
        }
        stages.push(PlannedStage {
            stage: Stage::BeforeDue(hours),
            trigger_time,
        });
    }

    for &percent in &task.notify_percentage {
        let trigger_time =
            start + Duration::milliseconds(((percent / 100.0) * duration_ms as f64) as i64);
        if trigger_time >= due || trigger_time <= start {
            continue;
        }
        stages.push(PlannedStage {
            stage: Stage::AtPercent(percent),
            trigger_time,
        });
    }

    // Stable: ties keep generation order
    stages.sort_by_key(|s| s.trigger_time);
    stages
}

/// Whether a stage is currently due: triggered already, but not so long ago
/// that it counts as missed.
pub fn stage_is_eligible(
    trigger_time: DateTime<Utc>,
    now: DateTime<Utc>,
    tolerance: Duration,
) -> bool {
    trigger_time <= now && trigger_time > now - tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn task_with(
        created_offset_h: i64,
        due_offset_h: i64,
        before: Vec<f64>,
        percent: Vec<f64>,
    ) -> Task {
        let base = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let mut task = Task::new("t1", "u1", "demo", base + Duration::hours(due_offset_h));
        task.created_at = base + Duration::hours(created_offset_h);
        task.notify_before_hours = before;
        task.notify_percentage = percent;
        task
    }

    #[test]
    fn test_labels_match_persisted_format() {
        assert_eq!(Stage::BeforeDue(1.0).label(), "before_1h");
        assert_eq!(Stage::BeforeDue(0.5).label(), "before_0.5h");
        assert_eq!(Stage::BeforeDue(12.0).label(), "before_12h");
        assert_eq!(Stage::AtPercent(50.0).label(), "percent_50");
        assert_eq!(Stage::AtPercent(12.5).label(), "percent_12.5");
        assert_eq!(Stage::Overdue.label(), "overdue");
    }

    #[test]
    fn test_empty_config_short_circuits() {
        let task = task_with(0, 4, vec![], vec![]);
        assert!(plan_stages(&task).is_empty());
    }

    #[test]
    fn test_sorted_ascending_by_trigger() {
        let task = task_with(0, 10, vec![1.0, 6.0, 3.0], vec![10.0]);
        let stages = plan_stages(&task);
        let labels: Vec<String> = stages.iter().map(|s| s.stage.label()).collect();
        // percent_10 → T+1h, before_6h → T+4h, before_3h → T+7h, before_1h → T+9h
        assert_eq!(labels, ["percent_10", "before_6h", "before_3h", "before_1h"]);
        for pair in stages.windows(2) {
            assert!(pair[0].trigger_time <= pair[1].trigger_time);
        }
    }

    #[test]
    fn test_equal_trigger_tie_break_time_based_first() {
        // 2h task: "1 hour before" lands exactly at the 50% mark
        let task = task_with(0, 2, vec![1.0], vec![50.0]);
        let stages = plan_stages(&task);
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].trigger_time, stages[1].trigger_time);
        assert_eq!(stages[0].stage.label(), "before_1h");
        assert_eq!(stages[1].stage.label(), "percent_50");
    }

    #[test]
    fn test_retroactive_hour_stage_discarded() {
        // 2h task, "6 hours before" would land before creation
        let task = task_with(0, 2, vec![6.0], vec![]);
        assert!(plan_stages(&task).is_empty());
    }

    #[test]
    fn test_percent_bounds_discarded() {
        let task = task_with(0, 4, vec![], vec![0.0, 50.0, 100.0]);
        let stages = plan_stages(&task);
        // 0% lands on created_at, 100% on due_date — both invalid
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].stage.label(), "percent_50");
    }

    #[test]
    fn test_fractional_hours() {
        let task = task_with(0, 2, vec![0.5], vec![]);
        let stages = plan_stages(&task);
        assert_eq!(stages.len(), 1);
        assert_eq!(
            stages[0].trigger_time,
            task.due_date - Duration::minutes(30)
        );
    }

    #[test]
    fn test_eligibility_window_boundaries() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let tolerance = Duration::seconds(TOLERANCE_WINDOW_SECS);

        // 59s old: fires
        assert!(stage_is_eligible(now - Duration::seconds(59), now, tolerance));
        // exactly at the window edge: missed
        assert!(!stage_is_eligible(now - Duration::seconds(60), now, tolerance));
        // 61s old: missed
        assert!(!stage_is_eligible(now - Duration::seconds(61), now, tolerance));
        // still in the future: not yet
        assert!(!stage_is_eligible(now + Duration::seconds(1), now, tolerance));
        // exactly now: fires
        assert!(stage_is_eligible(now, now, tolerance));
    }
}
