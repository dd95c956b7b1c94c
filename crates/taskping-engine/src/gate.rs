//! Anti-flood gate — minimum spacing between two reminders for one task.
//!
//! The planner decides *which* stage is due; this gate decides whether firing
//! is *permitted* right now. Keeping the two apart means a 1h-before and a
//! 30m-before stage on a 90-minute task cannot produce two messages in quick
//! succession, without the planner knowing anything about send history.

use chrono::{DateTime, Duration, Utc};

/// Gap applied when a task sets no gap of its own (or sets it to zero).
pub const DEFAULT_MIN_GAP_MINUTES: u32 = 58;

/// The gap this task actually enforces.
pub fn effective_gap_minutes(min_gap_minutes: Option<u32>, default_gap: u32) -> u32 {
    match min_gap_minutes {
        Some(gap) if gap > 0 => gap,
        _ => default_gap,
    }
}

/// Whether a reminder may fire now. Always allowed when nothing has been sent
/// yet; otherwise the elapsed time since the last send must meet the gap.
pub fn gate_allows(
    last_reminder_sent_at: Option<DateTime<Utc>>,
    min_gap_minutes: Option<u32>,
    default_gap: u32,
    now: DateTime<Utc>,
) -> bool {
    let Some(last) = last_reminder_sent_at else {
        return true;
    };
    let gap = Duration::minutes(effective_gap_minutes(min_gap_minutes, default_gap) as i64);
    now - last >= gap
}
