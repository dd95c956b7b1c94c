//! Tick loop — invokes the engine on a fixed cadence with single-flight
//! protection: a tick that finds the previous run still going skips entirely
//! rather than queuing or overlapping. The lock on the engine is the running
//! guard; it lives here, is created at process start, and is never persisted.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::dispatch::NotificationSink;
use crate::engine::ReminderEngine;
use crate::store::ReminderStore;

/// Attempt one guarded tick. Returns false when a run was already in
/// progress and this tick was skipped.
pub async fn try_tick<S, N>(
    engine: &Arc<Mutex<ReminderEngine<S, N>>>,
    now: chrono::DateTime<Utc>,
) -> bool
where
    S: ReminderStore + Send,
    N: NotificationSink + Send,
{
    match engine.try_lock() {
        Ok(mut eng) => {
            eng.run_once(now).await;
            true
        }
        Err(_) => {
            tracing::warn!("⏭️ Previous reminder run still in progress, skipping this tick");
            false
        }
    }
}

/// Run the reminder loop forever. A hung run delays nothing: subsequent ticks
/// are skipped by the guard until it resolves.
pub async fn run_reminder_loop<S, N>(engine: Arc<Mutex<ReminderEngine<S, N>>>, interval_secs: u64)
where
    S: ReminderStore + Send,
    N: NotificationSink + Send,
{
    tracing::info!("⏰ Reminder loop started (tick every {interval_secs}s)");
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;
        try_tick(&engine, Utc::now()).await;
    }
}
