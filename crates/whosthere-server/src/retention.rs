//! Background task that expires overdue sessions and evicts finished ones.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use whosthere_session::SessionTracker;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub expired: usize,
    pub evicted: usize,
}

/// Runs one sweep over the tracker.
pub fn sweep_once(tracker: &SessionTracker, retention: Duration) -> SweepStats {
    let stats = SweepStats {
        expired: tracker.expire_overdue(),
        evicted: tracker.evict_terminal(retention),
    };

    if stats.expired > 0 || stats.evicted > 0 {
        tracing::info!(
            expired = stats.expired,
            evicted = stats.evicted,
            remaining = tracker.len(),
            "session sweep"
        );
    } else {
        tracing::debug!("session sweep found nothing to do");
    }
    stats
}

/// Starts a background task that sweeps the tracker every `interval`.
///
/// This task runs indefinitely.
pub async fn start_sweep_task(tracker: Arc<SessionTracker>, interval: Duration, retention: Duration) {
    tracing::info!(
        interval_seconds = interval.as_secs(),
        retention_seconds = retention.as_secs(),
        "starting session sweep task"
    );

    loop {
        sleep(interval).await;
        sweep_once(&tracker, retention);
    }
}
