use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use hearth_db::{Database, now_ms};

/// Rows removed per table per batch.
const CLEANUP_BATCH: usize = 500;
/// Batches per table per pass; the rest waits for the next tick.
const MAX_BATCHES: usize = 20;
/// Rate-limit counters untouched this long are dead weight.
const RATE_LIMIT_RETENTION_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub sessions: usize,
    pub rate_limits: usize,
}

/// Background task that prunes expired sessions and stale rate-limit counters.
pub async fn run_cleanup_loop(db: Arc<Database>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let db = db.clone();
        match tokio::task::spawn_blocking(move || cleanup_expired(&db, now_ms())).await {
            Ok(Ok(report)) => {
                if report.sessions > 0 || report.rate_limits > 0 {
                    info!(
                        "Cleanup: pruned {} expired sessions, {} stale rate limits",
                        report.sessions, report.rate_limits
                    );
                }
            }
            Ok(Err(e)) => warn!("Cleanup error: {}", e),
            Err(e) => warn!("Cleanup task panicked: {}", e),
        }
    }
}

/// One bounded pass. Each batch is its own transaction so the connection is
/// never held for long.
pub fn cleanup_expired(db: &Database, now: i64) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();

    for _ in 0..MAX_BATCHES {
        let n = db.delete_expired_sessions(now, CLEANUP_BATCH)?;
        report.sessions += n;
        if n < CLEANUP_BATCH {
            break;
        }
    }

    let cutoff = now - RATE_LIMIT_RETENTION_MS;
    for _ in 0..MAX_BATCHES {
        let n = db.delete_stale_rate_limits(cutoff, CLEANUP_BATCH)?;
        report.rate_limits += n;
        if n < CLEANUP_BATCH {
            break;
        }
    }

    Ok(report)
}
