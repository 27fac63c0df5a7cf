//! At-least-once executor for `scheduled_tasks`.
//!
//! A task is claimed under a lease, run, and only then acknowledged in a
//! separate transaction. A crash or lease expiry between the handler's
//! commit and the ack delivers the task again, which is why every handler
//! must tolerate running twice.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, error, warn};

use hearth_db::models::ScheduledTaskRow;
use hearth_db::queries::scheduled::{claim_due_tasks, complete_task, fail_task};
use hearth_db::{Database, now_ms};

use crate::deletion::{BatchLimits, run_step};
use crate::task::Task;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    /// Tasks claimed per round.
    pub batch_size: usize,
    pub lease: Duration,
    /// Attempts before a task is parked as `failed`.
    pub max_attempts: i64,
    /// Retry delay grows linearly: `retry_backoff * attempts`.
    pub retry_backoff: Duration,
    pub limits: BatchLimits,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            batch_size: 16,
            lease: Duration::from_secs(30),
            max_attempts: 8,
            retry_backoff: Duration::from_secs(1),
            limits: BatchLimits::default(),
        }
    }
}

/// Run one round of due tasks. Returns how many were claimed.
pub fn run_due_tasks(db: &Database, config: &WorkerConfig) -> Result<usize> {
    let now = now_ms();
    let claimed = db.with_tx(|conn| {
        claim_due_tasks(conn, now, config.lease.as_millis() as i64, config.batch_size)
    })?;

    for task in &claimed {
        match execute(db, task, config) {
            Ok(()) => {
                db.with_tx(|conn| complete_task(conn, &task.id))?;
            }
            Err(e) => {
                let message = format!("{:#}", e);
                let retry_at = if task.attempts >= config.max_attempts {
                    error!(
                        "Task {} ({}) failed for good after {} attempts: {}",
                        task.id, task.kind, task.attempts, message
                    );
                    None
                } else {
                    warn!(
                        "Task {} ({}) failed on attempt {}: {}",
                        task.id, task.kind, task.attempts, message
                    );
                    Some(now_ms() + config.retry_backoff.as_millis() as i64 * task.attempts)
                };
                db.with_tx(|conn| fail_task(conn, &task.id, &message, retry_at))?;
            }
        }
    }

    Ok(claimed.len())
}

/// Run rounds until nothing is due or `max_rounds` is reached. Returns the
/// total number of tasks claimed.
pub fn drain(db: &Database, config: &WorkerConfig, max_rounds: usize) -> Result<usize> {
    let mut total = 0;
    for _ in 0..max_rounds {
        let ran = run_due_tasks(db, config)?;
        if ran == 0 {
            break;
        }
        total += ran;
    }
    Ok(total)
}

fn execute(db: &Database, row: &ScheduledTaskRow, config: &WorkerConfig) -> Result<()> {
    let task: Task = serde_json::from_str(&row.payload)
        .map_err(|e| anyhow!("Undecodable {} payload: {}", row.kind, e))?;

    match task {
        Task::DeletionStep { operation_id } => {
            let outcome = run_step(db, &operation_id, &config.limits)?;
            debug!("Deletion step {} -> {:?}", operation_id, outcome);
        }
    }
    Ok(())
}

/// Poll for due tasks forever. Each tick drains on the blocking pool so the
/// runtime never waits on SQLite.
pub async fn run_worker_loop(db: Arc<Database>, config: WorkerConfig) {
    let mut interval = tokio::time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let db = db.clone();
        let round_config = config.clone();
        match tokio::task::spawn_blocking(move || drain(&db, &round_config, 64)).await {
            Ok(Ok(count)) => {
                if count > 0 {
                    debug!("Worker: ran {} tasks", count);
                }
            }
            Ok(Err(e)) => warn!("Worker error: {}", e),
            Err(e) => error!("Worker round panicked: {}", e),
        }
    }
}
