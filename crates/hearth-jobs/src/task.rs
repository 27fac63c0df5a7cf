use anyhow::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::debug;

use hearth_db::now_ms;
use hearth_db::queries::scheduled::enqueue_task;

/// Deferred callbacks the worker knows how to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Task {
    /// Run one bounded batch of a cascading deletion.
    DeletionStep { operation_id: String },
}

impl Task {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DeletionStep { .. } => "deletion_step",
        }
    }
}

/// Schedule `task` to run after `delay_ms`, on the caller's connection.
///
/// Call this inside the transaction whose effects the task depends on: the
/// task becomes visible to the worker exactly when that transaction commits.
pub fn schedule(conn: &Connection, task: &Task, delay_ms: i64) -> Result<String> {
    let now = now_ms();
    let payload = serde_json::to_string(task)?;
    let id = enqueue_task(conn, task.kind(), &payload, now + delay_ms.max(0), now)?;
    debug!("Scheduled {} task {} (delay {}ms)", task.kind(), id, delay_ms);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let task = Task::DeletionStep { operation_id: "op-1".into() };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["type"], "DeletionStep");
        assert_eq!(json["data"]["operation_id"], "op-1");

        let back: Task = serde_json::from_value(json).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn test_schedule_is_transactional() {
        let db = hearth_db::Database::open_in_memory().unwrap();
        let task = Task::DeletionStep { operation_id: "op-1".into() };

        let aborted = db.with_tx(|conn| -> Result<()> {
            schedule(conn, &task, 0)?;
            Err(anyhow::anyhow!("step failed"))
        });
        assert!(aborted.is_err());
        assert_eq!(db.pending_task_count().unwrap(), 0);

        db.with_tx(|conn| schedule(conn, &task, 0)).unwrap();
        assert_eq!(db.pending_task_count().unwrap(), 1);
    }
}
