use tracing::info;

use hearth_db::models::DeletionOperationRow;
use hearth_db::queries::deletions::{insert_deletion_operation, latest_deletion_for_target};
use hearth_db::{Database, now_ms};
use hearth_types::models::DeletionStatus;

use crate::authz::{require_owner, require_owner_or_creator};
use crate::deletion::DeletionTarget;
use crate::error::DeletionResult;
use crate::task::{Task, schedule};

/// Start a cascading deletion of `target`, or rejoin the one already running.
///
/// Authorization runs first and aborts the call before anything is written.
/// If an `in_progress` operation exists for the target its current snapshot
/// is returned untouched, so a repeated click or a retried request never
/// spawns a second cascade. Otherwise a fresh operation is inserted and its
/// first step scheduled with zero delay, all in one transaction.
pub fn request_deletion(
    db: &Database,
    target: &DeletionTarget,
    requester_id: &str,
) -> DeletionResult<DeletionOperationRow> {
    db.with_tx(|conn| {
        let (server_id, channel_id) = match target {
            DeletionTarget::Server { server_id } => {
                require_owner(conn, server_id, requester_id)?;
                (server_id.clone(), None)
            }
            DeletionTarget::Channel { channel_id } => {
                let channel = require_owner_or_creator(conn, channel_id, requester_id)?;
                (channel.server_id, Some(channel_id.as_str()))
            }
        };

        if let Some(existing) = latest_deletion_for_target(conn, target.id(), Some(DeletionStatus::InProgress))? {
            info!(
                "Rejoined deletion {} of {} {} ({} rows deleted so far)",
                existing.id,
                target.kind(),
                target.id(),
                existing.total_deleted()
            );
            return Ok(existing);
        }

        let op = insert_deletion_operation(conn, target.kind(), requester_id, &server_id, channel_id, now_ms())?;
        schedule(conn, &Task::DeletionStep { operation_id: op.id.clone() }, 0)?;

        info!("Started deletion {} of {} {} for {}", op.id, target.kind(), target.id(), requester_id);
        Ok(op)
    })
}
