use anyhow::Result;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use hearth_db::models::DeletionOperationRow;
use hearth_db::queries::channels::{channel_ids_in_server, query_channel};
use hearth_db::queries::deletions::{query_deletion_operation, save_deletion_progress};
use hearth_db::queries::messages::{message_ids_in_channel, message_ids_in_server};
use hearth_db::queries::servers::{membership_ids_in_server, query_server};
use hearth_db::{Database, delete_rows, now_ms};
use hearth_types::models::{DeletionStatus, DeletionTargetKind};

use crate::deletion::BatchLimits;
use crate::task::{Task, schedule};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A batch was deleted and the next step scheduled.
    Continue,
    /// This step finished the operation.
    Completed,
    /// The operation was already terminal; nothing changed.
    AlreadyCompleted,
    /// No operation with that id exists.
    Missing,
}

/// Run one bounded batch of deletion `operation_id`.
///
/// Everything happens in a single transaction: the rows deleted, the counter
/// bump, and the scheduling of the next step commit together. Each tier asks
/// the store what remains instead of trusting counters, so running the same
/// step twice only ever finds less work.
pub fn run_step(db: &Database, operation_id: &str, limits: &BatchLimits) -> Result<StepOutcome> {
    db.with_tx(|conn| {
        let Some(mut op) = query_deletion_operation(conn, operation_id)? else {
            warn!("Deletion step for unknown operation {}", operation_id);
            return Ok(StepOutcome::Missing);
        };

        if op.status.is_terminal() {
            debug!("Deletion {} already completed; step is a no-op", op.id);
            return Ok(StepOutcome::AlreadyCompleted);
        }

        let outcome = match op.target_kind {
            DeletionTargetKind::Server => server_step(conn, &mut op, limits)?,
            DeletionTargetKind::Channel => channel_step(conn, &mut op, limits)?,
        };

        op.updated_at = now_ms();
        if outcome == StepOutcome::Completed {
            op.status = DeletionStatus::Completed;
            op.completed_at = Some(op.updated_at);
        }
        save_deletion_progress(conn, &op)?;

        match outcome {
            StepOutcome::Continue => {
                schedule(conn, &Task::DeletionStep { operation_id: op.id.clone() }, 0)?;
            }
            _ => info!(
                "Deletion {} of {} {} completed: {} messages, {} channels, {} memberships, {} servers",
                op.id,
                op.target_kind,
                op.target_id(),
                op.deleted_messages,
                op.deleted_channels,
                op.deleted_memberships,
                op.deleted_servers
            ),
        }
        Ok(outcome)
    })
}

fn server_step(conn: &Connection, op: &mut DeletionOperationRow, limits: &BatchLimits) -> Result<StepOutcome> {
    if query_server(conn, &op.server_id)?.is_none() {
        info!("Server {} already gone; finishing deletion {}", op.server_id, op.id);
        return Ok(StepOutcome::Completed);
    }

    let message_ids = message_ids_in_server(conn, &op.server_id, limits.messages_per_step)?;
    if !message_ids.is_empty() {
        let deleted = delete_rows(conn, "messages", &message_ids)?;
        op.deleted_messages += deleted as i64;
        debug!("Deletion {}: removed {} messages", op.id, deleted);
        return Ok(StepOutcome::Continue);
    }

    // No channel of this server holds a message as of this transaction.
    let channel_ids = channel_ids_in_server(conn, &op.server_id, limits.channels_per_step)?;
    if !channel_ids.is_empty() {
        let deleted = delete_rows(conn, "channels", &channel_ids)?;
        op.deleted_channels += deleted as i64;
        debug!("Deletion {}: removed {} channels", op.id, deleted);
        return Ok(StepOutcome::Continue);
    }

    let membership_ids = membership_ids_in_server(conn, &op.server_id, limits.memberships_per_step)?;
    if !membership_ids.is_empty() {
        let deleted = delete_rows(conn, "memberships", &membership_ids)?;
        op.deleted_memberships += deleted as i64;
        debug!("Deletion {}: removed {} memberships", op.id, deleted);
        return Ok(StepOutcome::Continue);
    }

    let deleted = delete_rows(conn, "servers", std::slice::from_ref(&op.server_id))?;
    op.deleted_servers += deleted as i64;
    Ok(StepOutcome::Completed)
}

fn channel_step(conn: &Connection, op: &mut DeletionOperationRow, limits: &BatchLimits) -> Result<StepOutcome> {
    let Some(channel_id) = op.channel_id.clone() else {
        warn!("Channel deletion {} has no channel id; finishing", op.id);
        return Ok(StepOutcome::Completed);
    };

    if query_channel(conn, &channel_id)?.is_none() {
        info!("Channel {} already gone; finishing deletion {}", channel_id, op.id);
        return Ok(StepOutcome::Completed);
    }

    let message_ids = message_ids_in_channel(conn, &channel_id, limits.messages_per_step)?;
    if !message_ids.is_empty() {
        let deleted = delete_rows(conn, "messages", &message_ids)?;
        op.deleted_messages += deleted as i64;
        debug!("Deletion {}: removed {} messages", op.id, deleted);
        return Ok(StepOutcome::Continue);
    }

    let deleted = delete_rows(conn, "channels", std::slice::from_ref(&channel_id))?;
    op.deleted_channels += deleted as i64;
    Ok(StepOutcome::Completed)
}
