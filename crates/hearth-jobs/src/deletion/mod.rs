//! Resumable cascading deletion of servers and channels.
//!
//! A deletion is a persisted operation record plus a chain of scheduled
//! steps. Each step deletes one bounded batch inside one transaction and
//! schedules its successor in that same transaction, so a crash between
//! steps loses nothing and a duplicated step re-derives its work from the
//! rows that still exist.

pub mod controller;
pub mod status;
pub mod step;

use hearth_db::models::DeletionOperationRow;
use hearth_types::api::DeletionStatusResponse;
use hearth_types::models::DeletionTargetKind;

pub use controller::request_deletion;
pub use status::get_status;
pub use step::{StepOutcome, run_step};

/// Per-step work bounds. Any values well under what one SQLite transaction
/// comfortably handles keep the engine correct; they only trade step count
/// against step latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub messages_per_step: usize,
    /// Channels scanned for messages per step; also the most channels one
    /// step deletes.
    pub channels_per_step: usize,
    pub memberships_per_step: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            messages_per_step: 200,
            channels_per_step: 40,
            memberships_per_step: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionTarget {
    Server { server_id: String },
    Channel { channel_id: String },
}

impl DeletionTarget {
    pub fn kind(&self) -> DeletionTargetKind {
        match self {
            Self::Server { .. } => DeletionTargetKind::Server,
            Self::Channel { .. } => DeletionTargetKind::Channel,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Server { server_id } => server_id,
            Self::Channel { channel_id } => channel_id,
        }
    }
}

/// Client-facing snapshot; identical for the start call and status polls.
pub fn snapshot(op: &DeletionOperationRow) -> DeletionStatusResponse {
    DeletionStatusResponse {
        ok: true,
        operation_id: op.id.clone(),
        target_kind: op.target_kind,
        server_id: op.server_id.clone(),
        channel_id: op.channel_id.clone(),
        status: op.status,
        deleted_messages: op.deleted_messages,
        deleted_channels: op.deleted_channels,
        deleted_memberships: op.deleted_memberships,
        deleted_servers: op.deleted_servers,
        created_at: op.created_at,
        updated_at: op.updated_at,
        completed_at: op.completed_at,
    }
}
