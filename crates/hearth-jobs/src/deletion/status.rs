use anyhow::Result;

use hearth_db::Database;
use hearth_db::models::DeletionOperationRow;
use hearth_db::queries::deletions::latest_deletion_for_target;

/// Latest deletion of `target_id`, in any status, if `requester_id` started it.
///
/// Someone else's operation is reported as absent rather than forbidden so
/// the call does not reveal that a deletion exists.
pub fn get_status(db: &Database, target_id: &str, requester_id: &str) -> Result<Option<DeletionOperationRow>> {
    db.with_conn(|conn| {
        Ok(latest_deletion_for_target(conn, target_id, None)?.filter(|op| op.requester_id == requester_id))
    })
}
