use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeletionError {
    /// The requester may not delete this target. Nothing was written.
    #[error("permission denied: {0}")]
    Permission(String),

    /// The target does not exist (or no longer exists).
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type DeletionResult<T> = std::result::Result<T, DeletionError>;
