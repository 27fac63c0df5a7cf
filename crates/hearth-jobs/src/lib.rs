//! Background work for the Hearth server: the resumable cascading-deletion
//! engine and the at-least-once task worker that drives it.

pub mod authz;
pub mod cleanup;
pub mod deletion;
pub mod error;
pub mod task;
pub mod worker;

pub use deletion::{BatchLimits, DeletionTarget};
pub use error::DeletionError;
