//! Pass lifecycle: active -> completed -> expired -> deleted.
//!
//! Progress events move a pass from active to completed; the periodic
//! [`sweep`](LifecycleManager::sweep) performs the time-based transitions.
//! Writes are optimistic compare-and-swaps on status, so overlapping
//! sweeps and live progress updates never double-process a pass.

mod manager;
mod sweep;

pub use manager::{LifecycleManager, LifecyclePolicy, NotifyOutcome, ProgressOutcome};
pub use sweep::{SweepOptions, SweepReport, spawn_sweep_loop};

use crate::storage::{DatabaseError, PassStatus};

/// Errors surfaced by lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Pass not found: {0}")]
    NotFound(String),

    #[error("Pass {pass_id} is {status}, not active")]
    NotActive { pass_id: String, status: PassStatus },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(DatabaseError),
}

impl From<DatabaseError> for LifecycleError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(what) => Self::NotFound(what),
            other => Self::Storage(other),
        }
    }
}
