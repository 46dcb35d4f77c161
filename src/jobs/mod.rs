pub mod lock;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod store;

use thiserror::Error;
use uuid::Uuid;

use crate::database::DatabaseError;

pub use lock::{JobLock, JOB_LOCK_KEY};
pub use registry::{JobRegistry, JobSnapshot, JobTicket, ProgressReporter, ScopedProgress};
pub use state::{JobKind, JobStatus};
pub use store::{Operation, OperationStore};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    Busy(String),

    #[error("operation {id} is {actual}, expected {expected}")]
    Conflict {
        id: Uuid,
        expected: JobStatus,
        actual: JobStatus,
    },

    #[error("illegal operation transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("operation {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}
