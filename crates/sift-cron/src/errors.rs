//! Scheduler error types.

use sift_core::JobId;
use thiserror::Error;

/// Errors from job registration and triggering.
#[derive(Debug, Error)]
pub enum CronError {
    /// The job already has an active run.
    #[error("job {0} is already running")]
    AlreadyRunning(JobId),
    /// No job with this id is registered.
    #[error("unknown job {0}")]
    UnknownJob(JobId),
    /// A job with this id is already registered.
    #[error("duplicate job {0}")]
    DuplicateJob(JobId),
    /// Cadence settings could not be turned into a schedule.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
    /// A state change that the job lifecycle does not allow.
    #[error("job {job}: cannot {action} while {phase}")]
    InvalidTransition {
        /// Job id.
        job: JobId,
        /// Attempted action.
        action: &'static str,
        /// Current phase name.
        phase: &'static str,
    },
}

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, CronError>;
