//! # sift-cron
//!
//! Timezone-aware job scheduling for the digest pipeline.
//!
//! - [`Schedule`]: daily, weekly and fixed-interval cadences with explicit
//!   DST handling
//! - [`JobRegistry`]: per-job lifecycle (`Idle → Running → Succeeded|Failed`)
//!   that refuses a second concurrent run of the same job
//! - [`Scheduler`]: the sleep/fire loop, manual triggers and graceful drain
//!
//! The scheduler knows nothing about digests. It drives any [`JobRunner`].

#![deny(unsafe_code)]

pub mod errors;
pub mod registry;
pub mod schedule;
pub mod scheduler;

pub use errors::{CronError, Result};
pub use registry::{JobPhase, JobRegistry, JobState};
pub use schedule::{Schedule, resolve_local};
pub use scheduler::{Clock, JobRunner, RunHandle, Scheduler, SystemClock, TokioClock, TriggerOutcome};
