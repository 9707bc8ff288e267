//! Job records, the registry holding them, and change broadcasting.
//!
//! Observers (the CLI, or any other front end) subscribe to [`JobEvent`]s
//! to render live progress.

pub mod job_progress;
pub mod job_store;

pub use job_progress::{
    JobEvent, JobPatch, JobProgressBroadcaster, JobRecord, JobStatus, JobType,
};
pub use job_store::JobRegistry;
