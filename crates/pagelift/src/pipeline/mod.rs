//! Per-job processing: validate, enumerate pages or files, name them,
//! upload them and report progress on the job record.

pub mod context;
pub mod error;
pub mod runner;

pub use context::{JobContext, Outcome};
pub use error::PipelineError;
pub use runner::JobRunner;
