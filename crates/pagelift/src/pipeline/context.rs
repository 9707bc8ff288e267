use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::broadcast::{JobPatch, JobRegistry};

/// Handle a runner uses to report on one job.
pub struct JobContext {
    id: String,
    registry: Arc<JobRegistry>,
    token: CancellationToken,
}

impl JobContext {
    pub fn new(id: impl Into<String>, registry: Arc<JobRegistry>, token: CancellationToken) -> Self {
        Self {
            id: id.into(),
            registry,
            token,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Checked before a job starts and after every page or file.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Applies `patch` unless the job has been cancelled or removed.
    pub fn update(&self, patch: JobPatch) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.registry.update(&self.id, patch)
    }
}

/// How a runner finished when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
}
