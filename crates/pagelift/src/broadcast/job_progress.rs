//! Job records and the broadcaster that streams their changes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Status of a job. Only ever moves forward:
/// `pending -> scanning -> uploading -> done | error`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Scanning,
    Uploading,
    Done,
    Error,
}

impl JobStatus {
    fn rank(self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Scanning => 1,
            JobStatus::Uploading => 2,
            JobStatus::Done | JobStatus::Error => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    /// Re-asserting the current status is allowed; anything backward is not.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        if self == next {
            return true;
        }
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Scanning => write!(f, "scanning"),
            JobStatus::Uploading => write!(f, "uploading"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    File,
    Folder,
}

/// One user-submitted upload unit as shown to observers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    /// Display name (file, folder or dropped entry name).
    pub name: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    /// Pages or files completed so far.
    pub progress: usize,
    /// Expected page or file count; 0 while unknown.
    pub total: usize,
    /// Human-readable current activity.
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Creates a pending record with a fresh id.
    pub fn new(name: &str, job_type: JobType, total: usize) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            job_type,
            status: JobStatus::Pending,
            progress: 0,
            total,
            message: "Waiting...".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Partial changes merged into a [`JobRecord`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<usize>,
    pub total: Option<usize>,
    pub message: Option<String>,
}

impl JobPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: usize) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn total(mut self, total: usize) -> Self {
        self.total = Some(total);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Merges into `record`. Backward status moves are dropped and
    /// `progress` never exceeds a known, non-zero `total`.
    pub(crate) fn apply_to(self, record: &mut JobRecord) {
        if let Some(status) = self.status {
            if record.status.can_advance_to(status) {
                record.status = status;
            } else {
                log::debug!(
                    "Ignoring status change {} -> {} for job {}",
                    record.status,
                    status,
                    record.id
                );
            }
        }
        if let Some(total) = self.total {
            record.total = total;
        }
        if let Some(progress) = self.progress {
            record.progress = progress;
        }
        if record.total > 0 && record.progress > record.total {
            record.progress = record.total;
        }
        if let Some(message) = self.message {
            record.message = message;
        }
        record.updated_at = Utc::now();
    }
}

/// Change notification emitted by the job registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Created { job: JobRecord },
    Updated { job: JobRecord },
    Removed { job_id: String },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Created { job } | JobEvent::Updated { job } => &job.id,
            JobEvent::Removed { job_id } => job_id,
        }
    }
}

/// Broadcasts job events for streaming.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobEvent>>,
}

impl JobProgressBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers.
    pub fn send(&self, event: JobEvent) {
        // Ignore errors - no active receivers is fine
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber for job events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_moves_forward_only() {
        assert!(JobStatus::Pending.can_advance_to(JobStatus::Scanning));
        assert!(JobStatus::Pending.can_advance_to(JobStatus::Uploading));
        assert!(JobStatus::Scanning.can_advance_to(JobStatus::Error));
        assert!(JobStatus::Uploading.can_advance_to(JobStatus::Uploading));
        assert!(!JobStatus::Uploading.can_advance_to(JobStatus::Scanning));
        assert!(!JobStatus::Done.can_advance_to(JobStatus::Error));
        assert!(!JobStatus::Error.can_advance_to(JobStatus::Done));
    }

    #[test]
    fn test_new_record_is_pending() {
        let record = JobRecord::new("Vol1.cbz", JobType::File, 1);
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.progress, 0);
        assert_eq!(record.total, 1);
        assert_eq!(record.message, "Waiting...");
        assert!(!record.is_finished());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = JobRecord::new("a", JobType::File, 1);
        let b = JobRecord::new("a", JobType::File, 1);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_patch_clamps_progress() {
        let mut record = JobRecord::new("Vol1.cbz", JobType::File, 1);
        JobPatch::new().total(3).progress(5).apply_to(&mut record);
        assert_eq!(record.total, 3);
        assert_eq!(record.progress, 3);
    }

    #[test]
    fn test_patch_ignores_backward_status() {
        let mut record = JobRecord::new("Vol1.cbz", JobType::File, 1);
        JobPatch::new()
            .status(JobStatus::Done)
            .message("Completed")
            .apply_to(&mut record);
        JobPatch::new()
            .status(JobStatus::Uploading)
            .message("late")
            .apply_to(&mut record);
        assert_eq!(record.status, JobStatus::Done);
        assert_eq!(record.message, "late");
    }

    #[test]
    fn test_broadcaster_send_receive() {
        let broadcaster = JobProgressBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();

        let job = JobRecord::new("test.png", JobType::File, 1);
        let id = job.id.clone();
        broadcaster.send(JobEvent::Created { job });

        let received = rx.try_recv().unwrap();
        assert_eq!(received.job_id(), id);
    }

    #[test]
    fn test_event_serialization() {
        let event = JobEvent::Removed {
            job_id: "job-1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "removed");
        assert_eq!(json["job_id"], "job-1");

        let job = JobRecord::new("Vol1", JobType::Folder, 2);
        let json = serde_json::to_value(JobEvent::Created { job }).unwrap();
        assert_eq!(json["job"]["type"], "folder");
        assert_eq!(json["job"]["status"], "pending");
    }
}
