//! In-memory job registry: the single source of truth for job records.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::broadcast::job_progress::{
    JobEvent, JobPatch, JobProgressBroadcaster, JobRecord, JobStatus,
};

struct Entry {
    record: JobRecord,
    token: CancellationToken,
}

/// Ordered map from job id to record, plus one cancellation token per job.
///
/// Every mutation is broadcast as a [`JobEvent`]. Missing ids are a no-op
/// for every operation.
pub struct JobRegistry {
    entries: RwLock<Vec<Entry>>,
    broadcaster: JobProgressBroadcaster,
}

impl JobRegistry {
    pub fn new(broadcaster: JobProgressBroadcaster) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            broadcaster,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(JobProgressBroadcaster::new(capacity))
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Entry>> {
        match self.entries.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Entry>> {
        match self.entries.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Appends a record and returns the token that cancels its processing.
    pub fn create(&self, record: JobRecord) -> CancellationToken {
        let token = CancellationToken::new();
        let mut entries = self.write();
        self.broadcaster.send(JobEvent::Created {
            job: record.clone(),
        });
        entries.push(Entry {
            record,
            token: token.clone(),
        });
        token
    }

    /// Merges `patch` into the record. Returns false if the job is gone or
    /// has been cancelled.
    pub fn update(&self, id: &str, patch: JobPatch) -> bool {
        let mut entries = self.write();
        let Some(entry) = entries.iter_mut().find(|e| e.record.id == id) else {
            return false;
        };
        if entry.token.is_cancelled() {
            return false;
        }
        patch.apply_to(&mut entry.record);
        self.broadcaster.send(JobEvent::Updated {
            job: entry.record.clone(),
        });
        true
    }

    /// Deletes the record and cancels any processing still running for it.
    pub fn remove(&self, id: &str) -> Option<JobRecord> {
        let mut entries = self.write();
        let index = entries.iter().position(|e| e.record.id == id)?;
        let entry = entries.remove(index);
        entry.token.cancel();
        self.broadcaster.send(JobEvent::Removed {
            job_id: entry.record.id.clone(),
        });
        Some(entry.record)
    }

    /// Stops processing but keeps the record visible as a cancelled error.
    pub fn cancel(&self, id: &str) -> bool {
        let mut entries = self.write();
        let Some(entry) = entries.iter_mut().find(|e| e.record.id == id) else {
            return false;
        };
        if entry.token.is_cancelled() {
            return false;
        }
        if !entry.record.is_finished() {
            JobPatch::new()
                .status(JobStatus::Error)
                .message("Cancelled")
                .apply_to(&mut entry.record);
            self.broadcaster.send(JobEvent::Updated {
                job: entry.record.clone(),
            });
        }
        entry.token.cancel();
        true
    }

    /// Removes every job that finished successfully. Returns how many went.
    pub fn clear_finished(&self) -> usize {
        let mut entries = self.write();
        let before = entries.len();
        let broadcaster = &self.broadcaster;
        entries.retain(|e| {
            if e.record.status == JobStatus::Done {
                broadcaster.send(JobEvent::Removed {
                    job_id: e.record.id.clone(),
                });
                false
            } else {
                true
            }
        });
        before - entries.len()
    }

    pub fn is_alive(&self, id: &str) -> bool {
        self.read().iter().any(|e| e.record.id == id)
    }

    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.read()
            .iter()
            .find(|e| e.record.id == id)
            .map(|e| e.record.clone())
    }

    /// Snapshot of every record in insertion order.
    pub fn list(&self) -> Vec<JobRecord> {
        self.read().iter().map(|e| e.record.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Jobs not yet `done` (errors count as active until removed).
    pub fn active_count(&self) -> usize {
        self.read()
            .iter()
            .filter(|e| e.record.status != JobStatus::Done)
            .count()
    }

    pub fn has_finished(&self) -> bool {
        self.read()
            .iter()
            .any(|e| e.record.status == JobStatus::Done)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.broadcaster.subscribe()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(JobProgressBroadcaster::default())
    }
}
