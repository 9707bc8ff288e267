//! The upload engine: submission entry points on top of the job registry,
//! the execution queue and the job runner.

use std::future::Future;
use std::sync::{Arc, RwLock};

use log::{debug, info};
use tokio::sync::broadcast;

use crate::broadcast::{JobEvent, JobPatch, JobRecord, JobRegistry, JobStatus, JobType};
use crate::config::Config;
use crate::error::{DecodeError, Result};
use crate::naming::{natural_cmp, natural_sort_by_key, Destination};
use crate::pipeline::JobRunner;
use crate::processor::{RarEngine, RarEngineSlot};
use crate::storage::{HttpUploader, Uploader};
use crate::worker::entry::DroppedEntry;
use crate::worker::job::{Job, JobKind, SourceFile};
use crate::worker::queue::ExecutionQueue;

/// Accepts files, folders and dropped entries and uploads them one job at
/// a time.
///
/// Submissions return as soon as the job records exist; the work runs on
/// the execution queue in submission order.
pub struct UploadEngine {
    config: Config,
    registry: Arc<JobRegistry>,
    root: RwLock<String>,
    rar: RarEngineSlot,
    runner: JobRunner,
    queue: ExecutionQueue,
}

impl UploadEngine {
    /// # Panics
    /// Panics if called outside of a Tokio runtime.
    pub fn new(config: Config, uploader: Arc<dyn Uploader>) -> Self {
        let registry = Arc::new(JobRegistry::with_capacity(config.progress_capacity));
        let rar = RarEngineSlot::new();
        let runner = JobRunner::new(Arc::clone(&registry), uploader, rar.clone());

        Self {
            config,
            registry,
            root: RwLock::new(String::new()),
            rar,
            runner,
            queue: ExecutionQueue::new(),
        }
    }

    /// Builds an engine that posts to `config.endpoint`.
    pub fn from_config(config: Config) -> Result<Self> {
        let uploader = HttpUploader::from_config(&config)?;
        Ok(Self::new(config, Arc::new(uploader)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Changes the root used by later submissions. Queued jobs keep the
    /// root they were submitted with.
    pub fn set_destination_root(&self, root: impl Into<String>) {
        let root = root.into();
        debug!("Destination root set to '{}'", root);
        match self.root.write() {
            Ok(mut guard) => *guard = root,
            Err(poisoned) => *poisoned.into_inner() = root,
        }
    }

    pub fn destination_root(&self) -> String {
        match self.root.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn destination(&self) -> Destination {
        Destination::resolve(self.destination_root(), &self.config.naming)
    }

    /// Queues one job per file. Returns the new job ids in queue order.
    pub fn submit_files(&self, mut files: Vec<SourceFile>) -> Result<Vec<String>> {
        let destination = self.destination();
        natural_sort_by_key(&mut files, |f| f.name.as_str());

        let jobs = files
            .into_iter()
            .map(|file| {
                let name = file.name.clone();
                let kind = JobKind::for_file(file, &destination);
                (name, JobType::File, 1, kind)
            })
            .collect();

        self.submit(jobs, destination)
    }

    /// Queues one batch job per folder, named after the folder.
    pub fn submit_folders<I>(&self, folders: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = (String, Vec<SourceFile>)>,
    {
        let destination = self.destination();
        let mut folders: Vec<(String, Vec<SourceFile>)> = folders.into_iter().collect();
        folders.sort_by(|a, b| natural_cmp(&a.0, &b.0));

        let jobs = folders
            .into_iter()
            .map(|(name, files)| {
                let total = files.len();
                (name, JobType::Folder, total, JobKind::Batch(files))
            })
            .collect();

        self.submit(jobs, destination)
    }

    /// Queues one job per dropped entry. Totals start at 0 and are
    /// corrected once the job knows its size.
    pub fn submit_entries(&self, mut entries: Vec<DroppedEntry>) -> Result<Vec<String>> {
        let destination = self.destination();
        natural_sort_by_key(&mut entries, |e| e.name());

        let jobs = entries
            .into_iter()
            .map(|entry| match entry {
                DroppedEntry::File(file) => {
                    let name = file.name.clone();
                    let kind = JobKind::for_file(file.into_source(), &destination);
                    (name, JobType::File, 0, kind)
                }
                DroppedEntry::Directory(dir) => {
                    let name = dir.name().to_string();
                    (name, JobType::Folder, 0, JobKind::Directory(dir))
                }
            })
            .collect();

        self.submit(jobs, destination)
    }

    fn submit(
        &self,
        jobs: Vec<(String, JobType, usize, JobKind)>,
        destination: Destination,
    ) -> Result<Vec<String>> {
        let queued: Vec<Job> = jobs
            .into_iter()
            .map(|(name, job_type, total, kind)| {
                let record = JobRecord::new(&name, job_type, total);
                let id = record.id.clone();
                let token = self.registry.create(record);
                Job::new(id, name, kind, destination.clone(), token)
            })
            .collect();

        info!(
            "Queued {} jobs for '{}' ({:?})",
            queued.len(),
            destination.root(),
            destination.policy()
        );

        let mut ids = Vec::with_capacity(queued.len());
        let mut queued = queued.into_iter();
        while let Some(job) = queued.next() {
            let id = job.id.clone();
            let runner = self.runner.clone();
            if let Err(e) = self.queue.enqueue(async move { runner.run(job).await }) {
                // Nothing left in this submission will ever run.
                let message = e.to_string();
                for stranded in std::iter::once(id).chain(queued.map(|job| job.id)) {
                    self.registry.update(
                        &stranded,
                        JobPatch::new()
                            .status(JobStatus::Error)
                            .message(message.clone()),
                    );
                }
                return Err(e.into());
            }
            ids.push(id);
        }
        Ok(ids)
    }

    /// Deletes the job record and stops its processing. Unknown ids are
    /// ignored.
    pub fn remove(&self, id: &str) -> bool {
        self.registry.remove(id).is_some()
    }

    /// Stops the job but keeps its record, marked as cancelled.
    pub fn cancel(&self, id: &str) -> bool {
        self.registry.cancel(id)
    }

    /// Removes every `done` job. Returns how many were removed.
    pub fn clear_finished(&self) -> usize {
        self.registry.clear_finished()
    }

    pub fn jobs(&self) -> Vec<JobRecord> {
        self.registry.list()
    }

    pub fn job(&self, id: &str) -> Option<JobRecord> {
        self.registry.get(id)
    }

    pub fn active_count(&self) -> usize {
        self.registry.active_count()
    }

    pub fn has_finished(&self) -> bool {
        self.registry.has_finished()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.registry.subscribe()
    }

    pub fn is_processing(&self) -> bool {
        self.queue.is_processing()
    }

    /// Resolves once every job submitted so far has run.
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await
    }

    pub fn rar_engine(&self) -> &RarEngineSlot {
        &self.rar
    }

    /// Loads the rar engine once. Returns whether it is ready afterwards.
    pub async fn init_rar_engine<F, Fut>(&self, loader: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Arc<dyn RarEngine>, DecodeError>>,
    {
        self.rar.initialize(loader).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UploadError;
    use crate::storage::UploadItem;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        items: Mutex<Vec<UploadItem>>,
    }

    #[async_trait]
    impl Uploader for Recorder {
        async fn upload(&self, item: UploadItem) -> std::result::Result<(), UploadError> {
            self.items.lock().unwrap().push(item);
            Ok(())
        }
    }

    fn engine() -> (UploadEngine, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let engine = UploadEngine::new(
            Config::default_with_endpoint("http://localhost/upload"),
            Arc::clone(&recorder) as Arc<dyn Uploader>,
        );
        (engine, recorder)
    }

    #[tokio::test]
    async fn test_submit_files_sorts_and_sets_totals() {
        let (engine, _) = engine();
        engine.set_destination_root("docs");

        let ids = engine
            .submit_files(vec![
                SourceFile::in_memory("file10.txt", vec![1]),
                SourceFile::in_memory("file2.txt", vec![1]),
            ])
            .unwrap();
        assert_eq!(ids.len(), 2);

        let jobs = engine.jobs();
        assert_eq!(jobs[0].name, "file2.txt");
        assert_eq!(jobs[1].name, "file10.txt");
        assert!(jobs.iter().all(|j| j.total == 1 && j.job_type == JobType::File));

        engine.wait_idle().await;
        assert!(engine.jobs().iter().all(|j| j.status == JobStatus::Done));
    }

    #[tokio::test]
    async fn test_folder_totals_are_file_counts() {
        let (engine, _) = engine();
        let folders = vec![
            (
                "B".to_string(),
                vec![SourceFile::in_memory("1.txt", vec![1]).with_relative_path("B/1.txt")],
            ),
            ("A".to_string(), Vec::new()),
        ];

        engine.submit_folders(folders).unwrap();

        let jobs = engine.jobs();
        assert_eq!(jobs[0].name, "A");
        assert_eq!(jobs[0].total, 0);
        assert_eq!(jobs[1].total, 1);
        assert_eq!(jobs[1].job_type, JobType::Folder);
        engine.wait_idle().await;
    }

    #[tokio::test]
    async fn test_root_is_captured_at_submission() {
        let (engine, recorder) = engine();
        engine.set_destination_root("first");
        engine
            .submit_files(vec![SourceFile::in_memory("a.txt", vec![1])])
            .unwrap();
        engine.set_destination_root("second");

        engine.wait_idle().await;
        assert_eq!(recorder.items.lock().unwrap()[0].folder_path, "first");
        assert_eq!(engine.destination_root(), "second");
    }

    #[tokio::test]
    async fn test_clear_finished_and_counts() {
        let (engine, _) = engine();
        engine.set_destination_root("MAD/");
        engine
            .submit_files(vec![
                SourceFile::in_memory("cover.jpg", vec![1]),
                SourceFile::in_memory("notes.txt", vec![1]),
            ])
            .unwrap();
        engine.set_destination_root("docs");
        engine
            .submit_files(vec![SourceFile::in_memory("ok.txt", vec![1])])
            .unwrap();
        engine.wait_idle().await;

        assert!(engine.has_finished());
        assert_eq!(engine.active_count(), 2);
        assert_eq!(engine.clear_finished(), 1);
        assert_eq!(engine.jobs().len(), 2);
        assert!(!engine.has_finished());
    }

    #[tokio::test]
    async fn test_closed_queue_fails_the_whole_submission() {
        let (mut engine, recorder) = engine();
        engine.queue = ExecutionQueue::closed();
        engine.set_destination_root("docs");

        let result = engine.submit_files(vec![
            SourceFile::in_memory("a.txt", vec![1]),
            SourceFile::in_memory("b.txt", vec![2]),
        ]);
        assert!(result.is_err());

        let jobs = engine.jobs();
        assert_eq!(jobs.len(), 2);
        for job in &jobs {
            assert_eq!(job.status, JobStatus::Error);
            assert_eq!(job.message, "Failed: queue closed");
        }
        assert_eq!(engine.active_count(), 2);
        assert!(recorder.items.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_unknown_id_is_noop() {
        let (engine, _) = engine();
        assert!(!engine.remove("missing"));
        assert!(!engine.cancel("missing"));
        assert!(engine.jobs().is_empty());
    }
}
