use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use log::{debug, info, warn};
use tracing::{info_span, Instrument};

use crate::broadcast::{JobPatch, JobRegistry, JobStatus};
use crate::error::{DecodeError, UploadError};
use crate::naming::{natural_sort_by_key, Destination, Target};
use crate::processor::{open_archive, ArchiveFormat, PageReader, RarEngineSlot};
use crate::storage::{UploadItem, Uploader};
use crate::worker::entry::{DirectoryEntry, FileEntry};
use crate::worker::job::{Job, JobKind, SourceFile};
use crate::worker::queue::panic_message;
use crate::worker::walker;

use super::context::{JobContext, Outcome};
use super::error::PipelineError;

type RunResult = Result<Outcome, PipelineError>;

/// Drives one job from `pending` to `done` or `error`.
#[derive(Clone)]
pub struct JobRunner {
    registry: Arc<JobRegistry>,
    uploader: Arc<dyn Uploader>,
    rar: RarEngineSlot,
}

impl JobRunner {
    pub fn new(registry: Arc<JobRegistry>, uploader: Arc<dyn Uploader>, rar: RarEngineSlot) -> Self {
        Self {
            registry,
            uploader,
            rar,
        }
    }

    /// Runs the job to completion. Failures end up on the job record.
    pub async fn run(&self, job: Job) {
        let Job {
            id,
            name,
            kind,
            destination,
            token,
        } = job;
        let ctx = JobContext::new(id, Arc::clone(&self.registry), token);

        let span = info_span!("job",
            job_id = %ctx.id(),
            name = %name,
            kind = kind.label(),
            paged = destination.is_paged(),
        );

        async {
            if ctx.is_cancelled() {
                debug!("Job {} cancelled before start", name);
                return;
            }

            let body = async {
                match kind {
                    JobKind::Upload(file) => self.run_upload(&ctx, file, &destination).await,
                    JobKind::Archive { file, format } => {
                        self.run_archive(&ctx, file, format, &destination).await
                    }
                    JobKind::Unsupported(file) => self.run_unsupported(&ctx, file),
                    JobKind::Batch(files) => self.run_batch(&ctx, files, &destination).await,
                    JobKind::Directory(dir) => {
                        self.run_directory(&ctx, dir, &destination).await
                    }
                }
            };
            let result = match AssertUnwindSafe(body).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(PipelineError::Panicked(panic_message(panic.as_ref()))),
            };

            match result {
                Ok(Outcome::Completed) => info!("Job {} completed", name),
                Ok(Outcome::Cancelled) => info!("Job {} cancelled", name),
                Err(e) => {
                    warn!("Job {} failed: {:?}", name, e);
                    ctx.update(
                        JobPatch::new()
                            .status(JobStatus::Error)
                            .message(e.to_string()),
                    );
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_upload(&self, ctx: &JobContext, file: SourceFile, dest: &Destination) -> RunResult {
        ctx.update(
            JobPatch::new()
                .status(JobStatus::Uploading)
                .total(1)
                .message("Processing..."),
        );

        let target = Target {
            filename: file.name.clone(),
            folder_path: dest.single_file_folder(),
        };
        self.upload_source(&file, target).await?;

        ctx.update(
            JobPatch::new()
                .status(JobStatus::Done)
                .progress(1)
                .message("Done"),
        );
        Ok(Outcome::Completed)
    }

    async fn run_archive(
        &self,
        ctx: &JobContext,
        file: SourceFile,
        format: ArchiveFormat,
        dest: &Destination,
    ) -> RunResult {
        ctx.update(
            JobPatch::new()
                .status(JobStatus::Uploading)
                .total(1)
                .message("Processing..."),
        );
        if format == ArchiveFormat::Rar && !self.rar.is_ready() {
            return Err(PipelineError::EngineNotReady);
        }

        ctx.update(JobPatch::new().message(match format {
            ArchiveFormat::Zip => "Unzipping...",
            ArchiveFormat::Rar => "Unrar...",
        }));

        let data = read_source(&file).await?;
        let rar = self.rar.clone();
        let mut reader = tokio::task::spawn_blocking(move || open_archive(format, data, &rar))
            .await
            .map_err(|e| DecodeError::Task(e.to_string()))??;

        if ctx.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        let total = reader.page_count();
        let folder = dest.archive_folder(&file.name);
        ctx.update(JobPatch::new().total(total).message("Uploading..."));
        info!("Unpacking {} pages of {} into {}", total, file.name, folder);

        for index in 0..total {
            if ctx.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }

            let (returned, page) = read_page_blocking(reader, index).await?;
            reader = returned;
            let Some(page) = page? else {
                debug!("Entry {} of {} produced no data", index, file.name);
                continue;
            };

            let position = index + 1;
            ctx.update(JobPatch::new().message(format!("Uploading {}/{}", position, total)));

            let item = UploadItem::new(
                dest.page_name(position, page.extension.as_deref()),
                folder.clone(),
                page.data,
            )
            .with_mime_type(page.mime_type);
            self.uploader.upload(item).await?;

            ctx.update(JobPatch::new().progress(position));
        }

        ctx.update(
            JobPatch::new()
                .status(JobStatus::Done)
                .message("Completed"),
        );
        Ok(Outcome::Completed)
    }

    fn run_unsupported(&self, ctx: &JobContext, file: SourceFile) -> RunResult {
        ctx.update(
            JobPatch::new()
                .status(JobStatus::Uploading)
                .total(1)
                .message("Processing..."),
        );
        Err(PipelineError::UnsupportedArchive { name: file.name })
    }

    async fn run_batch(
        &self,
        ctx: &JobContext,
        mut files: Vec<SourceFile>,
        dest: &Destination,
    ) -> RunResult {
        natural_sort_by_key(&mut files, |f| f.relative_path.as_str());
        let total = files.len();

        ctx.update(
            JobPatch::new()
                .status(JobStatus::Uploading)
                .total(total)
                .message("Starting..."),
        );

        let mut failed = 0usize;
        for (index, file) in files.iter().enumerate() {
            if ctx.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }

            let position = index + 1;
            ctx.update(JobPatch::new().message(format!("Uploading {}...", file.name)));

            let target = dest.batch_target(position, &file.name, &file.relative_path);
            if let Err(e) = self.upload_source(file, target).await {
                failed += 1;
                warn!("Skipping {}: {:?}", file.relative_path, e);
            }

            ctx.update(JobPatch::new().progress(position));
        }

        if failed > 0 {
            warn!("{} of {} files failed to upload", failed, total);
        }
        ctx.update(
            JobPatch::new()
                .status(JobStatus::Done)
                .message("Completed"),
        );
        Ok(Outcome::Completed)
    }

    async fn run_directory(
        &self,
        ctx: &JobContext,
        dir: Arc<dyn DirectoryEntry>,
        dest: &Destination,
    ) -> RunResult {
        ctx.update(
            JobPatch::new()
                .status(JobStatus::Scanning)
                .message("Scanning directory..."),
        );

        let entries = walker::walk(dir).await.map_err(PipelineError::WalkFailed)?;
        if ctx.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        let files = entries.into_iter().map(FileEntry::into_source).collect();
        self.run_batch(ctx, files, dest).await
    }

    async fn upload_source(&self, file: &SourceFile, target: Target) -> Result<(), UploadError> {
        let data = read_source(file).await?;
        let mut item = UploadItem::new(target.filename, target.folder_path, data);
        if let Some(mime) = mime_guess::from_path(&file.name).first() {
            item = item.with_mime_type(mime.essence_str());
        }
        self.uploader.upload(item).await
    }
}

async fn read_source(file: &SourceFile) -> Result<Vec<u8>, UploadError> {
    file.read().await.map_err(|source| UploadError::Read {
        name: file.name.clone(),
        source,
    })
}

type PageRead = (
    Box<dyn PageReader>,
    Result<Option<crate::processor::DecodedPage>, DecodeError>,
);

/// Extracts one page off the async runtime, handing the reader back.
async fn read_page_blocking(
    mut reader: Box<dyn PageReader>,
    index: usize,
) -> Result<PageRead, DecodeError> {
    tokio::task::spawn_blocking(move || {
        let page = reader.read_page(index);
        (reader, page)
    })
    .await
    .map_err(|e| DecodeError::Task(e.to_string()))
}
