use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use pagelift::worker::scan_folder;
use pagelift::{
    load_config, load_config_from_str, Config, DroppedEntry, JobEvent, JobRecord, JobStatus,
    SourceFile, UploadEngine,
};

#[derive(Parser)]
#[command(author, version, about = "Upload files and comic archives to a storage endpoint", long_about = None)]
struct Cli {
    /// JSON config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Upload endpoint, used when no config file is given
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Destination root, e.g. "MAD/One Piece"
    #[arg(long, short, global = true, default_value = "")]
    root: String,

    /// Log filter when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload loose files, one job each
    Files { paths: Vec<PathBuf> },

    /// Upload folders, one batch job per folder
    Folders { paths: Vec<PathBuf> },

    /// Upload paths as dropped entries (directories are walked when their job runs)
    Drop { paths: Vec<PathBuf> },

    /// Validate a config file and print the effective settings
    CheckConfig { path: PathBuf },
}

fn init_logging(level: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let layer = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    };

    let subscriber = tracing_subscriber::registry().with(layer).with(filter);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<Config, pagelift::ConfigError> {
    match (&cli.config, &cli.endpoint) {
        (Some(path), _) => load_config(path),
        (None, Some(endpoint)) => {
            let raw = serde_json::json!({ "version": "1.0", "endpoint": endpoint });
            load_config_from_str(&raw.to_string())
        }
        (None, None) => Err(pagelift::ConfigError::Validation {
            message: "either --config or --endpoint is required".to_string(),
        }),
    }
}

fn render(job: &JobRecord) {
    if job.total > 0 {
        println!(
            "[{:>9}] {} {}/{} {}",
            job.status, job.name, job.progress, job.total, job.message
        );
    } else {
        println!("[{:>9}] {} {}", job.status, job.name, job.message);
    }
}

async fn submit(engine: &UploadEngine, command: Commands) -> pagelift::Result<Vec<String>> {
    match command {
        Commands::Files { paths } => {
            let files = paths.into_iter().map(SourceFile::from_path).collect();
            engine.submit_files(files)
        }
        Commands::Folders { paths } => {
            let mut folders = Vec::with_capacity(paths.len());
            for path in paths {
                match scan_folder(&path) {
                    Ok(folder) => folders.push(folder),
                    Err(e) => warn!("Skipping folder {}: {}", path.display(), e),
                }
            }
            engine.submit_folders(folders)
        }
        Commands::Drop { paths } => {
            let mut entries = Vec::with_capacity(paths.len());
            for path in paths {
                match DroppedEntry::from_path(&path).await {
                    Ok(entry) => entries.push(entry),
                    Err(e) => warn!("Skipping {}: {}", path.display(), e),
                }
            }
            engine.submit_entries(entries)
        }
        Commands::CheckConfig { .. } => Ok(Vec::new()),
    }
}

#[cfg(feature = "unrar")]
async fn init_rar(engine: &UploadEngine) {
    use std::sync::Arc;

    use pagelift::processor::unrar::UnrarEngine;
    use pagelift::RarEngine;

    engine
        .init_rar_engine(|| async { Ok(Arc::new(UnrarEngine::new()) as Arc<dyn RarEngine>) })
        .await;
}

#[cfg(not(feature = "unrar"))]
async fn init_rar(_engine: &UploadEngine) {
    info!("Built without rar support, .cbr jobs will fail");
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level, cli.json_logs) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    if let Commands::CheckConfig { path } = &cli.command {
        return match load_config(path) {
            Ok(config) => match serde_json::to_string_pretty(&config) {
                Ok(json) => {
                    println!("{}", json);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!("{}", e);
                    ExitCode::FAILURE
                }
            },
            Err(e) => {
                error!("{}", e);
                ExitCode::FAILURE
            }
        };
    }

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let engine = match UploadEngine::from_config(config) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to start upload engine: {}", e);
            return ExitCode::FAILURE;
        }
    };
    engine.set_destination_root(cli.root.clone());
    init_rar(&engine).await;

    let mut events = engine.subscribe();
    let renderer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(JobEvent::Updated { job }) => render(&job),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Progress display skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let ids = match submit(&engine, cli.command).await {
        Ok(ids) => ids,
        Err(e) => {
            error!("Submission failed: {}", e);
            renderer.abort();
            return ExitCode::FAILURE;
        }
    };
    info!("Submitted {} jobs", ids.len());

    tokio::select! {
        _ = engine.wait_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling remaining jobs");
            for id in &ids {
                engine.cancel(id);
            }
            engine.wait_idle().await;
        }
    }
    renderer.abort();

    let jobs = engine.jobs();
    println!();
    for job in &jobs {
        render(job);
    }

    let failed = jobs.iter().filter(|j| j.status == JobStatus::Error).count();
    if failed > 0 {
        error!("{} of {} jobs failed", failed, jobs.len());
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
