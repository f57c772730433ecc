use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use worldmirror::{
    run_mirror, ArchiveFilter, Credentials, MirrorConfig, MirrorContext, PublishPolicy, RunOutcome,
    SourceKind, DEFAULT_FOLDER_ID, DEFAULT_REPO_ID,
};

#[derive(Parser, Debug)]
#[command(name = "worldmirror")]
#[command(about = "Mirror Minecraft server backups from Google Drive to a Hugging Face dataset", long_about = None)]
#[command(version)]
struct Args {
    /// How to access the Drive folder
    #[arg(long, value_enum, env = "WORLDMIRROR_SOURCE", default_value = "public-folder")]
    source: SourceKind,

    /// Drive folder holding the backup zips
    #[arg(long, env = "WORLDMIRROR_FOLDER_ID", default_value = DEFAULT_FOLDER_ID)]
    folder_id: String,

    /// Which archives to pick up
    #[arg(long, value_enum, env = "WORLDMIRROR_FILTER", default_value = "all")]
    filter: ArchiveFilter,

    /// Destination dataset (owner/name)
    #[arg(long, env = "WORLDMIRROR_REPO_ID", default_value = DEFAULT_REPO_ID)]
    repo_id: String,

    /// Reset (delete and recreate) or update the dataset
    #[arg(long, value_enum, env = "WORLDMIRROR_POLICY", default_value = "reset")]
    policy: PublishPolicy,

    /// Scratch directory for downloaded archives
    #[arg(long, env = "WORLDMIRROR_DOWNLOAD_DIR", default_value = "backups")]
    download_dir: PathBuf,

    /// Scratch directory archives are extracted into
    #[arg(long, env = "WORLDMIRROR_EXTRACT_DIR", default_value = "extracted_backups")]
    extract_dir: PathBuf,

    /// Leave scratch directories in place after the run
    #[arg(long)]
    keep_scratch: bool,

    /// Hugging Face Hub endpoint
    #[arg(long, env = "HF_ENDPOINT", default_value = "https://huggingface.co")]
    hub_endpoint: String,

    /// Drive v3 API base URL
    #[arg(long, default_value = "https://www.googleapis.com")]
    drive_api_url: String,

    /// Drive web base URL for public folders
    #[arg(long, default_value = "https://drive.google.com")]
    drive_web_url: String,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl From<Args> for MirrorConfig {
    fn from(args: Args) -> Self {
        Self {
            source: args.source,
            folder_id: args.folder_id,
            filter: args.filter,
            repo_id: args.repo_id,
            policy: args.policy,
            download_dir: args.download_dir,
            extract_dir: args.extract_dir,
            keep_scratch: args.keep_scratch,
            drive_api_url: args.drive_api_url,
            drive_web_url: args.drive_web_url,
            hub_endpoint: args.hub_endpoint,
        }
    }
}

async fn run(config: MirrorConfig) -> anyhow::Result<RunOutcome> {
    let credentials =
        Credentials::from_env(config.source).context("Failed to resolve credentials")?;
    let ctx = MirrorContext::connect(&config, &credentials)
        .await
        .context("Failed to authenticate")?;
    Ok(run_mirror(&config, &ctx).await?)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("worldmirror={}", log_level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚀 WorldMirror - Drive to Hub backup mirror");
    info!("Source: {:?} folder {}", args.source, args.folder_id);
    info!("Target: {} ({:?})", args.repo_id, args.policy);

    let started = Instant::now();
    let config = MirrorConfig::from(args);
    let elapsed = || humantime::format_duration(std::time::Duration::from_secs(started.elapsed().as_secs()));

    match run(config).await {
        Ok(RunOutcome::NoNewArchives) => {
            info!("No new zip files; nothing to publish ({})", elapsed());
        }
        Ok(RunOutcome::Published(report)) => {
            info!(
                "✅ Backup upload complete: {:?} uploaded, {:?} missing ({})",
                report.uploaded(),
                report.missing(),
                elapsed()
            );
        }
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
