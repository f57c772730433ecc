//! Main orchestration logic for a mirror run.

use crate::credentials::{Credentials, GDRIVE_KEY_VAR};
use crate::drive::DriveApiSource;
use crate::error::MirrorError;
use crate::extract::{extract_all, fix_misspelled_nether};
use crate::hub::HubClient;
use crate::public_folder::PublicFolderSource;
use crate::publish::{publish, DatasetHost};
use crate::source::{acquire_archives, ArchiveSource};
use crate::types::{MirrorConfig, RunOutcome, SourceKind};
use std::path::Path;
use tracing::info;

/// Authenticated clients for one run, built once at startup.
pub struct MirrorContext {
    pub source: Box<dyn ArchiveSource>,
    pub host: Box<dyn DatasetHost>,
}

impl std::fmt::Debug for MirrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorContext").finish_non_exhaustive()
    }
}

impl MirrorContext {
    /// Authenticates to the source and the Hub.
    ///
    /// The Hub token is checked up front so a bad token fails the run before
    /// anything is downloaded.
    pub async fn connect(config: &MirrorConfig, credentials: &Credentials) -> Result<Self, MirrorError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let source: Box<dyn ArchiveSource> = match config.source {
            SourceKind::PublicFolder => Box::new(PublicFolderSource::new(
                client.clone(),
                &config.drive_web_url,
                &config.folder_id,
            )),
            SourceKind::ServiceAccount => {
                let key = credentials
                    .service_account
                    .as_ref()
                    .ok_or_else(|| MirrorError::MissingEnv(GDRIVE_KEY_VAR.to_string()))?;
                Box::new(
                    DriveApiSource::connect(client.clone(), &config.drive_api_url, &config.folder_id, key)
                        .await?,
                )
            }
        };

        let hub = HubClient::new(
            client,
            &config.hub_endpoint,
            &credentials.hub_token,
            &config.repo_id,
        );
        let user = hub.whoami().await?;
        info!("Logged in to the Hub as {} (target {})", user, hub.repo_id());

        Ok(Self {
            source,
            host: Box::new(hub),
        })
    }
}

/// Runs the mirror pipeline: acquire, extract, publish, clean.
///
/// This is the main entry point. It performs the following steps:
///
/// 1. Clears both scratch directories
/// 2. Lists and downloads the matching archives (returns early if none match)
/// 3. Extracts them into the extraction directory and fixes the nether folder name
/// 4. Publishes the target folders according to the configured policy
/// 5. Removes the scratch directories unless `keep_scratch` is set
///
/// Nothing is retried; the first error aborts the run and leaves the scratch
/// directories as they were.
///
/// # Example
///
/// ```no_run
/// use worldmirror::{run_mirror, Credentials, MirrorConfig, MirrorContext};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = MirrorConfig::default();
/// let credentials = Credentials::from_env(config.source)?;
/// let ctx = MirrorContext::connect(&config, &credentials).await?;
/// run_mirror(&config, &ctx).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_mirror(config: &MirrorConfig, ctx: &MirrorContext) -> Result<RunOutcome, MirrorError> {
    reset_dir(&config.download_dir)?;
    reset_dir(&config.extract_dir)?;

    let archives = acquire_archives(ctx.source.as_ref(), config.filter, &config.download_dir).await?;
    if archives.is_empty() {
        cleanup(config)?;
        return Ok(RunOutcome::NoNewArchives);
    }

    extract_all(&archives, &config.extract_dir)?;
    fix_misspelled_nether(&config.extract_dir)?;

    let report = publish(ctx.host.as_ref(), &config.extract_dir, config.policy).await?;
    info!(
        "Published {} folder(s) to {}; missing: {:?}",
        report.uploaded().len(),
        config.repo_id,
        report.missing()
    );

    cleanup(config)?;
    Ok(RunOutcome::Published(report))
}

/// Empties `dir`, creating it if needed.
fn reset_dir(dir: &Path) -> Result<(), MirrorError> {
    remove_dir_if_present(dir)?;
    std::fs::create_dir_all(dir)?;
    Ok(())
}

fn remove_dir_if_present(dir: &Path) -> Result<(), MirrorError> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn cleanup(config: &MirrorConfig) -> Result<(), MirrorError> {
    if config.keep_scratch {
        info!(
            "Keeping scratch directories {} and {}",
            config.download_dir.display(),
            config.extract_dir.display()
        );
        return Ok(());
    }
    remove_dir_if_present(&config.download_dir)?;
    remove_dir_if_present(&config.extract_dir)?;
    Ok(())
}
