//! Publication of the extraction tree to the destination dataset.

use crate::error::MirrorError;
use crate::types::{
    CreateOutcome, DeleteOutcome, FolderOutcome, PublishPolicy, PublishReport, TARGET_FOLDERS,
};
use async_trait::async_trait;
use std::path::Path;
use tracing::{info, warn};

/// A dataset repository the extracted folders are published to.
#[async_trait]
pub trait DatasetHost: Send + Sync {
    /// Deletes the dataset. Failures are reported in the outcome, never raised.
    async fn delete_dataset(&self) -> DeleteOutcome;

    /// Creates the dataset as public; an existing dataset is not an error.
    async fn create_dataset(&self) -> Result<CreateOutcome, MirrorError>;

    /// Uploads everything under `local` to `path_in_repo` in one commit.
    ///
    /// Returns the number of files committed.
    async fn upload_folder(
        &self,
        local: &Path,
        path_in_repo: &str,
        message: &str,
    ) -> Result<usize, MirrorError>;
}

/// Resets the dataset if asked to, then uploads each target folder that exists.
pub async fn publish(
    host: &dyn DatasetHost,
    extract_dir: &Path,
    policy: PublishPolicy,
) -> Result<PublishReport, MirrorError> {
    let mut report = PublishReport::default();

    if policy == PublishPolicy::Reset {
        let deleted = host.delete_dataset().await;
        match &deleted {
            DeleteOutcome::Deleted => info!("Deleted existing dataset"),
            DeleteOutcome::NotFound => info!("Delete skipped: dataset does not exist"),
            DeleteOutcome::Failed(reason) => warn!("Delete skipped: {}", reason),
        }
        report.deleted = Some(deleted);

        let created = host.create_dataset().await?;
        info!("Dataset ready ({:?})", created);
        report.created = Some(created);
    }

    for name in TARGET_FOLDERS {
        let local = extract_dir.join(name);
        let outcome = if local.is_dir() {
            let files = host
                .upload_folder(&local, name, &format!("Update {}", name))
                .await?;
            info!("Uploaded: {} ({} files)", name, files);
            FolderOutcome::Uploaded { files }
        } else {
            warn!("Missing: {}", name);
            FolderOutcome::Missing
        };
        report.folders.push((name.to_string(), outcome));
    }

    Ok(report)
}
