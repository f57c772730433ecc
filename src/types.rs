//! Data structures shared by the mirror stages.

use crate::error::MirrorError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::PathBuf;

/// Top-level folders of a server save that get published, in upload order.
pub const TARGET_FOLDERS: [&str; 4] = ["world", "world_nether", "world_the_end", "plugins"];

/// Public folder the backups historically landed in.
pub const DEFAULT_FOLDER_ID: &str = "1OyWrHqFI3IrCbjV-Bkh_qC3XfYohXh-D";

/// Dataset the backups are mirrored to.
pub const DEFAULT_REPO_ID: &str = "OrbitMC/minecraft";

/// How the source folder is accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceKind {
    /// Anonymous access to a publicly shared folder.
    PublicFolder,
    /// Drive v3 API with a service-account key from `GDRIVE_KEY_JSON`.
    ServiceAccount,
}

/// Which archives in the folder are picked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ArchiveFilter {
    /// Every zip in the folder.
    All,
    /// Zips modified on or after 00:00 UTC today.
    ModifiedToday,
}

/// What happens to the existing dataset before publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PublishPolicy {
    /// Delete and recreate the dataset, so it holds only this run's folders.
    Reset,
    /// Upload over the existing dataset; files not re-uploaded are kept.
    Update,
}

/// Configuration for a mirror run.
///
/// # Example
///
/// ```
/// use worldmirror::{ArchiveFilter, MirrorConfig, PublishPolicy, SourceKind};
///
/// let config = MirrorConfig {
///     source: SourceKind::ServiceAccount,
///     filter: ArchiveFilter::ModifiedToday,
///     policy: PublishPolicy::Update,
///     ..MirrorConfig::default()
/// };
/// assert_eq!(config.repo_id, "OrbitMC/minecraft");
/// ```
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// How the source folder is accessed.
    pub source: SourceKind,
    /// Drive folder identifier holding the backup zips.
    pub folder_id: String,
    /// Which archives to pick up.
    pub filter: ArchiveFilter,
    /// Destination dataset, `owner/name`.
    pub repo_id: String,
    /// Reset or update the destination.
    pub policy: PublishPolicy,
    /// Scratch directory for downloaded archives.
    pub download_dir: PathBuf,
    /// Scratch directory the archives are merged into.
    pub extract_dir: PathBuf,
    /// Leave scratch directories in place after the run.
    pub keep_scratch: bool,
    /// Base URL of the Drive v3 API.
    pub drive_api_url: String,
    /// Base URL for the public folder page and downloads.
    pub drive_web_url: String,
    /// Base URL of the Hugging Face Hub.
    pub hub_endpoint: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::PublicFolder,
            folder_id: DEFAULT_FOLDER_ID.to_string(),
            filter: ArchiveFilter::All,
            repo_id: DEFAULT_REPO_ID.to_string(),
            policy: PublishPolicy::Reset,
            download_dir: PathBuf::from("backups"),
            extract_dir: PathBuf::from("extracted_backups"),
            keep_scratch: false,
            drive_api_url: "https://www.googleapis.com".to_string(),
            drive_web_url: "https://drive.google.com".to_string(),
            hub_endpoint: "https://huggingface.co".to_string(),
        }
    }
}

impl MirrorConfig {
    /// Rejects option combinations the chosen source cannot honour.
    ///
    /// Public folder pages carry no modification times, so they cannot be
    /// filtered to today's archives.
    pub fn validate(&self) -> Result<(), MirrorError> {
        if self.source == SourceKind::PublicFolder && self.filter == ArchiveFilter::ModifiedToday {
            return Err(MirrorError::UnsupportedFilter {
                source_kind: "public-folder",
                filter: "modified-today",
            });
        }
        Ok(())
    }
}

/// An archive discovered in the source folder.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteArchive {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub modified_time: Option<DateTime<Utc>>,
}

impl RemoteArchive {
    /// File name to use locally: the last path component of the remote name.
    pub fn local_name(&self) -> &str {
        self.name
            .rsplit(['/', '\\'])
            .find(|s| !s.is_empty() && *s != "." && *s != "..")
            .unwrap_or(&self.id)
    }
}

/// Result of trying to delete the destination dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    Failed(String),
}

/// Result of creating the destination dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// What happened to one target folder during publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderOutcome {
    /// Uploaded with this many files.
    Uploaded { files: usize },
    /// No such local directory; skipped.
    Missing,
}

/// Summary of the publication stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublishReport {
    /// Set only under [`PublishPolicy::Reset`].
    pub deleted: Option<DeleteOutcome>,
    pub created: Option<CreateOutcome>,
    pub folders: Vec<(String, FolderOutcome)>,
}

impl PublishReport {
    /// Names of the folders that were uploaded, in upload order.
    pub fn uploaded(&self) -> Vec<&str> {
        self.folders
            .iter()
            .filter(|(_, o)| matches!(o, FolderOutcome::Uploaded { .. }))
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// Names of the folders that were absent locally.
    pub fn missing(&self) -> Vec<&str> {
        self.folders
            .iter()
            .filter(|(_, o)| *o == FolderOutcome::Missing)
            .map(|(n, _)| n.as_str())
            .collect()
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The filter matched nothing; no extraction or publication happened.
    NoNewArchives,
    /// Archives were mirrored.
    Published(PublishReport),
}
