//! WorldMirror - mirror Minecraft server backups from Google Drive to a Hugging Face dataset
//!
//! This library pulls the zip archives a server drops into a Drive folder,
//! merges them into one extraction tree, and publishes the `world`,
//! `world_nether`, `world_the_end`, and `plugins` folders to a dataset
//! repository on the Hub.
//!
//! # Features
//!
//! - **Two source modes**: anonymous public folders or a service account
//! - **Daily filter**: only pick up archives modified since 00:00 UTC
//! - **Reset or update**: recreate the dataset each run or upload over it
//! - **Large files**: region files go through Git LFS automatically
//!
//! # Example
//!
//! ```no_run
//! use worldmirror::{run_mirror, Credentials, MirrorConfig, MirrorContext, RunOutcome};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MirrorConfig::default();
//! let credentials = Credentials::from_env(config.source)?;
//! let ctx = MirrorContext::connect(&config, &credentials).await?;
//!
//! if let RunOutcome::Published(report) = run_mirror(&config, &ctx).await? {
//!     println!("uploaded {:?}", report.uploaded());
//! }
//! # Ok(())
//! # }
//! ```

mod auth;
mod credentials;
mod download;
mod drive;
mod error;
mod extract;
mod hub;
mod orchestrator;
mod public_folder;
mod publish;
mod source;
mod types;

pub use credentials::{parse_service_account_key, Credentials, ServiceAccountKey};
pub use credentials::{DRIVE_READONLY_SCOPE, GDRIVE_KEY_VAR, HF_TOKEN_VAR};
pub use drive::DriveApiSource;
pub use error::MirrorError;
pub use extract::{extract_all, extract_zip, fix_misspelled_nether};
pub use hub::HubClient;
pub use orchestrator::{run_mirror, MirrorContext};
pub use public_folder::PublicFolderSource;
pub use publish::{publish, DatasetHost};
pub use source::{acquire_archives, ArchiveSource};
pub use types::*;
