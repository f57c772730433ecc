//! Error types for mirror operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while mirroring backups.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// I/O error during file operations.
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// HTTP transport error talking to Drive or the Hub.
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),

    /// Archive could not be read.
    #[error(transparent)]
    ZipError(#[from] zip::result::ZipError),

    /// Service-account assertion could not be signed.
    #[error(transparent)]
    JwtError(#[from] jsonwebtoken::errors::Error),

    /// A required environment variable is unset or empty.
    #[error("Environment variable {0} is not set")]
    MissingEnv(String),

    /// Credential material was present but unusable.
    #[error("Invalid credentials in {var}: {reason}")]
    InvalidCredentials { var: String, reason: String },

    /// An archive entry would escape the extraction directory.
    #[error("Refusing to extract {entry:?} from {archive}: unsafe path")]
    UnsafeArchivePath { archive: PathBuf, entry: String },

    /// A remote API answered with a non-success status.
    #[error("{operation} failed: HTTP {status}: {body}")]
    Api {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The source cannot apply the requested archive filter.
    #[error("The {source_kind} source does not support the {filter} filter")]
    UnsupportedFilter {
        source_kind: &'static str,
        filter: &'static str,
    },

    /// The public folder page did not contain a recognizable listing.
    #[error("Could not read folder listing: {0}")]
    ListingUnreadable(String),

    /// Body ended before the advertised length.
    #[error("Download of {name} truncated: expected {expected} bytes, got {actual} bytes")]
    Truncated {
        name: String,
        expected: u64,
        actual: u64,
    },
}

impl MirrorError {
    /// Builds an [`MirrorError::Api`] from a failed response, consuming its body.
    pub(crate) async fn from_response(operation: &'static str, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        MirrorError::Api {
            operation,
            status,
            body,
        }
    }
}
