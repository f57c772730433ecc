//! Drive v3 API source, authorised by a service account.

use crate::auth::exchange_service_account_token;
use crate::credentials::{ServiceAccountKey, DRIVE_READONLY_SCOPE};
use crate::download::stream_to_file;
use crate::error::MirrorError;
use crate::source::{start_of_utc_day, ArchiveSource};
use crate::types::{ArchiveFilter, RemoteArchive};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

const LIST_FIELDS: &str = "nextPageToken, files(id, name, modifiedTime)";
const PAGE_SIZE: &str = "100";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteArchive>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Lists and downloads archives through the Drive v3 REST API.
#[derive(Debug)]
pub struct DriveApiSource {
    client: Client,
    api_url: String,
    folder_id: String,
    access_token: String,
}

impl DriveApiSource {
    /// Authenticates as the service account and returns a ready source.
    pub async fn connect(
        client: Client,
        api_url: impl Into<String>,
        folder_id: impl Into<String>,
        key: &ServiceAccountKey,
    ) -> Result<Self, MirrorError> {
        let access_token = exchange_service_account_token(&client, key, DRIVE_READONLY_SCOPE).await?;
        info!("Authenticated to Drive as {}", key.client_email);
        Ok(Self::with_token(client, api_url, folder_id, access_token))
    }

    /// Builds a source around an already issued access token.
    pub fn with_token(
        client: Client,
        api_url: impl Into<String>,
        folder_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            folder_id: folder_id.into(),
            access_token: access_token.into(),
        }
    }
}

/// Builds the `q` parameter selecting zips under `folder_id`.
pub(crate) fn list_query(folder_id: &str, filter: ArchiveFilter, now: DateTime<Utc>) -> String {
    let mut query = format!(
        "'{}' in parents and name contains '.zip' and trashed = false",
        folder_id.replace('\'', "\\'")
    );
    if filter == ArchiveFilter::ModifiedToday {
        query.push_str(&format!(
            " and modifiedTime >= '{}'",
            start_of_utc_day(now).format("%Y-%m-%dT%H:%M:%S")
        ));
    }
    query
}

#[async_trait]
impl ArchiveSource for DriveApiSource {
    #[instrument(skip(self), fields(folder = %self.folder_id))]
    async fn list_archives(&self, filter: ArchiveFilter) -> Result<Vec<RemoteArchive>, MirrorError> {
        let query = list_query(&self.folder_id, filter, Utc::now());
        let url = format!("{}/drive/v3/files", self.api_url);
        let mut archives = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("q", query.as_str()),
                ("fields", LIST_FIELDS),
                ("pageSize", PAGE_SIZE),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }

            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.access_token)
                .query(&params)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(MirrorError::from_response("list files", response).await);
            }

            let page: FileList = response.json().await?;
            debug!("Listed {} file(s)", page.files.len());
            archives.extend(page.files);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(archives)
    }

    async fn download(
        &self,
        archive: &RemoteArchive,
        dir: &Path,
        pb: &indicatif::ProgressBar,
    ) -> Result<PathBuf, MirrorError> {
        let url = format!("{}/drive/v3/files/{}", self.api_url, archive.id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[("alt", "media")])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(MirrorError::from_response("download file", response).await);
        }

        stream_to_file(response, dir, archive.local_name(), pb).await
    }
}
