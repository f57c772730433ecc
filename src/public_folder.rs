//! Anonymous access to a publicly shared Drive folder.
//!
//! The folder page embeds its listing as an escaped JSON array assigned to
//! `window['_DRIVE_ivd']`. Each entry is `[id, [parents], name, mime_type, ...]`.
//! Subfolders are walked breadth-first so archives nested one level down are
//! picked up too.

use crate::download::stream_to_file;
use crate::error::MirrorError;
use crate::source::{is_zip_name, ArchiveSource};
use crate::types::{ArchiveFilter, RemoteArchive};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, instrument};

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Folders deeper than this below the root are not walked.
const MAX_DEPTH: usize = 8;

fn listing_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"_DRIVE_ivd'\]\s*=\s*'((?:[^'\\]|\\.)*)'"#).expect("listing regex is valid")
    })
}

/// Lists and downloads archives from a public folder without credentials.
#[derive(Debug)]
pub struct PublicFolderSource {
    client: Client,
    web_url: String,
    folder_id: String,
}

impl PublicFolderSource {
    pub fn new(client: Client, web_url: impl Into<String>, folder_id: impl Into<String>) -> Self {
        Self {
            client,
            web_url: web_url.into().trim_end_matches('/').to_string(),
            folder_id: folder_id.into(),
        }
    }

    async fn fetch_listing(&self, folder_id: &str) -> Result<Vec<Entry>, MirrorError> {
        let url = format!("{}/drive/folders/{}", self.web_url, folder_id);
        let response = self.client.get(&url).query(&[("hl", "en")]).send().await?;
        if !response.status().is_success() {
            return Err(MirrorError::from_response("fetch folder page", response).await);
        }
        parse_folder_page(&response.text().await?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    id: String,
    name: String,
    mime_type: String,
}

/// Extracts the folder entries from a public folder page.
fn parse_folder_page(html: &str) -> Result<Vec<Entry>, MirrorError> {
    let encoded = listing_regex()
        .captures(html)
        .and_then(|c| c.get(1))
        .ok_or_else(|| {
            MirrorError::ListingUnreadable(
                "no embedded listing; is the folder shared publicly?".to_string(),
            )
        })?
        .as_str();

    let decoded = unescape_js(encoded)?;
    let root: Value = serde_json::from_str(&decoded)?;

    let items = match root.get(0) {
        Some(Value::Array(items)) => items,
        // An empty folder has `null` in the first slot.
        Some(Value::Null) | None => return Ok(Vec::new()),
        Some(other) => {
            return Err(MirrorError::ListingUnreadable(format!(
                "unexpected listing shape: {}",
                other
            )))
        }
    };

    Ok(items
        .iter()
        .filter_map(|item| {
            Some(Entry {
                id: item.get(0)?.as_str()?.to_string(),
                name: item.get(2)?.as_str()?.to_string(),
                mime_type: item.get(3)?.as_str().unwrap_or_default().to_string(),
            })
        })
        .collect())
}

/// Undoes JavaScript string-literal escaping (`\xHH`, `\uHHHH`, `\/`, ...).
fn unescape_js(s: &str) -> Result<String, MirrorError> {
    let bad = |what: &str| MirrorError::ListingUnreadable(format!("bad escape {}", what));
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                let code = u32::from_str_radix(&hex, 16).map_err(|_| bad(&hex))?;
                out.push(char::from_u32(code).ok_or_else(|| bad(&hex))?);
            }
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16).map_err(|_| bad(&hex))?;
                // Surrogate pairs are left to serde_json by re-escaping them.
                match char::from_u32(code) {
                    Some(ch) => out.push(ch),
                    None => out.push_str(&format!("\\u{}", hex)),
                }
            }
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    Ok(out)
}

#[async_trait]
impl ArchiveSource for PublicFolderSource {
    #[instrument(skip(self), fields(folder = %self.folder_id))]
    async fn list_archives(&self, filter: ArchiveFilter) -> Result<Vec<RemoteArchive>, MirrorError> {
        if filter == ArchiveFilter::ModifiedToday {
            return Err(MirrorError::UnsupportedFilter {
                source_kind: "public-folder",
                filter: "modified-today",
            });
        }

        let mut archives = Vec::new();
        let mut pending = VecDeque::from([(self.folder_id.clone(), String::new(), 0usize)]);

        while let Some((folder_id, prefix, depth)) = pending.pop_front() {
            let entries = self.fetch_listing(&folder_id).await?;
            debug!("Folder {} has {} entries", folder_id, entries.len());

            for entry in entries {
                if entry.mime_type == FOLDER_MIME {
                    if depth < MAX_DEPTH {
                        pending.push_back((entry.id, format!("{}{}/", prefix, entry.name), depth + 1));
                    }
                } else if is_zip_name(&entry.name) {
                    archives.push(RemoteArchive {
                        id: entry.id,
                        name: format!("{}{}", prefix, entry.name),
                        modified_time: None,
                    });
                }
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
        let url = format!("{}/uc", self.web_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("id", archive.id.as_str()),
                ("export", "download"),
                ("confirm", "t"),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(MirrorError::from_response("download file", response).await);
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/html"));
        if is_html {
            return Err(MirrorError::Api {
                operation: "download file",
                status: response.status().as_u16(),
                body: format!("{} is not publicly downloadable (got an HTML page)", archive.name),
            });
        }

        stream_to_file(response, dir, archive.local_name(), pb).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn page(listing: &str) -> String {
        format!(
            "<html><head><title>backups - Google Drive</title></head><body>\
             <script>window['_DRIVE_ivd'] = '{}';if (window['_DRIVE_ivdc'])</script></body></html>",
            listing
        )
    }

    const ROOT_LISTING: &str = r"\x5b\x5b\x5b\x22z1\x22,\x5b\x22ROOT\x22\x5d,\x22a.zip\x22,\x22application\/zip\x22\x5d,\x5b\x22t1\x22,\x5b\x22ROOT\x22\x5d,\x22notes.txt\x22,\x22text\/plain\x22\x5d,\x5b\x22sub\x22,\x5b\x22ROOT\x22\x5d,\x22old\x22,\x22application\/vnd.google-apps.folder\x22\x5d\x5d\x5d";
    const SUB_LISTING: &str = r"\x5b\x5b\x5b\x22z2\x22,\x5b\x22sub\x22\x5d,\x22b.zip\x22,\x22application\/zip\x22\x5d\x5d\x5d";

    #[test]
    fn test_unescape_js() {
        assert_eq!(unescape_js(r"\x5b\x22a\/b\x22\x5d").unwrap(), r#"["a/b"]"#);
        assert_eq!(unescape_js(r"café").unwrap(), "café");
        assert!(unescape_js(r"\xZZ").is_err());
    }

    #[test]
    fn test_parse_folder_page() {
        let entries = parse_folder_page(&page(ROOT_LISTING)).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[0],
            Entry {
                id: "z1".to_string(),
                name: "a.zip".to_string(),
                mime_type: "application/zip".to_string(),
            }
        );
        assert_eq!(entries[2].mime_type, FOLDER_MIME);
    }

    #[test]
    fn test_parse_empty_folder() {
        let entries = parse_folder_page(&page(r"\x5bnull,\x5b\x5d\x5d")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_parse_private_folder_fails() {
        let err = parse_folder_page("<html>Sign in</html>").unwrap_err();
        assert!(matches!(err, MirrorError::ListingUnreadable(_)));
    }

    #[tokio::test]
    async fn test_list_walks_subfolders() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/drive/folders/ROOT");
            then.status(200).body(page(ROOT_LISTING));
        });
        server.mock(|when, then| {
            when.method(GET).path("/drive/folders/sub");
            then.status(200).body(page(SUB_LISTING));
        });

        let source = PublicFolderSource::new(Client::new(), server.base_url(), "ROOT");
        let archives = source.list_archives(ArchiveFilter::All).await.unwrap();

        let names: Vec<_> = archives.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a.zip", "old/b.zip"]);
        assert_eq!(archives[1].local_name(), "b.zip");
    }

    #[tokio::test]
    async fn test_download_rejects_html() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/uc").query_param("id", "z1");
            then.status(200)
                .header("content-type", "text/html; charset=utf-8")
                .body("<html>Quota exceeded</html>");
        });

        let dir = tempfile::tempdir().unwrap();
        let source = PublicFolderSource::new(Client::new(), server.base_url(), "ROOT");
        let archive = RemoteArchive {
            id: "z1".to_string(),
            name: "a.zip".to_string(),
            modified_time: None,
        };
        let err = source
            .download(&archive, dir.path(), &indicatif::ProgressBar::hidden())
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::Api { .. }));
    }

    #[tokio::test]
    async fn test_download_saves_archive() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/uc")
                .query_param("id", "z1")
                .query_param("confirm", "t");
            then.status(200)
                .header("content-type", "application/zip")
                .body("zipdata");
        });

        let dir = tempfile::tempdir().unwrap();
        let source = PublicFolderSource::new(Client::new(), server.base_url(), "ROOT");
        let archive = RemoteArchive {
            id: "z1".to_string(),
            name: "a.zip".to_string(),
            modified_time: None,
        };
        let path = source
            .download(&archive, dir.path(), &indicatif::ProgressBar::hidden())
            .await
            .unwrap();

        mock.assert();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "zipdata");
    }

    #[tokio::test]
    async fn test_modified_today_is_refused() {
        // No mocks: the listing must fail before any request is made.
        let server = MockServer::start_async().await;
        let source = PublicFolderSource::new(Client::new(), &server.base_url(), "ROOT");

        let err = source
            .list_archives(ArchiveFilter::ModifiedToday)
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::UnsupportedFilter { .. }));
    }
}
