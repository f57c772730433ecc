//! Hugging Face Hub client for dataset repositories.

use crate::error::MirrorError;
use crate::publish::DatasetHost;
use crate::types::{CreateOutcome, DeleteOutcome};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

const REPO_TYPE: &str = "dataset";
const REVISION: &str = "main";
const LFS_CONTENT_TYPE: &str = "application/vnd.git-lfs+json";

/// Files classified per preupload request.
const PREUPLOAD_BATCH: usize = 256;

/// Bytes of each file sent as a sample for classification.
const SAMPLE_BYTES: usize = 512;

#[derive(Serialize)]
struct RepoRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    organization: Option<&'a str>,
    #[serde(rename = "type")]
    repo_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    private: Option<bool>,
}

#[derive(Serialize)]
struct PreuploadFile<'a> {
    path: &'a str,
    size: u64,
    sample: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreuploadAnswer {
    path: String,
    upload_mode: String,
    #[serde(default)]
    should_ignore: bool,
}

#[derive(Deserialize)]
struct PreuploadResponse {
    files: Vec<PreuploadAnswer>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
struct LfsPointer {
    oid: String,
    size: u64,
}

#[derive(Deserialize, Default)]
struct LfsAction {
    href: String,
    #[serde(default)]
    header: HashMap<String, String>,
}

#[derive(Deserialize, Default)]
struct LfsActions {
    #[serde(default)]
    upload: Option<LfsAction>,
    #[serde(default)]
    verify: Option<LfsAction>,
}

#[derive(Deserialize)]
struct LfsError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct LfsObject {
    oid: String,
    #[serde(default)]
    actions: Option<LfsActions>,
    #[serde(default)]
    error: Option<LfsError>,
}

#[derive(Deserialize)]
struct LfsBatchResponse {
    objects: Vec<LfsObject>,
}

/// A file queued for a commit.
#[derive(Debug)]
struct LocalFile {
    abs: PathBuf,
    repo_path: String,
    size: u64,
}

/// One line of an NDJSON commit body.
#[derive(Serialize)]
#[serde(tag = "key", content = "value", rename_all = "camelCase")]
enum CommitLine<'a> {
    Header {
        summary: &'a str,
        description: &'a str,
    },
    File {
        path: &'a str,
        content: String,
        encoding: &'static str,
    },
    LfsFile {
        path: &'a str,
        algo: &'static str,
        oid: &'a str,
        size: u64,
    },
}

/// Client for one dataset repository on the Hub.
pub struct HubClient {
    client: Client,
    endpoint: String,
    token: String,
    repo_id: String,
}

impl std::fmt::Debug for HubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubClient")
            .field("endpoint", &self.endpoint)
            .field("repo_id", &self.repo_id)
            .finish_non_exhaustive()
    }
}

impl HubClient {
    pub fn new(
        client: Client,
        endpoint: impl Into<String>,
        token: impl Into<String>,
        repo_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token: token.into(),
            repo_id: repo_id.into(),
        }
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    /// Splits `owner/name` into `(Some(owner), name)`.
    fn repo_parts(&self) -> (Option<&str>, &str) {
        match self.repo_id.split_once('/') {
            Some((owner, name)) => (Some(owner), name),
            None => (None, self.repo_id.as_str()),
        }
    }

    fn api_url(&self, tail: &str) -> String {
        format!("{}/api/{}s/{}/{}", self.endpoint, REPO_TYPE, self.repo_id, tail)
    }

    /// Checks the token and returns the account name it belongs to.
    pub async fn whoami(&self) -> Result<String, MirrorError> {
        #[derive(Deserialize)]
        struct WhoAmI {
            name: String,
        }

        let response = self
            .client
            .get(format!("{}/api/whoami-v2", self.endpoint))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(MirrorError::from_response("whoami", response).await);
        }
        Ok(response.json::<WhoAmI>().await?.name)
    }

    /// Classifies files as `regular` (inline) or `lfs` uploads.
    async fn preupload(&self, files: &[LocalFile]) -> Result<HashMap<String, PreuploadAnswer>, MirrorError> {
        let mut payload = Vec::with_capacity(files.len());
        for file in files {
            payload.push(PreuploadFile {
                path: &file.repo_path,
                size: file.size,
                sample: BASE64_STANDARD.encode(read_sample(&file.abs)?),
            });
        }

        let response = self
            .client
            .post(self.api_url(&format!("preupload/{}", REVISION)))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "files": payload }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(MirrorError::from_response("preupload", response).await);
        }

        let answers: PreuploadResponse = response.json().await?;
        Ok(answers
            .files
            .into_iter()
            .map(|a| (a.path.clone(), a))
            .collect())
    }

    /// Pushes LFS objects the Hub does not already have.
    async fn upload_lfs(&self, objects: &[(&LocalFile, LfsPointer)]) -> Result<(), MirrorError> {
        let pointers: Vec<&LfsPointer> = objects.iter().map(|(_, p)| p).collect();
        let response = self
            .client
            .post(format!(
                "{}/{}s/{}.git/info/lfs/objects/batch",
                self.endpoint, REPO_TYPE, self.repo_id
            ))
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, LFS_CONTENT_TYPE)
            .header(reqwest::header::CONTENT_TYPE, LFS_CONTENT_TYPE)
            .body(serde_json::to_vec(&serde_json::json!({
                "operation": "upload",
                "transfers": ["basic"],
                "objects": pointers,
                "hash_algo": "sha256",
                "ref": { "name": REVISION },
            }))?)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(MirrorError::from_response("lfs batch", response).await);
        }
        let batch_status = response.status().as_u16();
        let batch: LfsBatchResponse = response.json().await?;

        for object in batch.objects {
            if let Some(err) = object.error {
                return Err(MirrorError::Api {
                    operation: "lfs batch",
                    status: u16::try_from(err.code).unwrap_or(0),
                    body: format!("{}: {}", object.oid, err.message),
                });
            }
            let Some((file, pointer)) = objects.iter().find(|(_, p)| p.oid == object.oid) else {
                warn!("LFS batch answered for unknown object {}", object.oid);
                continue;
            };
            let actions = object.actions.unwrap_or_default();

            let Some(upload) = actions.upload else {
                debug!("LFS object for {} already present", file.repo_path);
                continue;
            };
            // Multipart instructions carry `chunk_size` and numbered part URLs in the header map.
            if let Some(chunk_size) = upload.header.get("chunk_size") {
                return Err(MirrorError::Api {
                    operation: "lfs upload",
                    status: batch_status,
                    body: format!(
                        "{} needs a multipart upload (chunk_size {}), which is not supported",
                        file.repo_path, chunk_size
                    ),
                });
            }
            let mut request = self.client.put(&upload.href);
            for (name, value) in &upload.header {
                request = request.header(name, value);
            }
            let response = request.body(tokio::fs::read(&file.abs).await?).send().await?;
            if !response.status().is_success() {
                return Err(MirrorError::from_response("lfs upload", response).await);
            }
            debug!("Uploaded LFS object for {}", file.repo_path);

            if let Some(verify) = actions.verify {
                let mut request = self.client.post(&verify.href).bearer_auth(&self.token);
                for (name, value) in &verify.header {
                    request = request.header(name, value);
                }
                let response = request.json(pointer).send().await?;
                if !response.status().is_success() {
                    return Err(MirrorError::from_response("lfs verify", response).await);
                }
            }
        }

        Ok(())
    }

    /// Creates one commit adding or replacing `regular` inline and `lfs` by pointer.
    async fn commit(
        &self,
        message: &str,
        regular: &[&LocalFile],
        lfs: &[(&LocalFile, LfsPointer)],
    ) -> Result<(), MirrorError> {
        let mut lines = Vec::with_capacity(1 + regular.len() + lfs.len());
        lines.push(serde_json::to_string(&CommitLine::Header {
            summary: message,
            description: "",
        })?);
        for file in regular {
            let bytes = tokio::fs::read(&file.abs).await?;
            lines.push(serde_json::to_string(&CommitLine::File {
                path: &file.repo_path,
                content: BASE64_STANDARD.encode(bytes),
                encoding: "base64",
            })?);
        }
        for (file, pointer) in lfs {
            lines.push(serde_json::to_string(&CommitLine::LfsFile {
                path: &file.repo_path,
                algo: "sha256",
                oid: &pointer.oid,
                size: pointer.size,
            })?);
        }

        let response = self
            .client
            .post(self.api_url(&format!("commit/{}", REVISION)))
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(lines.join("\n"))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(MirrorError::from_response("commit", response).await);
        }
        Ok(())
    }
}

/// Lists every file under `local`, keyed by its path in the repository.
fn collect_files(local: &Path, path_in_repo: &str) -> Result<Vec<LocalFile>, MirrorError> {
    let prefix = path_in_repo.trim_matches('/');
    let mut files = Vec::new();

    for entry in WalkDir::new(local).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            MirrorError::IoError(e.into_io_error().unwrap_or_else(|| {
                std::io::Error::other(format!("walking {}", local.display()))
            }))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(local)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let rel = rel.to_string_lossy().replace('\\', "/");
        let repo_path = if prefix.is_empty() {
            rel
        } else {
            format!("{}/{}", prefix, rel)
        };

        files.push(LocalFile {
            abs: entry.path().to_path_buf(),
            repo_path,
            size: entry.metadata().map_err(|e| std::io::Error::other(e.to_string()))?.len(),
        });
    }

    Ok(files)
}

fn read_sample(path: &Path) -> Result<Vec<u8>, MirrorError> {
    use std::io::Read;

    let file = std::fs::File::open(path)?;
    let mut sample = Vec::with_capacity(SAMPLE_BYTES);
    file.take(SAMPLE_BYTES as u64).read_to_end(&mut sample)?;
    Ok(sample)
}

/// Computes the SHA-256 of a local file as lowercase hex.
///
/// Runs in a blocking task; the file is read in chunks.
async fn compute_file_sha256(path: &Path) -> Result<String, MirrorError> {
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        use sha2::{Digest, Sha256};
        use std::io::Read;

        let file = std::fs::File::open(&path)?;
        let mut reader = std::io::BufReader::with_capacity(1024 * 1024, file);
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 1024 * 1024];

        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    })
    .await
    .map_err(|e| MirrorError::IoError(std::io::Error::other(format!("Task join error: {}", e))))?
}

#[async_trait]
impl DatasetHost for HubClient {
    #[instrument(skip(self), fields(repo = %self.repo_id))]
    async fn delete_dataset(&self) -> DeleteOutcome {
        let (organization, name) = self.repo_parts();
        let result = self
            .client
            .delete(format!("{}/api/repos/delete", self.endpoint))
            .bearer_auth(&self.token)
            .json(&RepoRequest {
                name,
                organization,
                repo_type: REPO_TYPE,
                private: None,
            })
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => DeleteOutcome::Deleted,
            Ok(response) if response.status() == StatusCode::NOT_FOUND => DeleteOutcome::NotFound,
            Ok(response) => {
                DeleteOutcome::Failed(MirrorError::from_response("delete repo", response).await.to_string())
            }
            Err(e) => DeleteOutcome::Failed(e.to_string()),
        }
    }

    #[instrument(skip(self), fields(repo = %self.repo_id))]
    async fn create_dataset(&self) -> Result<CreateOutcome, MirrorError> {
        let (organization, name) = self.repo_parts();
        let response = self
            .client
            .post(format!("{}/api/repos/create", self.endpoint))
            .bearer_auth(&self.token)
            .json(&RepoRequest {
                name,
                organization,
                repo_type: REPO_TYPE,
                private: Some(false),
            })
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(CreateOutcome::Created),
            StatusCode::CONFLICT => Ok(CreateOutcome::AlreadyExists),
            _ => Err(MirrorError::from_response("create repo", response).await),
        }
    }

    #[instrument(skip(self, local), fields(repo = %self.repo_id))]
    async fn upload_folder(
        &self,
        local: &Path,
        path_in_repo: &str,
        message: &str,
    ) -> Result<usize, MirrorError> {
        let files = collect_files(local, path_in_repo)?;
        if files.is_empty() {
            info!("{} holds no files; nothing to commit", local.display());
            return Ok(0);
        }

        let mut regular = Vec::new();
        let mut lfs = Vec::new();
        for batch in files.chunks(PREUPLOAD_BATCH) {
            let answers = self.preupload(batch).await?;
            for file in batch {
                match answers.get(&file.repo_path) {
                    Some(a) if a.should_ignore => debug!("Hub ignores {}", file.repo_path),
                    Some(a) if a.upload_mode == "lfs" => {
                        let pointer = LfsPointer {
                            oid: compute_file_sha256(&file.abs).await?,
                            size: file.size,
                        };
                        lfs.push((file, pointer));
                    }
                    _ => regular.push(file),
                }
            }
        }

        if !lfs.is_empty() {
            self.upload_lfs(&lfs).await?;
        }
        let committed = regular.len() + lfs.len();
        self.commit(message, &regular, &lfs).await?;

        info!(
            "Committed {} file(s) under {} ({} via LFS)",
            committed,
            path_in_repo,
            lfs.len()
        );
        Ok(committed)
    }
}
