//! Archive acquisition from the source folder.

use crate::download::download_progress;
use crate::error::MirrorError;
use crate::types::{ArchiveFilter, RemoteArchive};
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use std::path::{Path, PathBuf};
use tracing::info;

/// A folder of backup archives that can be listed and downloaded.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// Lists the zip archives in the folder that pass `filter`, in discovery order.
    async fn list_archives(&self, filter: ArchiveFilter) -> Result<Vec<RemoteArchive>, MirrorError>;

    /// Downloads `archive` into `dir` and returns the local path.
    async fn download(
        &self,
        archive: &RemoteArchive,
        dir: &Path,
        pb: &indicatif::ProgressBar,
    ) -> Result<PathBuf, MirrorError>;
}

/// Midnight UTC of the day containing `now`.
pub(crate) fn start_of_utc_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Scratch subdirectory for the `index`-th discovered archive.
pub(crate) fn archive_slot(download_dir: &Path, index: usize) -> PathBuf {
    download_dir.join(format!("{:04}", index))
}

pub(crate) fn is_zip_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".zip")
}

/// Lists and downloads every matching archive, one after another.
///
/// Each archive lands in its own numbered subdirectory of `download_dir`, so
/// archives sharing a file name never overwrite each other. Returns the local
/// archive paths in discovery order; an empty vector means the folder had
/// nothing to mirror and nothing was downloaded.
pub async fn acquire_archives(
    source: &dyn ArchiveSource,
    filter: ArchiveFilter,
    download_dir: &Path,
) -> Result<Vec<PathBuf>, MirrorError> {
    let archives = source.list_archives(filter).await?;
    if archives.is_empty() {
        info!("No new zip files found ({:?})", filter);
        return Ok(Vec::new());
    }
    info!("Found {} archive(s) to mirror", archives.len());

    let pb = download_progress(archives.len());
    let mut local = Vec::with_capacity(archives.len());
    for (index, archive) in archives.iter().enumerate() {
        pb.set_message(format!("| ⬇️  Downloading: {}", archive.name));
        let path = source
            .download(archive, &archive_slot(download_dir, index), &pb)
            .await?;
        info!("Downloaded: {}", path.display());
        local.push(path);
    }
    pb.finish_with_message(format!("✅ Downloaded {} archive(s)", local.len()));

    Ok(local)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory source serving canned archive bytes.
    pub(crate) struct FakeSource {
        pub archives: Vec<(RemoteArchive, Vec<u8>)>,
        pub downloads: Mutex<Vec<String>>,
    }

    impl FakeSource {
        pub(crate) fn new(archives: Vec<(&str, Vec<u8>)>) -> Self {
            Self {
                archives: archives
                    .into_iter()
                    .enumerate()
                    .map(|(i, (name, bytes))| {
                        (
                            RemoteArchive {
                                id: format!("id-{}", i),
                                name: name.to_string(),
                                modified_time: None,
                            },
                            bytes,
                        )
                    })
                    .collect(),
                downloads: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ArchiveSource for FakeSource {
        async fn list_archives(
            &self,
            _filter: ArchiveFilter,
        ) -> Result<Vec<RemoteArchive>, MirrorError> {
            Ok(self.archives.iter().map(|(a, _)| a.clone()).collect())
        }

        async fn download(
            &self,
            archive: &RemoteArchive,
            dir: &Path,
            _pb: &indicatif::ProgressBar,
        ) -> Result<PathBuf, MirrorError> {
            let bytes: HashMap<&str, &Vec<u8>> = self
                .archives
                .iter()
                .map(|(a, b)| (a.id.as_str(), b))
                .collect();
            std::fs::create_dir_all(dir)?;
            let path = dir.join(archive.local_name());
            std::fs::write(&path, bytes[archive.id.as_str()])?;
            self.downloads.lock().unwrap().push(archive.name.clone());
            Ok(path)
        }
    }

    #[test]
    fn test_start_of_utc_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 17, 45, 12).unwrap();
        assert_eq!(
            start_of_utc_day(now),
            Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_is_zip_name() {
        assert!(is_zip_name("world.zip"));
        assert!(is_zip_name("WORLD.ZIP"));
        assert!(!is_zip_name("world.zip.part"));
        assert!(!is_zip_name("notes.txt"));
    }

    #[tokio::test]
    async fn test_acquire_empty_downloads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new(vec![]);
        let paths = acquire_archives(&source, ArchiveFilter::ModifiedToday, dir.path())
            .await
            .unwrap();
        assert!(paths.is_empty());
        assert!(source.downloads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_acquire_preserves_discovery_order() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new(vec![("b.zip", vec![1]), ("a.zip", vec![2])]);
        let paths = acquire_archives(&source, ArchiveFilter::All, dir.path())
            .await
            .unwrap();
        assert_eq!(
            paths,
            vec![dir.path().join("0000/b.zip"), dir.path().join("0001/a.zip")]
        );
        assert_eq!(*source.downloads.lock().unwrap(), vec!["b.zip", "a.zip"]);
    }

    #[tokio::test]
    async fn test_acquire_keeps_archives_with_same_name() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new(vec![
            ("day1/backup.zip", b"FIRST".to_vec()),
            ("day2/backup.zip", b"SECOND".to_vec()),
        ]);
        let paths = acquire_archives(&source, ArchiveFilter::All, dir.path())
            .await
            .unwrap();

        assert_eq!(paths.len(), 2);
        assert_ne!(paths[0], paths[1]);
        let contents: Vec<Vec<u8>> = paths.iter().map(|p| std::fs::read(p).unwrap()).collect();
        assert_eq!(contents, vec![b"FIRST".to_vec(), b"SECOND".to_vec()]);
    }
}
