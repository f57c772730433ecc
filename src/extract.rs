//! Zip archive extraction into the shared extraction directory.

use crate::error::MirrorError;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::info;
use zip::ZipArchive;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Folder name some historical archives used for the nether world.
pub const MISSPELLED_NETHER: &str = "world_nither";

/// Correct name of the nether world folder.
pub const NETHER: &str = "world_nether";

/// Extracts a zip archive into `dest`, overwriting files already there.
///
/// # Arguments
///
/// * `archive_path` - Path to the zip file
/// * `dest` - Target directory for extraction
/// * `extract_pb` - Progress bar for visual feedback
///
/// # Returns
///
/// The number of files written, or an error if the archive is unreadable or
/// contains an entry that would land outside `dest`.
pub fn extract_zip(
    archive_path: &Path,
    dest: &Path,
    extract_pb: &indicatif::ProgressBar,
) -> Result<u64, MirrorError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;
    fs::create_dir_all(dest)?;

    let mut file_count = 0u64;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let relative = sanitize_entry_path(entry.name()).ok_or_else(|| {
            MirrorError::UnsafeArchivePath {
                archive: archive_path.to_path_buf(),
                entry: entry.name().to_string(),
            }
        })?;
        let destination = dest.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&destination)?;
            continue;
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut output = File::create(&destination)?;
        io::copy(&mut entry, &mut output)?;

        // Owner keeps read/write so later archives can overwrite and upload can read.
        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            fs::set_permissions(
                &destination,
                fs::Permissions::from_mode((mode & 0o7777) | 0o600),
            )?;
        }

        file_count += 1;
        if file_count <= 10 || file_count % 100 == 0 {
            extract_pb.set_message(format!(
                "📂 Extracting: {} files | {}",
                file_count,
                relative.display()
            ));
        }
        extract_pb.inc(1);
    }

    Ok(file_count)
}

/// Maps an entry name onto a relative path, or `None` if it is absolute or climbs out.
fn sanitize_entry_path(name: &str) -> Option<PathBuf> {
    let normalized = name.replace('\\', "/");
    let path = Path::new(&normalized);

    let mut sanitized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => sanitized.push(segment),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if sanitized.as_os_str().is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

/// Extracts every archive into `dest` in order; later archives win on collisions.
pub fn extract_all(archives: &[PathBuf], dest: &Path) -> Result<u64, MirrorError> {
    let extract_pb = indicatif::ProgressBar::new_spinner();
    if let Ok(style) =
        indicatif::ProgressStyle::default_spinner().template("{spinner:.cyan} {msg} {pos} files | {elapsed_precise} elapsed")
    {
        extract_pb.set_style(style);
    }
    extract_pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let mut total = 0u64;
    for archive in archives {
        let count = extract_zip(archive, dest, &extract_pb)?;
        info!("Extracted: {} ({} files)", archive.display(), count);
        total += count;
    }

    extract_pb.finish_with_message(format!(
        "✅ Extracted {} files from {} archive(s) to {}",
        total,
        archives.len(),
        dest.display()
    ));
    Ok(total)
}

/// Renames `world_nither` to `world_nether` when only the misspelled folder exists.
///
/// Returns whether the rename happened.
pub fn fix_misspelled_nether(dest: &Path) -> Result<bool, MirrorError> {
    let bad = dest.join(MISSPELLED_NETHER);
    let good = dest.join(NETHER);
    if bad.exists() && !good.exists() {
        fs::rename(&bad, &good)?;
        info!("Renamed {} to {}", bad.display(), good.display());
        return Ok(true);
    }
    Ok(false)
}
