//! Archive download to scratch storage.

use crate::error::MirrorError;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

/// Streams a successful response body into `dir/name`.
///
/// # Arguments
///
/// * `response` - A response whose status has already been checked
/// * `dir` - Scratch directory, created if missing
/// * `name` - Local file name
/// * `pb` - Progress bar advanced by the bytes written
///
/// # Returns
///
/// The path of the written file, or an error if the body was cut short.
pub(crate) async fn stream_to_file(
    response: reqwest::Response,
    dir: &Path,
    name: &str,
    pb: &indicatif::ProgressBar,
) -> Result<PathBuf, MirrorError> {
    tokio::fs::create_dir_all(dir).await?;
    let filename = dir.join(name);

    let content_length = response.content_length();
    if let Some(len) = content_length {
        pb.inc_length(len);
    }

    let mut file = BufWriter::new(tokio::fs::File::create(&filename).await?);
    let mut byte_stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(piece) = byte_stream.next().await {
        let chunk = match piece {
            Ok(chunk) => chunk,
            Err(e) => match content_length {
                Some(expected) if written < expected => {
                    warn!("Connection dropped while downloading {}: {}", name, e);
                    return Err(MirrorError::Truncated {
                        name: name.to_string(),
                        expected,
                        actual: written,
                    });
                }
                _ => return Err(e.into()),
            },
        };
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        pb.inc(chunk.len() as u64);
    }
    file.flush().await?;

    match content_length {
        Some(expected) if expected != written => {
            return Err(MirrorError::Truncated {
                name: name.to_string(),
                expected,
                actual: written,
            });
        }
        Some(_) => {}
        None => {
            warn!(
                "Content-Length header was not present for {}. Cannot verify file size.",
                name
            );
            pb.inc_length(written);
        }
    }

    debug!("Saved {} ({} bytes)", filename.display(), written);
    Ok(filename)
}

/// Progress bar used while archives download.
pub(crate) fn download_progress(archives: usize) -> indicatif::ProgressBar {
    let pb = indicatif::ProgressBar::new(0);
    if let Ok(style) = indicatif::ProgressStyle::default_bar().template(
        "{spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg} | {elapsed_precise} elapsed",
    ) {
        pb.set_style(style.progress_chars("█▓▒░ "));
    }
    pb.set_message(format!("📦 Downloading {} archive(s)", archives));
    pb
}
