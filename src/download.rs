//! Artifact download with progress reporting.
//!
//! Streams a release asset to disk through a `.part` staging file that is
//! renamed into place on success. On any failure the partial file is
//! removed, so the destination never holds truncated content.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::UpdateError;
use crate::progress::ProgressSink;

/// Stream copy buffer size.
const BUFFER_SIZE: usize = 64 * 1024;

/// Downloads `url` to `dest`, reporting integer percentages to `sink`.
///
/// Percentages are computed from bytes read over the declared content
/// length; when the server omits the length, percentage reporting is
/// skipped entirely and the transfer still completes.
pub fn download(
    client: &reqwest::blocking::Client,
    url: &str,
    dest: &Path,
    sink: &dyn ProgressSink,
) -> Result<(), UpdateError> {
    assert!(!url.is_empty(), "URL must not be empty");

    debug!("Downloading {} -> {}", url, dest.display());

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp = staging_path(dest);

    let result = stream_to_file(client, url, &temp, sink);

    match result {
        Ok(bytes) => {
            fs::rename(&temp, dest).map_err(|e| {
                let _ = fs::remove_file(&temp);
                UpdateError::TransferFailed(format!("failed to move download into place: {}", e))
            })?;
            info!("Downloaded {} bytes to {}", bytes, dest.display());
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&temp);
            warn!("Download failed, removed partial file: {}", e);
            Err(e)
        }
    }
}

/// Returns the staging path for a destination file.
fn staging_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// Streams the response body into `path`, returning the byte count.
fn stream_to_file(
    client: &reqwest::blocking::Client,
    url: &str,
    path: &Path,
    sink: &dyn ProgressSink,
) -> Result<u64, UpdateError> {
    let mut response = client
        .get(url)
        .send()
        .map_err(|e| UpdateError::TransferFailed(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(UpdateError::TransferFailed(format!(
            "server returned {}",
            status
        )));
    }

    let total_bytes = response.content_length();
    if total_bytes.is_none() {
        debug!("No content length declared, progress reporting skipped");
    }

    let mut file = File::create(path)?;
    let mut buffer = [0u8; BUFFER_SIZE];
    let mut total_read: u64 = 0;
    let mut last_percent: u8 = 0;

    loop {
        let read = response
            .read(&mut buffer)
            .map_err(|e| UpdateError::TransferFailed(e.to_string()))?;
        if read == 0 {
            break;
        }

        file.write_all(&buffer[..read])?;
        total_read += read as u64;

        if let Some(total) = total_bytes {
            if total > 0 {
                let percent = ((total_read * 100) / total).min(100) as u8;
                if percent != last_percent {
                    last_percent = percent;
                    sink.set_progress(percent);
                }
            }
        }
    }

    file.flush()?;
    Ok(total_read)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_path_appends_part() {
        let dest = Path::new("/tmp/downloads/update.zip");
        assert_eq!(
            staging_path(dest),
            PathBuf::from("/tmp/downloads/update.zip.part")
        );
    }

    #[test]
    fn test_download_failure_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("artifact.zip");
        let client = reqwest::blocking::Client::new();

        // Unroutable address; the request errors before any bytes land.
        let err = download(
            &client,
            "http://127.0.0.1:1/never.zip",
            &dest,
            &crate::progress::NullSink,
        )
        .unwrap_err();

        assert!(matches!(err, UpdateError::TransferFailed(_)));
        assert!(!dest.exists());
        assert!(!staging_path(&dest).exists());
    }
}
