use std::io::Read;
use std::path::Path;
use std::time::Duration;

use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

const FALLBACK_FILE_NAME: &str = "update-download.zip";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("download failed with HTTP {status}")]
    Status { status: reqwest::StatusCode },
    #[error("download truncated: expected {expected} bytes, received {received}")]
    Truncated { expected: u64, received: u64 },
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

impl ArtifactError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    fn http(context: &'static str, source: reqwest::Error) -> Self {
        Self::Http { context, source }
    }

    fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }

    fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::io(
            context,
            std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        )
    }
}

/// File name to store a download under, derived from the last URL segment.
#[must_use]
pub fn file_name_from_url(url: &str) -> &str {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let raw_name = without_query.rsplit('/').next().unwrap_or(FALLBACK_FILE_NAME);
    Path::new(raw_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && !n.contains(".."))
        .unwrap_or(FALLBACK_FILE_NAME)
}

/// Stream `url` into `dest`, returning the number of bytes written.
///
/// # Errors
/// Returns an error on transport failure or timeout, a non-success status, a
/// body shorter than the announced `Content-Length`, or a local write error.
pub async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    timeout: Duration,
) -> Result<u64, ArtifactError> {
    use futures_util::StreamExt;

    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|error| ArtifactError::http("download request failed", error))?;

    if !response.status().is_success() {
        return Err(ArtifactError::Status {
            status: response.status(),
        });
    }

    let expected = response.content_length();
    let mut downloaded: u64 = 0;

    let mut file = tokio::fs::File::create(dest).await.map_err(|error| {
        ArtifactError::io_with_path("failed to create download file", dest, &error)
    })?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|error| ArtifactError::http("download stream error", error))?;
        file.write_all(&chunk).await.map_err(|error| {
            ArtifactError::io_with_path("failed to write download data", dest, &error)
        })?;
        downloaded += chunk.len() as u64;
    }

    file.flush().await.map_err(|error| {
        ArtifactError::io_with_path("failed to flush download file", dest, &error)
    })?;

    if let Some(expected) = expected
        && downloaded < expected
    {
        return Err(ArtifactError::Truncated {
            expected,
            received: downloaded,
        });
    }

    info!("Download complete: {downloaded} bytes");
    Ok(downloaded)
}

/// Check a downloaded file against a hex SHA-256 digest.
///
/// # Errors
/// Returns an error when the file cannot be read or the digest differs.
pub fn verify_sha256(path: &Path, expected: &str) -> Result<(), ArtifactError> {
    let actual = sha256_file(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        info!("Update checksum verified for {}", path.display());
        Ok(())
    } else {
        Err(ArtifactError::ChecksumMismatch {
            expected: expected.to_ascii_lowercase(),
            actual,
        })
    }
}

fn sha256_file(path: &Path) -> Result<String, ArtifactError> {
    let mut file = std::fs::File::open(path).map_err(|error| {
        ArtifactError::io_with_path("failed to open file for checksum", path, &error)
    })?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 8192];

    loop {
        let read = file.read(&mut buffer).map_err(|error| {
            ArtifactError::io_with_path("failed to read file for checksum", path, &error)
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Unpack a zip archive into `dest`, returning the number of files written.
/// Entries whose path would escape `dest` are skipped.
///
/// # Errors
/// Returns an error when the payload is not a readable zip archive or a file
/// cannot be written.
pub fn extract_zip(zip_path: &Path, dest: &Path) -> Result<usize, ArtifactError> {
    let file = std::fs::File::open(zip_path).map_err(|error| {
        ArtifactError::io_with_path("failed to open zip file", zip_path, &error)
    })?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|error| ArtifactError::zip("failed to read zip archive", error))?;

    std::fs::create_dir_all(dest).map_err(|error| {
        ArtifactError::io_with_path("failed to create extraction directory", dest, &error)
    })?;

    let mut files = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|error| ArtifactError::zip("failed to read zip entry", error))?;
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping zip entry with unsafe path");
            continue;
        };
        let out_path = dest.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|error| {
                ArtifactError::io_with_path(
                    "failed to create extraction directory",
                    &out_path,
                    &error,
                )
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                ArtifactError::io_with_path(
                    "failed to create extraction parent directory",
                    parent,
                    &error,
                )
            })?;
        }
        let mut outfile = std::fs::File::create(&out_path).map_err(|error| {
            ArtifactError::io_with_path("failed to create extracted file", &out_path, &error)
        })?;
        std::io::copy(&mut entry, &mut outfile).map_err(|error| {
            ArtifactError::io_with_path("failed to extract archive entry", &out_path, &error)
        })?;
        files += 1;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                let _ = std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
            }
        }
    }

    debug!("Extracted {files} files to {}", dest.display());
    Ok(files)
}
