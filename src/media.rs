//! Media download to scratch storage.
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MediaDownloadError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {status} fetching {url}")]
    Status { status: StatusCode, url: String },
    #[error("scratch file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One downloaded media file in scratch storage.
///
/// The caller owns deletion; the publisher removes the file right after
/// each upload attempt so no asset outlives a single publish call.
#[derive(Debug)]
pub struct MediaAsset {
    pub path: PathBuf,
    pub content_type: &'static str,
}

impl MediaAsset {
    /// Delete the scratch file. Failure to delete is logged, not fatal.
    pub async fn remove(self) {
        if let Err(err) = tokio::fs::remove_file(&self.path).await {
            warn!(path = %self.path.display(), %err, "failed to remove scratch file");
        }
    }
}

/// Map a declared content type onto (extension, canonical content type).
/// Anything unrecognized or missing falls back to JPEG.
fn extension_for(content_type: Option<&str>) -> (&'static str, &'static str) {
    match content_type {
        Some(ct) if ct.starts_with("image/jpeg") => (".jpg", "image/jpeg"),
        Some(ct) if ct.starts_with("image/png") => (".png", "image/png"),
        Some(ct) if ct.starts_with("image/gif") => (".gif", "image/gif"),
        _ => (".jpg", "image/jpeg"),
    }
}

/// Streaming GET of `url` into a uniquely named file under `scratch_dir`.
///
/// Fails on non-2xx status or transport error; the caller decides whether
/// that is fatal (for the pipeline it never is — the asset is skipped).
pub async fn download(
    http: &Client,
    url: &str,
    scratch_dir: &Path,
) -> Result<MediaAsset, MediaDownloadError> {
    let res = http.get(url).send().await?;
    if !res.status().is_success() {
        return Err(MediaDownloadError::Status {
            status: res.status(),
            url: url.to_string(),
        });
    }

    let declared = res
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let (ext, content_type) = extension_for(declared.as_deref());

    // Process-unique name so overlapping invocations cannot collide.
    let path = scratch_dir.join(format!("skymirror-{}{}", Uuid::new_v4(), ext));
    let mut file = tokio::fs::File::create(&path).await?;
    if let Err(err) = write_body(&mut file, res).await {
        // A truncated download must not leave a partial scratch file behind.
        drop(file);
        if let Err(remove_err) = tokio::fs::remove_file(&path).await {
            warn!(path = %path.display(), %remove_err, "failed to remove partial scratch file");
        }
        return Err(err);
    }

    Ok(MediaAsset { path, content_type })
}

async fn write_body(
    file: &mut tokio::fs::File,
    res: reqwest::Response,
) -> Result<(), MediaDownloadError> {
    let mut stream = res.bytes_stream();
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_content_types_map_to_extensions() {
        assert_eq!(extension_for(Some("image/jpeg")), (".jpg", "image/jpeg"));
        assert_eq!(extension_for(Some("image/png")), (".png", "image/png"));
        assert_eq!(extension_for(Some("image/gif")), (".gif", "image/gif"));
    }

    #[test]
    fn charset_parameters_are_ignored() {
        assert_eq!(extension_for(Some("image/png; charset=binary")), (".png", "image/png"));
    }

    #[test]
    fn unknown_or_missing_defaults_to_jpeg() {
        assert_eq!(extension_for(Some("video/mp4")), (".jpg", "image/jpeg"));
        assert_eq!(extension_for(None), (".jpg", "image/jpeg"));
    }
}
