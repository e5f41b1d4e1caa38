//! Input resolution: turn a path, URL or byte buffer into an in-memory PDF.
//!
//! The rasteriser re-opens the document once per requested page range, so the
//! bytes are read once here and shared behind an `Arc`. The `%PDF` magic check
//! happens up front so a wrong file type becomes a [`QuizError::DocumentRead`]
//! before any model call is made.

use crate::error::QuizError;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// A PDF held in memory, with a label for logs and paper files.
#[derive(Debug, Clone)]
pub struct PdfSource {
    label: String,
    bytes: Arc<Vec<u8>>,
}

impl PdfSource {
    /// Wrap an in-memory buffer.
    pub fn from_bytes(label: impl Into<String>, bytes: Vec<u8>) -> Result<Self, QuizError> {
        check_magic(&bytes)?;
        Ok(Self {
            label: label.into(),
            bytes: Arc::new(bytes),
        })
    }

    /// Where the document came from (path or URL).
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn bytes(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a local path or HTTP(S) URL to a [`PdfSource`].
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<PdfSource, QuizError> {
    if input.trim().is_empty() {
        return Err(QuizError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

async fn read_local(path_str: &str) -> Result<PdfSource, QuizError> {
    let path = PathBuf::from(path_str);

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => QuizError::FileNotFound { path: path.clone() },
        _ => QuizError::DocumentRead {
            detail: format!("{}: {}", path.display(), e),
        },
    })?;

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    PdfSource::from_bytes(path_str, bytes)
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<PdfSource, QuizError> {
    info!("Downloading PDF from: {}", url);

    let download_err = |reason: String| QuizError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| download_err(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            download_err(format!("timed out after {timeout_secs}s"))
        } else {
            download_err(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(download_err(format!("HTTP {}", response.status())));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| download_err(e.to_string()))?;

    info!("Downloaded {} bytes", bytes.len());
    PdfSource::from_bytes(url, bytes.to_vec())
}

fn check_magic(bytes: &[u8]) -> Result<(), QuizError> {
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        let magic: Vec<u8> = bytes.iter().take(4).copied().collect();
        return Err(QuizError::DocumentRead {
            detail: format!("not a PDF (first bytes: {magic:?})"),
        });
    }
    Ok(())
}
