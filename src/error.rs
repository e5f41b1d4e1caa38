//! Error types for the paper2quiz library.
//!
//! Every fatal condition is a variant of [`QuizError`]. Whether an error is
//! fatal for a whole run depends on the driver that sees it:
//!
//! * The extraction driver fails closed: any gateway error while extracting a
//!   page aborts the range. Only a page that rasterises to nothing is skipped.
//!
//! * The explanation backfill driver fails open: gateway errors
//!   ([`QuizError::is_model_error`]) are logged against the question index and
//!   counted, and the run moves on. Checkpoint write failures still abort.

use std::path::PathBuf;
use thiserror::Error;

/// Maximum number of characters of raw model output carried in a parse error.
pub const SNIPPET_CHARS: usize = 300;

/// All fatal errors returned by the paper2quiz library.
#[derive(Debug, Error)]
pub enum QuizError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The document could not be parsed (corrupt file, wrong format, bad password).
    #[error("Cannot read PDF document: {detail}")]
    DocumentRead { detail: String },

    /// Requested page range does not fit the document.
    #[error("Page range {start}-{end} is invalid (document has {total} pages)")]
    PageOutOfRange {
        start: usize,
        end: usize,
        total: usize,
    },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// The model provider cannot be used (missing API key, unknown provider).
    #[error("Model provider '{provider}' is not configured.\n{hint}")]
    Configuration { provider: String, hint: String },

    /// Transport or service failure calling the model. Never retried here.
    #[error("Model call failed: {message}")]
    ModelCall { message: String },

    /// The model replied with text that is not valid JSON, even after repair.
    #[error("Model output is not valid JSON ({detail})\nRaw output starts with: {snippet}")]
    ModelOutputParse { detail: String, snippet: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// A checkpoint or paper file exists but could not be read or decoded.
    #[error("Failed to read paper file '{path}': {detail}")]
    CheckpointRead { path: PathBuf, detail: String },

    /// Could not write a checkpoint or output file.
    #[error("Failed to write '{path}': {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The persistence adapter rejected an insert.
    #[error("Persistence error: {0}")]
    Persistence(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QuizError {
    /// Build a [`QuizError::ModelOutputParse`] from the raw model text.
    pub fn output_parse(detail: impl Into<String>, raw: &str) -> Self {
        QuizError::ModelOutputParse {
            detail: detail.into(),
            snippet: truncate_snippet(raw, SNIPPET_CHARS),
        }
    }

    /// True for errors raised by the model gateway (call or parse failures).
    pub fn is_model_error(&self) -> bool {
        matches!(
            self,
            QuizError::ModelCall { .. } | QuizError::ModelOutputParse { .. }
        )
    }
}

/// Truncate `text` to at most `max_chars` characters, appending `…` when cut.
pub fn truncate_snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}\u{2026}", &text[..byte_idx]),
        None => text.to_string(),
    }
}
