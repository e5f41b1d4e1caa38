//! # paper2quiz
//!
//! Turn scanned multiple-choice exam papers into structured question banks
//! using Vision Language Models (VLMs).
//!
//! ## Why this crate?
//!
//! Exam papers are usually scans: OCR gets the text but loses which option
//! belongs to which stem, and which one the marker circled. Instead this crate
//! rasterises each page and asks a VLM to read the questions off it as JSON,
//! repairs the JSON when the model gets the syntax slightly wrong, and later
//! asks a text model to write an explanation for each answered question.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve local file or download from URL
//!  ├─ 2. Render    rasterise one page at a time via pdfium (spawn_blocking)
//!  ├─ 3. Extract   page image → VLM → {"questions": [...]} → repair if needed
//!  ├─ 4. Number    renumber questions 1..N across the range
//!  ├─ 5. Save      paper file (JSON), written atomically
//!  └─ 6. Explain   per-question explanation backfill, checkpointed every N
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paper2quiz::{extract_to_file, ExtractionConfig, GatewayConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credentials come from GEMINI_API_KEY / OPENAI_API_KEY / ...
//!     let gateway = GatewayConfig::default();
//!     let extraction = ExtractionConfig::default();
//!     let paper = extract_to_file("biology.pdf", "biology.json", 2, 14, None, &gateway, &extraction).await?;
//!     eprintln!("{} questions, {}", paper.questions.len(), paper.stats.estimated_cost);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `paper2quiz` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## Failure behaviour
//!
//! Extraction fails closed: one bad page aborts the range. Backfill fails
//! open: one bad question is logged and skipped, and the checkpoint keeps
//! everything already generated.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backfill;
pub mod config;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod ingest;
pub mod paper;
pub mod persist;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod usage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backfill::{BackfillReport, CheckpointStore, ExplanationBackfiller, JsonFileCheckpoint};
pub use config::{BackfillConfig, ExtractionConfig, GatewayConfig};
pub use error::QuizError;
pub use extract::{validate_questions, validate_records, QuestionExtractor};
pub use gateway::{LlmBackend, ModelBackend, ModelGateway, ModelReply, ModelRequest, Part};
pub use ingest::{explain_file, extract_paper, extract_to_file, inspect, validate_file};
pub use paper::{ExtractedQuestion, PaperExtractionResult, PaperFile, PaperStats, QuestionRecord};
pub use persist::{import_paper, NewQuestion, PaperStore};
pub use pipeline::encode::{ImageFormat, PageImage};
pub use pipeline::render::{PageSource, PdfiumPageSource};
pub use pipeline::repair::repair_json;
pub use progress::{
    BackfillProgress, BackfillProgressCallback, ExtractionProgress, ExtractionProgressCallback,
    NoopProgressCallback,
};
pub use usage::{Pricing, TokenUsage};
