//! Pipeline stages for exam-paper question extraction.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and the drivers in [`crate::extract`] and
//! [`crate::backfill`] only compose them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ gateway ──▶ repair ──▶ postprocess
//! (path/URL) (pdfium)  (PNG)      (VLM)      (JSON fixup) (choice cleanup)
//! ```
//!
//! 1. [`input`]: read a local path or download a URL into memory
//! 2. [`render`]: rasterise selected pages; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`]: PNG-encode each page into a [`encode::PageImage`]
//! 4. [`repair`]: fence stripping and control-character escaping for model
//!    output that fails to parse as JSON
//! 5. [`postprocess`]: deterministic text cleanup of extracted questions

pub mod encode;
pub mod input;
pub mod postprocess;
pub mod render;
pub mod repair;
