//! PDF rasterisation: render selected pages to PNG [`PageImage`]s via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which uses thread-local
//! state and blocks for the whole render. `tokio::task::spawn_blocking` keeps
//! that work off the async worker threads.
//!
//! ## Decode everything, keep a subset
//!
//! [`rasterize`] walks every page of the document in order and only renders
//! pages whose number is in the requested set. Exam papers run to tens or low
//! hundreds of pages, so this is simpler than random access and cheap enough.
//! A page that fails to render is logged and left out of the output; a
//! document that fails to open is a [`QuizError::DocumentRead`].

use crate::error::QuizError;
use crate::pipeline::encode::{encode_page, PageImage};
use crate::pipeline::input::PdfSource;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Anything that can hand out rasterised pages of one document.
///
/// The extraction driver only talks to this trait, which lets tests feed it
/// synthetic pages without a pdfium library on the machine.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Human-readable origin of the document (path or URL).
    fn label(&self) -> &str;

    /// Total number of pages, without rendering anything.
    async fn page_count(&self) -> Result<usize, QuizError>;

    /// Render the requested 1-indexed pages, sorted ascending by page number.
    async fn rasterize(
        &self,
        pages: &BTreeSet<usize>,
        scale: f32,
    ) -> Result<Vec<PageImage>, QuizError>;
}

/// [`PageSource`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumPageSource {
    source: PdfSource,
    password: Option<String>,
}

impl PdfiumPageSource {
    pub fn new(source: PdfSource, password: Option<String>) -> Self {
        Self { source, password }
    }
}

#[async_trait]
impl PageSource for PdfiumPageSource {
    fn label(&self) -> &str {
        self.source.label()
    }

    async fn page_count(&self) -> Result<usize, QuizError> {
        page_count(&self.source, self.password.as_deref()).await
    }

    async fn rasterize(
        &self,
        pages: &BTreeSet<usize>,
        scale: f32,
    ) -> Result<Vec<PageImage>, QuizError> {
        rasterize(&self.source, pages, scale, self.password.as_deref()).await
    }
}

/// Rasterise the given 1-indexed pages at `scale` × the default resolution.
pub async fn rasterize(
    source: &PdfSource,
    pages: &BTreeSet<usize>,
    scale: f32,
    password: Option<&str>,
) -> Result<Vec<PageImage>, QuizError> {
    let bytes = source.bytes();
    let pages = pages.clone();
    let password = password.map(|s| s.to_string());

    tokio::task::spawn_blocking(move || {
        rasterize_blocking(&bytes, password.as_deref(), &pages, scale)
    })
    .await
    .map_err(|e| QuizError::Internal(format!("Render task panicked: {}", e)))?
}

/// Count the pages of a document without rendering any of them.
pub async fn page_count(source: &PdfSource, password: Option<&str>) -> Result<usize, QuizError> {
    let bytes = source.bytes();
    let password = password.map(|s| s.to_string());

    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium()?;
        let document = open_document(&pdfium, &bytes, password.as_deref())?;
        Ok(document.pages().len() as usize)
    })
    .await
    .map_err(|e| QuizError::Internal(format!("Page-count task panicked: {}", e)))?
}

fn rasterize_blocking(
    bytes: &[u8],
    password: Option<&str>,
    pages: &BTreeSet<usize>,
    scale: f32,
) -> Result<Vec<PageImage>, QuizError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, bytes, password)?;
    info!("PDF loaded: {} pages", document.pages().len());

    let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
    let mut results = Vec::with_capacity(pages.len());

    for (idx, page) in document.pages().iter().enumerate() {
        let page_number = idx + 1;
        if !pages.contains(&page_number) {
            continue;
        }

        let bitmap = match page.render_with_config(&render_config) {
            Ok(bitmap) => bitmap,
            Err(e) => {
                warn!("Page {}: rasterisation failed: {:?}", page_number, e);
                continue;
            }
        };

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page_number,
            image.width(),
            image.height()
        );

        match encode_page(page_number, &image) {
            Ok(encoded) => results.push(encoded),
            Err(e) => warn!("Page {}: image encoding failed: {}", page_number, e),
        }
    }

    results.sort_by_key(|p| p.page_number);
    Ok(results)
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    bytes: &'a [u8],
    password: Option<&str>,
) -> Result<PdfDocument<'a>, QuizError> {
    pdfium
        .load_pdf_from_byte_slice(bytes, password)
        .map_err(|e| QuizError::DocumentRead {
            detail: format!("{:?}", e),
        })
}

/// Bind pdfium: `PDFIUM_LIB_PATH` first, then the working directory, then the system library.
fn bind_pdfium() -> Result<Pdfium, QuizError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| QuizError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}
