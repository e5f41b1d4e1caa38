//! File-level entry points used by the CLI.
//!
//! Each function wires the pieces for one job: resolve the input, build a
//! gateway from config, run a driver, and write the result atomically.
//! Library callers who already hold a [`ModelGateway`] or a custom
//! [`crate::pipeline::render::PageSource`] can use the drivers directly.

use crate::backfill::{BackfillReport, ExplanationBackfiller, JsonFileCheckpoint};
use crate::config::{BackfillConfig, ExtractionConfig, GatewayConfig};
use crate::error::QuizError;
use crate::extract::{validate_records, QuestionExtractor};
use crate::gateway::ModelGateway;
use crate::paper::PaperFile;
use crate::pipeline::{input, render};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Extract the questions on pages `start_page..=end_page` of a PDF file or URL.
///
/// `name` defaults to the input's file stem.
///
/// # Errors
/// Extraction fails closed: any rasterizer or gateway error aborts the run
/// and nothing is returned.
pub async fn extract_paper(
    input_str: impl AsRef<str>,
    start_page: usize,
    end_page: usize,
    name: Option<&str>,
    gateway_config: &GatewayConfig,
    extraction_config: &ExtractionConfig,
) -> Result<PaperFile, QuizError> {
    let input_str = input_str.as_ref();
    let source = input::resolve_input(input_str, extraction_config.download_timeout_secs).await?;
    let pages = render::PdfiumPageSource::new(source, extraction_config.password.clone());

    let gateway = Arc::new(ModelGateway::from_config(gateway_config)?);
    let extractor = QuestionExtractor::new(gateway.clone(), extraction_config.clone());
    let result = extractor.extract_range(&pages, start_page, end_page).await?;

    let name = name
        .map(str::to_string)
        .unwrap_or_else(|| default_paper_name(input_str));
    Ok(PaperFile::from_extraction(
        name,
        input_str,
        start_page,
        end_page,
        &result,
        &gateway.pricing(),
    ))
}

/// [`extract_paper`], then write the paper file to `output_path`.
///
/// Nothing is written if extraction fails.
pub async fn extract_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    start_page: usize,
    end_page: usize,
    name: Option<&str>,
    gateway_config: &GatewayConfig,
    extraction_config: &ExtractionConfig,
) -> Result<PaperFile, QuizError> {
    let paper = extract_paper(
        input_str,
        start_page,
        end_page,
        name,
        gateway_config,
        extraction_config,
    )
    .await?;
    let path = output_path.as_ref();
    paper.save(path).await?;
    info!("Wrote {} questions to {}", paper.questions.len(), path.display());
    Ok(paper)
}

/// Backfill explanations for the paper file at `input_path`, checkpointing to `output_path`.
///
/// `output_path` may equal `input_path`.
pub async fn explain_file(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    gateway_config: &GatewayConfig,
    backfill_config: &BackfillConfig,
) -> Result<BackfillReport, QuizError> {
    let input_path = input_path.as_ref();
    let paper = PaperFile::load(input_path).await?;

    let gateway = Arc::new(ModelGateway::from_config(gateway_config)?);
    let store = Arc::new(JsonFileCheckpoint::new(output_path.as_ref()));
    let backfiller = ExplanationBackfiller::new(gateway, backfill_config.clone(), store);

    let (_, report) = backfiller.run(paper).await?;
    Ok(report)
}

/// Page count of a PDF file or URL. Does not need a model or API key.
pub async fn inspect(input_str: impl AsRef<str>, password: Option<&str>) -> Result<usize, QuizError> {
    let source = input::resolve_input(input_str.as_ref(), 120).await?;
    render::page_count(&source, password).await
}

/// Advisory validation of a paper file on disk.
pub async fn validate_file(path: impl AsRef<Path>) -> Result<Vec<String>, QuizError> {
    let paper = PaperFile::load(path.as_ref()).await?;
    Ok(validate_records(&paper.questions))
}

fn default_paper_name(input_str: &str) -> String {
    let last = input_str
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(input_str);
    Path::new(last)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Untitled paper".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paper_name_from_path_or_url() {
        assert_eq!(default_paper_name("papers/bio-2019.pdf"), "bio-2019");
        assert_eq!(default_paper_name("https://example.com/exams/chem.pdf"), "chem");
        assert_eq!(default_paper_name(""), "Untitled paper");
    }

    #[tokio::test]
    async fn validate_file_reports_problems() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.json");
        tokio::fs::write(
            &path,
            r#"{"name": "P", "source": "p.pdf", "startPage": 1, "endPage": 1,
                "questions": [{"questionText": "Q", "choices": ["only"], "correctChoice": null, "orderIndex": 1}]}"#,
        )
        .await
        .unwrap();
        let problems = validate_file(&path).await.unwrap();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("need at least 2"));
    }

    #[tokio::test]
    async fn explain_file_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = explain_file(
            dir.path().join("missing.json"),
            dir.path().join("out.json"),
            &GatewayConfig::default(),
            &BackfillConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, QuizError::CheckpointRead { .. }));
    }
}
