//! Question records and the paper file format.
//!
//! A [`PaperFile`] is the JSON document exchanged between the extraction
//! driver, the explanation backfill driver and the import step. The backfill
//! driver reads it, checkpoints it and writes it back, so every field must
//! survive a decode/encode cycle unchanged.
//!
//! ```text
//! {
//!   "name": "...", "source": "...", "startPage": 1, "endPage": 12,
//!   "questions": [
//!     { "questionText": "...", "choices": ["..."], "correctChoice": 2,
//!       "orderIndex": 1, "explanation": "..." }
//!   ],
//!   "stats": { "totalQuestions": 40, "pagesProcessed": 12,
//!              "tokensUsed": 51234, "estimatedCost": "$0.0312" }
//! }
//! ```

use crate::error::QuizError;
use crate::usage::{format_cost, Pricing, TokenUsage};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// One multiple-choice question as read off a page by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedQuestion {
    pub question_text: String,
    pub choices: Vec<String>,
    /// Zero-based index into `choices`; `None` when the page marks no answer.
    pub correct_choice: Option<usize>,
    /// 1-indexed source page.
    pub page_number: usize,
    /// Position on the page while extracting, position in the paper afterwards.
    pub order_index: usize,
}

impl ExtractedQuestion {
    /// A question is complete when it has an answer that indexes `choices`.
    pub fn is_complete(&self) -> bool {
        matches!(self.correct_choice, Some(c) if c < self.choices.len())
    }
}

/// Everything one extraction run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaperExtractionResult {
    pub questions: Vec<ExtractedQuestion>,
    pub usage: TokenUsage,
    pub pages_processed: usize,
}

/// A question as stored in a paper file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecord {
    pub question_text: String,
    pub choices: Vec<String>,
    pub correct_choice: Option<usize>,
    pub order_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl QuestionRecord {
    /// True for a non-blank explanation. An empty string counts as missing.
    pub fn has_explanation(&self) -> bool {
        self.explanation
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty())
    }
}

impl From<&ExtractedQuestion> for QuestionRecord {
    fn from(q: &ExtractedQuestion) -> Self {
        QuestionRecord {
            question_text: q.question_text.clone(),
            choices: q.choices.clone(),
            correct_choice: q.correct_choice,
            order_index: q.order_index,
            explanation: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperStats {
    pub total_questions: usize,
    pub pages_processed: usize,
    pub tokens_used: u64,
    /// Dollar amount rendered as `$X.XXXX`.
    pub estimated_cost: String,
}

/// Paper-level record: extraction output, backfill input, checkpoint and final output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperFile {
    pub name: String,
    pub source: String,
    pub start_page: usize,
    pub end_page: usize,
    pub questions: Vec<QuestionRecord>,
    #[serde(default)]
    pub stats: PaperStats,
}

impl PaperFile {
    /// Assemble a paper file from an extraction run.
    pub fn from_extraction(
        name: impl Into<String>,
        source: impl Into<String>,
        start_page: usize,
        end_page: usize,
        result: &PaperExtractionResult,
        pricing: &Pricing,
    ) -> Self {
        let questions: Vec<QuestionRecord> =
            result.questions.iter().map(QuestionRecord::from).collect();
        PaperFile {
            name: name.into(),
            source: source.into(),
            start_page,
            end_page,
            stats: PaperStats {
                total_questions: questions.len(),
                pages_processed: result.pages_processed,
                tokens_used: result.usage.total_tokens,
                estimated_cost: format_cost(pricing.estimate(&result.usage)),
            },
            questions,
        }
    }

    /// Read and decode a paper file.
    pub async fn load(path: &Path) -> Result<PaperFile, QuizError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| QuizError::CheckpointRead {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
        serde_json::from_str(&raw).map_err(|e| QuizError::CheckpointRead {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    /// Write the file atomically: serialise to a sibling temp file, then rename over `path`.
    pub async fn save(&self, path: &Path) -> Result<(), QuizError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| QuizError::Internal(format!("serialise paper: {e}")))?;
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || write_atomic(&path, json.as_bytes()))
            .await
            .map_err(|e| QuizError::Internal(format!("Write task panicked: {}", e)))?
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), QuizError> {
    use std::io::Write;

    let to_err = |source: std::io::Error| QuizError::OutputWrite {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(to_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(to_err)?;
    tmp.write_all(bytes).map_err(to_err)?;
    tmp.as_file().sync_all().map_err(to_err)?;
    tmp.persist(path).map_err(|e| to_err(e.error))?;

    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_explanation_counts_as_missing() {
        let mut record = QuestionRecord::from(&question(1, 1, Some(0)));
        assert!(!record.has_explanation());
        record.explanation = Some("   ".into());
        assert!(!record.has_explanation());
        record.explanation = Some("Because.".into());
        assert!(record.has_explanation());
    }

    fn question(order: usize, page: usize, correct: Option<usize>) -> ExtractedQuestion {
        ExtractedQuestion {
            question_text: format!("Q{order}"),
            choices: vec!["a".into(), "b".into(), "c".into()],
            correct_choice: correct,
            page_number: page,
            order_index: order,
        }
    }

    #[test]
    fn completeness_requires_in_range_answer() {
        assert!(question(1, 1, Some(2)).is_complete());
        assert!(!question(1, 1, Some(3)).is_complete());
        assert!(!question(1, 1, None).is_complete());
    }

    #[test]
    fn from_extraction_fills_stats() {
        let result = PaperExtractionResult {
            questions: vec![question(1, 1, Some(0)), question(2, 2, None)],
            usage: TokenUsage::new(1_000_000, 100_000, 1_100_000),
            pages_processed: 2,
        };
        let paper = PaperFile::from_extraction("Mock A", "board", 1, 2, &result, &Pricing::default());
        assert_eq!(paper.stats.total_questions, 2);
        assert_eq!(paper.stats.pages_processed, 2);
        assert_eq!(paper.stats.tokens_used, 1_100_000);
        assert_eq!(paper.stats.estimated_cost, "$0.5500");
        assert_eq!(paper.questions[1].correct_choice, None);
    }

    #[test]
    fn wire_format_uses_camel_case_and_nullable_answer() {
        let raw = r#"{
            "name": "P", "source": "S", "startPage": 3, "endPage": 4,
            "questions": [
                {"questionText": "Q", "choices": ["x", "y"], "correctChoice": null, "orderIndex": 1},
                {"questionText": "R", "choices": ["x", "y"], "correctChoice": 1, "orderIndex": 2,
                 "explanation": "because"}
            ],
            "stats": {"totalQuestions": 2, "pagesProcessed": 2, "tokensUsed": 10, "estimatedCost": "$0.0001"}
        }"#;
        let paper: PaperFile = serde_json::from_str(raw).unwrap();
        assert_eq!(paper.start_page, 3);
        assert_eq!(paper.questions[0].correct_choice, None);
        assert_eq!(paper.questions[1].explanation.as_deref(), Some("because"));

        let value = serde_json::to_value(&paper).unwrap();
        assert!(value["questions"][0]["correctChoice"].is_null());
        assert!(value["questions"][0].get("explanation").is_none());
        assert_eq!(value["stats"]["estimatedCost"], "$0.0001");

        let again: PaperFile = serde_json::from_value(value).unwrap();
        assert_eq!(again, paper);
    }

    #[test]
    fn explicit_null_explanation_reads_as_absent() {
        let raw = r#"{"questionText": "Q", "choices": ["x"], "correctChoice": 0,
                      "orderIndex": 1, "explanation": null}"#;
        let q: QuestionRecord = serde_json::from_str(raw).unwrap();
        assert!(!q.has_explanation());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("paper.json");
        let result = PaperExtractionResult {
            questions: vec![question(1, 1, Some(1))],
            usage: TokenUsage::ZERO,
            pages_processed: 1,
        };
        let paper = PaperFile::from_extraction("N", "S", 1, 1, &result, &Pricing::default());
        paper.save(&path).await.unwrap();
        let loaded = PaperFile::load(&path).await.unwrap();
        assert_eq!(loaded, paper);
    }

    #[tokio::test]
    async fn load_missing_file_is_checkpoint_read_error() {
        let err = PaperFile::load(Path::new("/definitely/not/here.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, QuizError::CheckpointRead { .. }));
    }
}
