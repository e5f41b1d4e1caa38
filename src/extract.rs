//! Question extraction driver: page range → ordered, numbered questions.
//!
//! Pages are processed strictly one after another: rasterise page *n*, send it
//! to the model, record its questions, report progress, wait the configured
//! delay, then move to page *n + 1*. Sequential processing is the rate-limit
//! strategy and keeps progress events in page order.
//!
//! ## Failure policy
//!
//! * A page that rasterises to no image is logged, counted as processed and
//!   skipped.
//! * Any error from the gateway aborts the whole range. Nothing is salvaged
//!   and there is no checkpoint: re-run the range, or a narrower one.
//!
//! After the last page every question is renumbered 1..N in page order, then
//! original order within the page.

use crate::config::ExtractionConfig;
use crate::error::QuizError;
use crate::gateway::ModelGateway;
use crate::paper::{ExtractedQuestion, PaperExtractionResult, QuestionRecord};
use crate::pipeline::encode::PageImage;
use crate::pipeline::postprocess::{clean_choice, clean_question_text};
use crate::pipeline::render::PageSource;
use crate::prompts::EXTRACTION_PROMPT;
use crate::usage::TokenUsage;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// `{"questions": [...]}` as returned for one page.
///
/// Elements are decoded one by one so a single odd question cannot fail the
/// page.
#[derive(Debug, Deserialize)]
struct PageReply {
    #[serde(default)]
    questions: Option<Vec<Value>>,
}

/// One question as the model wrote it. Every field tolerates `null` and
/// loosely typed values; [`to_extracted`] normalises them.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawQuestion {
    question_text: Option<Value>,
    choices: Option<Vec<Value>>,
    correct_choice: Option<Value>,
}

/// Drives rasteriser + gateway over a page range.
pub struct QuestionExtractor {
    gateway: Arc<ModelGateway>,
    config: ExtractionConfig,
}

impl QuestionExtractor {
    pub fn new(gateway: Arc<ModelGateway>, config: ExtractionConfig) -> Self {
        Self { gateway, config }
    }

    pub fn gateway(&self) -> &Arc<ModelGateway> {
        &self.gateway
    }

    /// Extract the questions on one page with a single model call.
    ///
    /// Questions carry the page number and a provisional 1-based position on
    /// the page.
    pub async fn extract_page(
        &self,
        image: &PageImage,
    ) -> Result<(Vec<ExtractedQuestion>, TokenUsage), QuizError> {
        let (reply, usage): (PageReply, TokenUsage) = self
            .gateway
            .generate_json_with_image(image, EXTRACTION_PROMPT)
            .await?;

        let page_number = image.page_number;
        let questions = reply
            .questions
            .unwrap_or_default()
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<RawQuestion>(value) {
                Ok(raw) => Some(raw),
                Err(e) => {
                    warn!("Page {}: dropping unreadable question: {}", page_number, e);
                    None
                }
            })
            .enumerate()
            .map(|(i, raw)| to_extracted(raw, page_number, i + 1))
            .collect::<Vec<_>>();

        debug!(
            "Page {}: {} questions, {} tokens",
            image.page_number,
            questions.len(),
            usage.total_tokens
        );
        Ok((questions, usage))
    }

    /// Extract every question in the inclusive 1-indexed range `start_page..=end_page`.
    pub async fn extract_range(
        &self,
        source: &dyn PageSource,
        start_page: usize,
        end_page: usize,
    ) -> Result<PaperExtractionResult, QuizError> {
        let run_start = Instant::now();
        let document_pages = source.page_count().await?;
        if start_page == 0 || start_page > end_page || end_page > document_pages {
            return Err(QuizError::PageOutOfRange {
                start: start_page,
                end: end_page,
                total: document_pages,
            });
        }

        let total = end_page - start_page + 1;
        info!(
            "Extracting pages {}-{} of {} ({} pages)",
            start_page,
            end_page,
            source.label(),
            total
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_extraction_start(total);
        }

        let mut result = PaperExtractionResult::default();

        for page_number in start_page..=end_page {
            if page_number > start_page && self.config.page_delay_ms > 0 {
                sleep(Duration::from_millis(self.config.page_delay_ms)).await;
            }

            let wanted = BTreeSet::from([page_number]);
            let image = source
                .rasterize(&wanted, self.config.scale)
                .await?
                .into_iter()
                .next();

            let found = match image {
                Some(image) => {
                    let (questions, usage) = self.extract_page(&image).await?;
                    result.usage += usage;
                    let found = questions.len();
                    result.questions.extend(questions);
                    found
                }
                None => {
                    warn!("Page {}: no image produced, skipping", page_number);
                    0
                }
            };

            result.pages_processed += 1;
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_page_complete(result.pages_processed, total, found);
            }
        }

        renumber(&mut result.questions);

        info!(
            "Extraction complete: {} questions from {} pages, {} tokens, {:?}",
            result.questions.len(),
            result.pages_processed,
            result.usage.total_tokens,
            run_start.elapsed()
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_extraction_complete(total, result.questions.len());
        }

        Ok(result)
    }
}

fn to_extracted(raw: RawQuestion, page_number: usize, position: usize) -> ExtractedQuestion {
    let question_text = match raw.question_text {
        Some(value) => text_of(&value).unwrap_or_else(|| {
            warn!(
                "Page {} question {}: unusable questionText {}",
                page_number, position, value
            );
            String::new()
        }),
        None => {
            warn!("Page {} question {}: missing questionText", page_number, position);
            String::new()
        }
    };

    // Unusable choices become empty strings so answer indices stay aligned.
    let choices = raw
        .choices
        .unwrap_or_default()
        .iter()
        .map(|value| match text_of(value) {
            Some(text) => clean_choice(&text),
            None => {
                warn!(
                    "Page {} question {}: unusable choice {}",
                    page_number, position, value
                );
                String::new()
            }
        })
        .collect();

    let correct_choice = match raw.correct_choice {
        None | Some(Value::Null) => None,
        Some(value) => {
            let index = answer_index(&value);
            if index.is_none() {
                warn!(
                    "Page {} question {}: correctChoice {} treated as unknown",
                    page_number, position, value
                );
            }
            index
        }
    };

    ExtractedQuestion {
        question_text: clean_question_text(&question_text),
        choices,
        correct_choice,
        page_number,
        order_index: position,
    }
}

/// Strings as-is, numbers and booleans in their JSON spelling.
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A non-negative integer, given as a number (`2`, `2.0`) or a numeric string (`"2"`).
fn answer_index(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                usize::try_from(u).ok()
            } else {
                n.as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                    .map(|f| f as usize)
            }
        }
        Value::String(s) => s.trim().parse::<usize>().ok(),
        _ => None,
    }
}

/// Overwrite `order_index` with 1..N in current order.
fn renumber(questions: &mut [ExtractedQuestion]) {
    for (i, q) in questions.iter_mut().enumerate() {
        q.order_index = i + 1;
    }
}

// ── Validation ───────────────────────────────────────────────────────────

/// Human-readable problems with extracted questions. Advisory only.
///
/// Flags empty question text, fewer than two choices, and a correct choice
/// outside `0..choices.len()`. A missing answer is not an error here.
pub fn validate_questions(questions: &[ExtractedQuestion]) -> Vec<String> {
    questions
        .iter()
        .flat_map(|q| check_question(q.order_index, &q.question_text, &q.choices, q.correct_choice))
        .collect()
}

/// [`validate_questions`] for records read from a paper file.
pub fn validate_records(questions: &[QuestionRecord]) -> Vec<String> {
    questions
        .iter()
        .flat_map(|q| check_question(q.order_index, &q.question_text, &q.choices, q.correct_choice))
        .collect()
}

fn check_question(
    number: usize,
    text: &str,
    choices: &[String],
    correct_choice: Option<usize>,
) -> Vec<String> {
    let mut errors = Vec::new();
    if text.trim().is_empty() {
        errors.push(format!("Question {number}: question text is empty"));
    }
    if choices.len() < 2 {
        errors.push(format!(
            "Question {number}: has {} choice(s), need at least 2",
            choices.len()
        ));
    }
    if let Some(c) = correct_choice {
        if c >= choices.len() {
            errors.push(format!(
                "Question {number}: correct choice {c} is out of range for {} choices",
                choices.len()
            ));
        }
    }
    errors
}
