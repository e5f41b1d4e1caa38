//! Explanation backfill driver: fill in missing explanations, checkpointing as it goes.
//!
//! The driver owns the whole [`PaperFile`] for the duration of a run and
//! writes explanations into it by question index. Pending questions are
//! processed strictly in paper order, one model call each.
//!
//! ## Pending set
//!
//! Computed once at start. A question is pending unless
//! * its `correctChoice` is null (never sent to the model), or
//! * `skip_existing` is set and it already has an explanation.
//!
//! ## Failure policy
//!
//! A gateway error for one question is logged with the question index,
//! counted, and the run continues. Only a checkpoint write failure aborts.
//!
//! ## Checkpoints
//!
//! After every `batch_size`-th success the full paper is written to the
//! [`CheckpointStore`], replacing the previous checkpoint, and once more at
//! the end of the run. The checkpoint is both the output and the recovery
//! point: with `resume` set, a run starts from the stored checkpoint instead
//! of its input and recomputes the pending set against it.

use crate::config::BackfillConfig;
use crate::error::QuizError;
use crate::gateway::ModelGateway;
use crate::paper::PaperFile;
use crate::prompts::explanation_prompt;
use crate::usage::TokenUsage;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct ExplanationReply {
    explanation: String,
}

/// Durable storage for the paper being backfilled.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// The stored checkpoint, or `None` if nothing has been written yet.
    async fn load(&self) -> Result<Option<PaperFile>, QuizError>;

    /// Replace the stored checkpoint with `paper`.
    async fn save(&self, paper: &PaperFile) -> Result<(), QuizError>;
}

/// Checkpoint kept as a paper file on disk, written atomically.
#[derive(Debug, Clone)]
pub struct JsonFileCheckpoint {
    path: PathBuf,
}

impl JsonFileCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CheckpointStore for JsonFileCheckpoint {
    async fn load(&self) -> Result<Option<PaperFile>, QuizError> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(None);
        }
        PaperFile::load(&self.path).await.map(Some)
    }

    async fn save(&self, paper: &PaperFile) -> Result<(), QuizError> {
        paper.save(&self.path).await
    }
}

/// What one backfill run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackfillReport {
    /// The run started from a stored checkpoint.
    pub resumed: bool,
    /// Questions selected for generation.
    pub pending: usize,
    pub succeeded: usize,
    pub errors: usize,
    /// Questions with no correct choice, never sent to the model.
    pub ineligible: usize,
    /// Questions skipped because they already had an explanation.
    pub already_explained: usize,
    pub checkpoints_written: usize,
    pub usage: TokenUsage,
    pub estimated_cost: f64,
}

/// Indices of questions that need an explanation, in paper order.
pub fn pending_indices(paper: &PaperFile, skip_existing: bool) -> Vec<usize> {
    paper
        .questions
        .iter()
        .enumerate()
        .filter(|(_, q)| !(skip_existing && q.has_explanation()))
        .filter(|(_, q)| q.correct_choice.is_some())
        .map(|(i, _)| i)
        .collect()
}

pub struct ExplanationBackfiller {
    gateway: Arc<ModelGateway>,
    config: BackfillConfig,
    store: Arc<dyn CheckpointStore>,
}

impl ExplanationBackfiller {
    pub fn new(
        gateway: Arc<ModelGateway>,
        config: BackfillConfig,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            gateway,
            config,
            store,
        }
    }

    /// Generate explanations for every pending question of `input`.
    ///
    /// Returns the updated paper (identical to the last checkpoint written)
    /// and a report. Per-question model failures are counted, not returned.
    ///
    /// # Errors
    /// [`QuizError::InvalidConfig`] for a zero `batch_size`; checkpoint write
    /// failures.
    pub async fn run(&self, input: PaperFile) -> Result<(PaperFile, BackfillReport), QuizError> {
        if self.config.batch_size == 0 {
            return Err(QuizError::InvalidConfig("batch size must be ≥ 1".into()));
        }
        let run_start = Instant::now();
        let mut report = BackfillReport::default();

        let mut paper = if self.config.resume {
            match self.store.load().await? {
                Some(checkpoint) => {
                    info!("Resuming from checkpoint ({} questions)", checkpoint.questions.len());
                    report.resumed = true;
                    checkpoint
                }
                None => input,
            }
        } else {
            input
        };

        let pending = pending_indices(&paper, self.config.skip_existing);
        report.pending = pending.len();
        report.ineligible = paper
            .questions
            .iter()
            .filter(|q| q.correct_choice.is_none())
            .count();
        report.already_explained = if self.config.skip_existing {
            paper
                .questions
                .iter()
                .filter(|q| q.correct_choice.is_some() && q.has_explanation())
                .count()
        } else {
            0
        };

        info!(
            "Backfilling '{}': {} pending, {} without answer, {} already explained",
            paper.name, report.pending, report.ineligible, report.already_explained
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_backfill_start(report.pending);
        }

        for (n, &index) in pending.iter().enumerate() {
            if n > 0 && self.config.request_delay_ms > 0 {
                sleep(Duration::from_millis(self.config.request_delay_ms)).await;
            }

            let outcome = self.explain(&paper, index).await;
            let error = match outcome {
                Ok((explanation, usage)) => {
                    paper.questions[index].explanation = Some(explanation);
                    report.usage += usage;
                    report.succeeded += 1;
                    None
                }
                Err(e) if e.is_model_error() => {
                    warn!("Question {}: explanation failed: {}", index, e);
                    report.errors += 1;
                    Some(e.to_string())
                }
                Err(e) => return Err(e),
            };

            if let Some(ref cb) = self.config.progress_callback {
                cb.on_question_complete(n + 1, report.pending, index, error.as_deref());
            }

            if error.is_none() && report.succeeded % self.config.batch_size == 0 {
                self.checkpoint(&paper, &mut report).await?;
            }
        }

        self.checkpoint(&paper, &mut report).await?;
        report.estimated_cost = self.gateway.pricing().estimate(&report.usage);

        info!(
            "Backfill complete: {}/{} succeeded, {} errors, {} tokens, {:?}",
            report.succeeded,
            report.pending,
            report.errors,
            report.usage.total_tokens,
            run_start.elapsed()
        );

        Ok((paper, report))
    }

    async fn explain(
        &self,
        paper: &PaperFile,
        index: usize,
    ) -> Result<(String, TokenUsage), QuizError> {
        let question = &paper.questions[index];
        let correct = question
            .correct_choice
            .ok_or_else(|| QuizError::Internal(format!("question {index} has no answer")))?;

        let prompt = explanation_prompt(question, correct);
        let (reply, usage): (ExplanationReply, TokenUsage) =
            self.gateway.generate_json(&prompt).await?;
        debug!(
            "Question {}: {} chars, {} tokens",
            index,
            reply.explanation.len(),
            usage.total_tokens
        );
        Ok((reply.explanation, usage))
    }

    async fn checkpoint(
        &self,
        paper: &PaperFile,
        report: &mut BackfillReport,
    ) -> Result<(), QuizError> {
        self.store.save(paper).await?;
        report.checkpoints_written += 1;
        debug!("Checkpoint written after {} successes", report.succeeded);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_checkpoint(report.succeeded);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fake::ScriptedBackend;
    use crate::paper::{PaperStats, QuestionRecord};
    use crate::usage::Pricing;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        initial: Option<PaperFile>,
        saves: Mutex<Vec<PaperFile>>,
    }

    #[async_trait]
    impl CheckpointStore for MemoryStore {
        async fn load(&self) -> Result<Option<PaperFile>, QuizError> {
            Ok(self.initial.clone())
        }

        async fn save(&self, paper: &PaperFile) -> Result<(), QuizError> {
            self.saves.lock().unwrap().push(paper.clone());
            Ok(())
        }
    }

    fn record(i: usize, correct: Option<usize>, explanation: Option<&str>) -> QuestionRecord {
        QuestionRecord {
            question_text: format!("Question {i}"),
            choices: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_choice: correct,
            order_index: i + 1,
            explanation: explanation.map(String::from),
        }
    }

    fn paper(questions: Vec<QuestionRecord>) -> PaperFile {
        PaperFile {
            name: "Mock".into(),
            source: "test".into(),
            start_page: 1,
            end_page: 5,
            stats: PaperStats::default(),
            questions,
        }
    }

    fn echo_backend() -> Arc<ScriptedBackend> {
        ScriptedBackend::new(TokenUsage::new(10, 20, 30), |i, _| {
            Ok(format!("{{\"explanation\": \"explanation {i}\"}}"))
        })
    }

    fn backfiller(
        backend: Arc<ScriptedBackend>,
        config: BackfillConfig,
        store: Arc<MemoryStore>,
    ) -> ExplanationBackfiller {
        let gw = Arc::new(ModelGateway::new(backend, "m", Pricing::default()));
        ExplanationBackfiller::new(gw, config, store)
    }

    #[test]
    fn pending_rules() {
        let p = paper(vec![
            record(0, Some(0), None),
            record(1, None, None),
            record(2, Some(1), Some("old")),
            record(3, None, Some("old")),
        ]);
        assert_eq!(pending_indices(&p, true), vec![0]);
        assert_eq!(pending_indices(&p, false), vec![0, 2]);
    }

    #[test]
    fn blank_explanation_is_still_pending() {
        let p = paper(vec![record(0, Some(0), Some("")), record(1, Some(1), Some("done"))]);
        assert_eq!(pending_indices(&p, true), vec![0]);
    }

    #[tokio::test]
    async fn unanswered_questions_never_reach_the_model() {
        let backend = echo_backend();
        let store = Arc::new(MemoryStore::default());
        let config = BackfillConfig::builder().skip_existing(false).build().unwrap();
        let runner = backfiller(backend.clone(), config, store);

        let input = paper(vec![record(0, None, None), record(1, Some(2), None)]);
        let (out, report) = runner.run(input).await.unwrap();

        assert_eq!(backend.calls(), 1);
        assert!(backend.requests.lock().unwrap()[0]
            .prompt_text()
            .contains("Question 1"));
        assert_eq!(out.questions[0].explanation, None);
        assert_eq!(out.questions[1].explanation.as_deref(), Some("explanation 0"));
        assert_eq!(report.ineligible, 1);
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_run() {
        let backend = ScriptedBackend::new(TokenUsage::new(1, 1, 2), |i, _| {
            if i == 2 {
                Err(QuizError::ModelCall {
                    message: "500 internal".into(),
                })
            } else {
                Ok(format!("{{\"explanation\": \"e{i}\"}}"))
            }
        });
        let store = Arc::new(MemoryStore::default());
        let runner = backfiller(backend, BackfillConfig::default(), store.clone());

        let input = paper((0..5).map(|i| record(i, Some(0), None)).collect());
        let (out, report) = runner.run(input).await.unwrap();

        assert_eq!(report.errors, 1);
        assert_eq!(report.succeeded, 4);
        assert_eq!(report.usage, TokenUsage::new(4, 4, 8));
        let explained: Vec<bool> = out.questions.iter().map(|q| q.has_explanation()).collect();
        assert_eq!(explained, vec![true, true, false, true, true]);
        assert_eq!(store.saves.lock().unwrap().last().unwrap(), &out);
    }

    #[tokio::test]
    async fn unparseable_reply_is_counted_as_error() {
        let backend = ScriptedBackend::new(TokenUsage::ZERO, |i, _| {
            if i == 0 {
                Ok("no json here".into())
            } else {
                Ok("{\"explanation\": \"ok\"}".into())
            }
        });
        let store = Arc::new(MemoryStore::default());
        let runner = backfiller(backend, BackfillConfig::default(), store);
        let input = paper(vec![record(0, Some(0), None), record(1, Some(1), None)]);
        let (out, report) = runner.run(input).await.unwrap();
        assert_eq!(report.errors, 1);
        assert_eq!(out.questions[1].explanation.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn checkpoint_cadence() {
        let store = Arc::new(MemoryStore::default());
        let config = BackfillConfig::builder().batch_size(10).build().unwrap();
        let runner = backfiller(echo_backend(), config, store.clone());

        let input = paper((0..23).map(|i| record(i, Some(1), None)).collect());
        let (_, report) = runner.run(input).await.unwrap();

        let saves = store.saves.lock().unwrap();
        assert_eq!(saves.len(), 3);
        assert_eq!(report.checkpoints_written, 3);
        let explained = |p: &PaperFile| p.questions.iter().filter(|q| q.has_explanation()).count();
        assert_eq!(explained(&saves[0]), 10);
        assert_eq!(explained(&saves[1]), 20);
        assert_eq!(explained(&saves[2]), 23);
    }

    #[tokio::test]
    async fn zero_batch_size_is_rejected_before_any_call() {
        let backend = echo_backend();
        let store = Arc::new(MemoryStore::default());
        let config = BackfillConfig {
            batch_size: 0,
            ..Default::default()
        };
        let runner = backfiller(backend.clone(), config, store.clone());

        let err = runner
            .run(paper(vec![record(0, Some(0), None)]))
            .await
            .unwrap_err();
        assert!(matches!(err, QuizError::InvalidConfig(_)));
        assert_eq!(backend.calls(), 0);
        assert!(store.saves.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn final_checkpoint_written_even_with_nothing_pending() {
        let backend = echo_backend();
        let store = Arc::new(MemoryStore::default());
        let runner = backfiller(backend.clone(), BackfillConfig::default(), store.clone());
        let (_, report) = runner.run(paper(vec![record(0, None, None)])).await.unwrap();
        assert_eq!(backend.calls(), 0);
        assert_eq!(report.checkpoints_written, 1);
    }

    #[tokio::test]
    async fn resume_uses_checkpoint_and_skips_explained() {
        let mut checkpoint = paper((0..6).map(|i| record(i, Some(0), None)).collect());
        for q in checkpoint.questions.iter_mut().take(3) {
            q.explanation = Some("from checkpoint".into());
        }
        let store = Arc::new(MemoryStore {
            initial: Some(checkpoint),
            saves: Mutex::new(Vec::new()),
        });
        let backend = echo_backend();
        let config = BackfillConfig::builder()
            .resume(true)
            .skip_existing(true)
            .build()
            .unwrap();
        let runner = backfiller(backend.clone(), config, store);

        let fresh_input = paper((0..6).map(|i| record(i, Some(0), None)).collect());
        let (out, report) = runner.run(fresh_input).await.unwrap();

        assert!(report.resumed);
        assert_eq!(backend.calls(), 3);
        assert_eq!(report.already_explained, 3);
        assert_eq!(out.questions[0].explanation.as_deref(), Some("from checkpoint"));
        assert_eq!(out.questions[3].explanation.as_deref(), Some("explanation 0"));
        assert_eq!(out.questions[5].explanation.as_deref(), Some("explanation 2"));
    }

    #[tokio::test]
    async fn resume_without_checkpoint_uses_input() {
        let store = Arc::new(MemoryStore::default());
        let config = BackfillConfig::builder().resume(true).build().unwrap();
        let runner = backfiller(echo_backend(), config, store);
        let (out, report) = runner.run(paper(vec![record(0, Some(0), None)])).await.unwrap();
        assert!(!report.resumed);
        assert!(out.questions[0].has_explanation());
    }

    #[tokio::test]
    async fn skip_existing_false_overwrites() {
        let store = Arc::new(MemoryStore::default());
        let config = BackfillConfig::builder().skip_existing(false).build().unwrap();
        let runner = backfiller(echo_backend(), config, store);
        let (out, _) = runner
            .run(paper(vec![record(0, Some(0), Some("stale"))]))
            .await
            .unwrap();
        assert_eq!(out.questions[0].explanation.as_deref(), Some("explanation 0"));
    }

    #[tokio::test]
    async fn file_checkpoint_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCheckpoint::new(dir.path().join("out.json"));
        assert!(store.load().await.unwrap().is_none());

        let p = paper(vec![record(0, Some(0), Some("x"))]);
        store.save(&p).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(p));
    }
}
