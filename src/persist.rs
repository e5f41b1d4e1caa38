//! Write-only contract towards the relational store behind the quiz app.
//!
//! The pipeline never reads from the store. A finished [`PaperFile`] is
//! imported in two calls: one paper row, then all of its questions in order.

use crate::error::QuizError;
use crate::paper::{PaperFile, QuestionRecord};
use async_trait::async_trait;
use tracing::info;

/// A question row as the store receives it.
///
/// `correct_choice` is not optional on this side: an unknown answer is
/// stored as choice 0.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQuestion {
    pub question_text: String,
    pub choices: Vec<String>,
    pub correct_choice: usize,
    pub explanation: Option<String>,
    pub order_index: usize,
}

impl From<&QuestionRecord> for NewQuestion {
    fn from(q: &QuestionRecord) -> Self {
        Self {
            question_text: q.question_text.clone(),
            choices: q.choices.clone(),
            correct_choice: q.correct_choice.unwrap_or(0),
            explanation: q.explanation.clone(),
            order_index: q.order_index,
        }
    }
}

#[async_trait]
pub trait PaperStore: Send + Sync {
    /// Insert a paper row and return its id.
    async fn insert_paper(
        &self,
        name: &str,
        source: &str,
        question_count: usize,
    ) -> Result<i64, QuizError>;

    /// Insert the questions of `paper_id`, preserving order.
    async fn insert_questions(
        &self,
        paper_id: i64,
        questions: &[NewQuestion],
    ) -> Result<(), QuizError>;
}

/// Import a whole paper file. Returns the new paper id.
pub async fn import_paper(store: &dyn PaperStore, paper: &PaperFile) -> Result<i64, QuizError> {
    let paper_id = store
        .insert_paper(&paper.name, &paper.source, paper.questions.len())
        .await?;

    let rows: Vec<NewQuestion> = paper.questions.iter().map(NewQuestion::from).collect();
    store.insert_questions(paper_id, &rows).await?;

    info!(
        "Imported '{}' as paper {} ({} questions)",
        paper.name,
        paper_id,
        rows.len()
    );
    Ok(paper_id)
}
