//! Prompts sent to the model.
//!
//! Both drivers depend on the exact response shapes requested here
//! (`{"questions": [...]}` and `{"explanation": "..."}`), so prompt text
//! lives in one place and is covered by tests.

use crate::paper::QuestionRecord;

/// Instruction sent with every page image during extraction.
pub const EXTRACTION_PROMPT: &str = r#"You are extracting multiple-choice questions (MCQs) from a scanned exam paper page.

Extract EVERY multiple-choice question visible on this page. For each question return:
- "questionText": the full question stem as a string
- "choices": an array with the full text of every option, in order, WITHOUT letter or number prefixes (no "A.", "b)", "(c)")
- "correctChoice": the zero-based index of the correct option if the answer is marked, highlighted, ticked or circled on the page; otherwise null

Rules:
- Do not invent questions or answers that are not on the page.
- Preserve the wording of stems and options exactly, including units and symbols.
- If a question continues from a previous page or onto the next page, extract the visible part.

Respond with ONLY a JSON object of the form:
{"questions": [{"questionText": "...", "choices": ["...", "..."], "correctChoice": 0}]}

If the page contains no multiple-choice questions, respond with {"questions": []}"#;

/// Letter label for a zero-based choice index: 0 → `A`, 1 → `B`, …
///
/// Indices past `Z` fall back to the 1-based number.
pub fn choice_label(index: usize) -> String {
    if index < 26 {
        ((b'A' + index as u8) as char).to_string()
    } else {
        (index + 1).to_string()
    }
}

/// Build the explanation prompt for one question.
///
/// Callers only pass questions with a known correct choice.
pub fn explanation_prompt(question: &QuestionRecord, correct_choice: usize) -> String {
    let choices = question
        .choices
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {}", choice_label(i), c))
        .collect::<Vec<_>>()
        .join("\n");

    let correct_text = question
        .choices
        .get(correct_choice)
        .map(String::as_str)
        .unwrap_or("");

    format!(
        "You are an expert tutor writing an explanation for a multiple-choice exam question.\n\n\
Question:\n{question}\n\n\
Choices:\n{choices}\n\n\
Correct answer: {label}. {correct_text}\n\n\
Write a 150-250 word explanation that:\n\
1. Explains why {label} is correct.\n\
2. Briefly explains why each of the other choices is wrong.\n\
3. Mentions any relevant high-yield facts worth remembering.\n\n\
Respond with ONLY a JSON object of the form:\n\
{{\"explanation\": \"...\"}}",
        question = question.question_text,
        label = choice_label(correct_choice),
    )
}
