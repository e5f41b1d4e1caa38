//! Post-processing: deterministic cleanup of model-extracted question text.
//!
//! The extraction prompt asks for choices without letter prefixes, but models
//! still return `"A. Aspirin"` or `"(c) Warfarin"` on a fair share of pages,
//! especially when the scan shows the letters prominently. The rules here
//! run on every extracted question before it is numbered.
//!
//! Rules (applied in order):
//! 1. Normalise line endings (CRLF → LF) and trim
//! 2. Collapse runs of spaces/tabs to a single space
//! 3. Strip one leading option label from choices (`A.`, `b)`, `(C)`, `D:`)

use once_cell::sync::Lazy;
use regex::Regex;

/// Clean the question stem.
pub fn clean_question_text(input: &str) -> String {
    collapse_spaces(&normalise_line_endings(input))
}

/// Clean one answer choice.
pub fn clean_choice(input: &str) -> String {
    let s = collapse_spaces(&normalise_line_endings(input));
    strip_option_label(&s)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

// ── Rule 2: Collapse horizontal whitespace ───────────────────────────────────

static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").unwrap());

fn collapse_spaces(input: &str) -> String {
    RE_SPACES.replace_all(input, " ").to_string()
}

// ── Rule 3: Strip option labels ──────────────────────────────────────────────

/// One letter A–H, either wrapped in parentheses or followed by `.`, `)` or
/// `:`, then at least one space. Requiring the space keeps "A.D. 1066" and
/// "B12 deficiency" intact.
static RE_OPTION_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\([A-Ha-h]\)|[A-Ha-h][.):])\s+").unwrap());

fn strip_option_label(input: &str) -> String {
    RE_OPTION_LABEL.replace(input, "").to_string()
}
