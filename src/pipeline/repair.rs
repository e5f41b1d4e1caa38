//! Second-chance recovery for model output that should have been JSON.
//!
//! Models reply with almost-valid JSON in two recurring ways: the object is
//! wrapped in a ```` ```json ```` fence, or a free-text string value (long
//! explanations especially) contains raw newlines or tabs. [`repair_json`]
//! undoes both and nothing else. If the result still does not parse, callers
//! surface a hard error instead of trying again.
//!
//! String tracking is a heuristic: a `"` toggles the in-string state unless the
//! character right before it is a backslash. A string that ends in an escaped
//! backslash (`"C:\\"`) therefore confuses it. Existing paper files were
//! produced with exactly this behaviour, so it is kept as is.

/// Fence opener tagged as JSON.
const JSON_FENCE: &str = "```json";
/// Bare fence marker.
const FENCE: &str = "```";

/// Best-effort fix-up of malformed JSON text. Pure and deterministic.
///
/// 1. Trim surrounding whitespace.
/// 2. Strip a leading ```` ```json ```` (or bare ```` ``` ````) opener and a
///    single trailing ```` ``` ````, then trim again.
/// 3. Inside string literals, replace raw `\n`, `\r` and `\t` with their
///    two-character escapes. Everything else passes through unchanged.
pub fn repair_json(text: &str) -> String {
    let body = strip_fences(text);

    let mut out = String::with_capacity(body.len() + 16);
    let mut in_string = false;
    let mut prev: Option<char> = None;

    for ch in body.chars() {
        if ch == '"' && prev != Some('\\') {
            in_string = !in_string;
        }

        match ch {
            '\n' if in_string => out.push_str("\\n"),
            '\r' if in_string => out.push_str("\\r"),
            '\t' if in_string => out.push_str("\\t"),
            _ => out.push(ch),
        }

        prev = Some(ch);
    }

    out
}

fn strip_fences(text: &str) -> &str {
    let mut s = text.trim();

    if let Some(rest) = s.strip_prefix(JSON_FENCE) {
        s = rest;
    } else if let Some(rest) = s.strip_prefix(FENCE) {
        s = rest;
    }

    if let Some(rest) = s.strip_suffix(FENCE) {
        s = rest;
    }

    s.trim()
}
