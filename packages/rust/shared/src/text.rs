//! Text normalization and whole-word keyword matching.
//!
//! Titles and departments arrive as free text from heterogeneous providers.
//! Everything downstream (dedup keys, scoring, role rules) works on the
//! normalized form so that `"VP, Sales & Revenue"` and `"vp sales & revenue"`
//! compare equal.

use std::sync::LazyLock;

use regex::Regex;

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}&]+").expect("separator pattern is valid"));

/// Lowercase, collapse every run of characters that are neither letters,
/// digits, nor `&` into a single space, and trim.
pub fn normalize(input: &str) -> String {
    let lower = input.to_lowercase();
    SEPARATORS.replace_all(&lower, " ").trim().to_string()
}

/// Whole-word / whole-phrase match of `keyword` inside already-normalized `text`.
///
/// `keyword` is normalized before matching, so callers may pass raw keywords.
/// `cto` does not match `director`; `head of` matches `head of sales`.
pub fn contains_keyword(text: &str, keyword: &str) -> bool {
    let keyword = normalize(keyword);
    if keyword.is_empty() || text.is_empty() {
        return false;
    }
    let padded = format!(" {text} ");
    padded.contains(&format!(" {keyword} "))
}

/// True if any keyword matches `text` (see [`contains_keyword`]).
pub fn contains_any<S: AsRef<str>>(text: &str, keywords: &[S]) -> bool {
    keywords.iter().any(|k| contains_keyword(text, k.as_ref()))
}

/// Department label used for diversity accounting; empty departments collapse
/// to `"unknown"`.
pub fn department_key(department: &str) -> String {
    let key = normalize(department);
    if key.is_empty() {
        "unknown".to_string()
    } else {
        key
    }
}
