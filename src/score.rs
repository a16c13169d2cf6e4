//! Naive keyword relevance.
//!
//! A document's score is the sum, over every query term longer than two
//! characters, of how many times the term occurs as a substring of the
//! lowercased body. Occurrences are counted without overlap, and partial-word
//! hits count: `cat` scores inside `category`.

use regex::Regex;
use std::sync::LazyLock;

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w+\b").expect("word pattern is valid"));

/// Terms shorter than this are ignored.
const MIN_TERM_CHARS: usize = 3;

/// Splits `query` into lowercased terms of at least three characters.
/// Duplicates are kept, so a repeated term weighs more.
pub fn query_terms(query: &str) -> Vec<String> {
    WORD_RE
        .find_iter(query)
        .map(|m| m.as_str().to_lowercase())
        .filter(|w| w.chars().count() >= MIN_TERM_CHARS)
        .collect()
}

/// Counts the words in `text` using the same word boundaries as the query
/// tokenizer.
pub fn word_count(text: &str) -> usize {
    WORD_RE.find_iter(text).count()
}

/// Scores `text` against already-tokenized `terms`.
pub fn score_terms(text: &str, terms: &[String]) -> usize {
    if terms.is_empty() {
        return 0;
    }
    let lowered = text.to_lowercase();
    terms.iter().map(|t| lowered.matches(t.as_str()).count()).sum()
}

/// Scores `text` against `query`.
pub fn score_query(text: &str, query: &str) -> usize {
    score_terms(text, &query_terms(query))
}
