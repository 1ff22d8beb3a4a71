//! Normalization, whole-word search, and tokenization shared by the
//! matcher and the ranker.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;

/// English function words ignored by both ranking strategies.
pub const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "shall", "can", "to",
    "of", "in", "for", "on", "with", "at", "by", "from", "as", "into", "through", "during",
    "before", "after", "above", "below", "between", "out", "off", "over", "under", "again",
    "further", "then", "once", "and", "but", "or", "nor", "not", "so", "yet", "both", "either",
    "neither", "each", "every", "all", "any", "few", "more", "most", "other", "some", "such", "no",
    "only", "own", "same", "than", "too", "very", "just", "because", "if", "when", "while", "that",
    "which", "who", "whom", "this", "these", "those", "it", "its", "he", "she", "they", "them",
    "their", "we", "us", "our", "you", "your", "what", "how", "about", "up", "also", "one", "two",
];

static ALPHA_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z]+").expect("alphabetic run regex"));

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("punctuation regex"));

/// An immutable stop-word set.
///
/// Built once from configuration and shared by reference, so chapters can
/// be tokenized on several threads at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopWords {
    words: HashSet<String>,
}

impl StopWords {
    /// The built-in English list.
    pub fn english() -> Self {
        Self {
            words: ENGLISH_STOP_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }

    /// An empty set.
    pub fn none() -> Self {
        Self {
            words: HashSet::new(),
        }
    }

    /// Extend the set with additional words (lowercased, trimmed).
    pub fn with_extra<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for word in extra {
            let word = normalize(word.as_ref());
            if !word.is_empty() {
                self.words.insert(word);
            }
        }
        self
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Default for StopWords {
    fn default() -> Self {
        Self::english()
    }
}

/// Lowercase and trim surrounding whitespace.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Word characters: Unicode alphanumerics and underscore.
pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whether `needle` occurs in `haystack` with no word character directly
/// before or after it.
///
/// Every start position is tried, so a rejected occurrence such as the
/// "age" inside "average" does not hide a later standalone one.
pub fn contains_whole_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }

    let mut start = 0;
    while let Some(offset) = haystack[start..].find(needle) {
        let begin = start + offset;
        let end = begin + needle.len();

        let bounded_before = haystack[..begin]
            .chars()
            .next_back()
            .map_or(true, |c| !is_word_char(c));
        let bounded_after = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !is_word_char(c));
        if bounded_before && bounded_after {
            return true;
        }

        start = begin
            + haystack[begin..]
                .chars()
                .next()
                .map_or(1, char::len_utf8);
    }

    false
}

/// Tokens for TF-IDF weighting: lowercase alphabetic runs longer than two
/// characters that are not stop words, in text order.
pub fn content_tokens(text: &str, stop_words: &StopWords) -> Vec<String> {
    let lower = text.to_lowercase();
    ALPHA_RUN
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|w| w.len() > 2 && !stop_words.contains(w))
        .map(str::to_string)
        .collect()
}

/// Distinct lowercase words with punctuation removed, minus stop words.
pub fn word_set(text: &str, stop_words: &StopWords) -> BTreeSet<String> {
    let lower = text.to_lowercase();
    let stripped = PUNCTUATION.replace_all(&lower, "");
    stripped
        .split_whitespace()
        .filter(|w| !stop_words.contains(w))
        .map(str::to_string)
        .collect()
}
