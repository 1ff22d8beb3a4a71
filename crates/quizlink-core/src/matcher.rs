//! Term matcher: decides whether a concept's term is present in a block of
//! question text.
//!
//! Matching is lexical and case-insensitive. Besides the full term, a
//! parenthetical abbreviation ("Socioeconomic Status (SES)") and slash
//! alternatives ("Frontstage/Backstage") are accepted on their own.

use std::sync::LazyLock;

use regex::Regex;

use crate::text::{contains_whole_word, normalize};

/// Terms shorter than this never match.
pub const MIN_TERM_CHARS: usize = 3;

/// Minimum length of an abbreviation inside parentheses.
pub const MIN_ABBREVIATION_CHARS: usize = 2;

static PARENTHETICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s*\(([^)]+)\)\s*$").expect("parenthetical regex"));

/// A term compiled for repeated matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermPattern {
    full: String,
    base: Option<String>,
    abbreviation: Option<String>,
    alternatives: Vec<String>,
}

impl TermPattern {
    pub fn new(term: &str) -> Self {
        let full = normalize(term);

        let (base, abbreviation) = match PARENTHETICAL.captures(&full) {
            Some(caps) => {
                let base = caps[1].trim().to_string();
                let abbreviation = caps[2].trim().to_string();
                (
                    (base.chars().count() >= MIN_TERM_CHARS).then_some(base),
                    (abbreviation.chars().count() >= MIN_ABBREVIATION_CHARS)
                        .then_some(abbreviation),
                )
            }
            None => (None, None),
        };

        let alternatives = if full.contains('/') {
            full.split('/')
                .map(str::trim)
                .filter(|part| part.chars().count() >= MIN_TERM_CHARS)
                .map(str::to_string)
                .collect()
        } else {
            Vec::new()
        };

        Self {
            full,
            base,
            abbreviation,
            alternatives,
        }
    }

    /// The normalized full term.
    pub fn term(&self) -> &str {
        &self.full
    }

    /// Match against raw text.
    pub fn is_match(&self, text: &str) -> bool {
        self.is_match_normalized(&normalize(text))
    }

    /// Match against text that has already been through [`normalize`].
    pub fn is_match_normalized(&self, text: &str) -> bool {
        if self.full.chars().count() < MIN_TERM_CHARS {
            return false;
        }

        if contains_whole_word(text, &self.full) {
            return true;
        }

        if self
            .base
            .iter()
            .chain(self.abbreviation.iter())
            .any(|part| contains_whole_word(text, part))
        {
            return true;
        }

        self.alternatives
            .iter()
            .any(|part| contains_whole_word(text, part))
    }
}

/// Whether `term` is present in `text` as a whole word, directly or through
/// its abbreviation or one of its slash alternatives.
pub fn matches(term: &str, text: &str) -> bool {
    TermPattern::new(term).is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_word_only() {
        assert!(!matches("age", "the average person"));
        assert!(matches("age", "at what age"));
    }

    #[test]
    fn short_terms_never_match() {
        assert!(!matches("is", "this is a test"));
        assert!(!matches("  Is  ", "is is is"));
    }

    #[test]
    fn case_and_whitespace_insensitive() {
        assert!(matches("  Cultural Lag ", "An example of CULTURAL LAG is..."));
    }

    #[test]
    fn parenthetical_abbreviation() {
        let term = "Socioeconomic Status (SES)";
        assert!(matches(term, "Her SES was low."));
        assert!(matches(term, "Socioeconomic status predicts outcomes."));
        assert!(!matches(term, "Her SE status was low."));
    }

    #[test]
    fn parenthetical_two_letter_abbreviation() {
        assert!(matches("Information Technology (IT)", "The IT department"));
        assert!(!matches("Information Technology (I)", "I said so"));
    }

    #[test]
    fn slash_alternatives() {
        let term = "Frontstage/Backstage";
        assert!(matches(
            term,
            "He was clearly frontstage during the interview."
        ));
        assert!(matches(term, "Relaxing backstage"));
        assert!(!matches(term, "the stage"));
    }

    #[test]
    fn slash_parts_must_be_long_enough() {
        assert!(!matches("Us/Ex", "us or ex"));
        assert!(matches("Us/Them", "us versus them"));
    }

    #[test]
    fn pattern_exposes_normalized_term() {
        let pattern = TermPattern::new(" Mechanical Solidarity ");
        assert_eq!(pattern.term(), "mechanical solidarity");
        assert!(pattern.is_match_normalized("mechanical solidarity binds"));
    }
}
