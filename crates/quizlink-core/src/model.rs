//! Core data model types for quizlink.
//!
//! A chapter owns its concepts and questions. Derived fields
//! (`associated_question_ids`, `confusable_ids`, `primary_concept_id`) are
//! recomputed by the linker and ranker, never edited by hand.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LinkError;

/// Opaque identifier of a question record.
///
/// Question banks carry either numeric or string ids; the id is written
/// back in the same form it was read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl RecordId {
    /// The numeric value, if this id is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            RecordId::Int(n) => Some(*n),
            RecordId::Text(_) => None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(n) => write!(f, "{n}"),
            RecordId::Text(s) => write!(f, "{s}"),
        }
    }
}

impl FromStr for RecordId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty record id".to_string());
        }
        Ok(match s.parse::<i64>() {
            Ok(n) => RecordId::Int(n),
            Err(_) => RecordId::Text(s.to_string()),
        })
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        RecordId::Int(n)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::Text(s.to_string())
    }
}

/// A single instructional term and its definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    /// Unique identifier within the chapter (e.g. "ch04_t07").
    pub id: String,
    /// Label the matcher searches for, e.g. "Socioeconomic Status (SES)".
    #[serde(default)]
    pub term: String,
    /// Definition text used for confusable ranking.
    #[serde(default)]
    pub definition: String,
    /// Questions whose text matches `term`, in question order.
    #[serde(default, alias = "level3_question_ids")]
    pub associated_question_ids: Vec<RecordId>,
    /// Most similar concepts in the same chapter, best first.
    #[serde(default)]
    pub confusable_ids: Vec<String>,
}

impl Concept {
    pub fn new(id: &str, term: &str, definition: &str) -> Self {
        Self {
            id: id.to_string(),
            term: term.to_string(),
            definition: definition.to_string(),
            associated_question_ids: Vec::new(),
            confusable_ids: Vec::new(),
        }
    }
}

/// A multiple-choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: RecordId,
    #[serde(default, alias = "question")]
    pub question_text: String,
    /// Answer choices in display order (normally four).
    #[serde(default)]
    pub choices: Vec<String>,
    /// Index into `choices` of the correct answer.
    #[serde(default, alias = "correct")]
    pub correct_choice_index: usize,
    /// The concept this question mainly tests.
    #[serde(default, alias = "linked_concept_id")]
    pub primary_concept_id: Option<String>,
}

impl Question {
    /// Question text followed by every choice, space-joined in choice order.
    pub fn search_text(&self) -> String {
        let mut text = self.question_text.clone();
        text.push(' ');
        text.push_str(&self.choices.join(" "));
        text
    }
}

/// A chapter: the scope for all matching and ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Display position (1-based).
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub concepts: Vec<Concept>,
    #[serde(default, alias = "chapter_questions")]
    pub questions: Vec<Question>,
}

/// Manifest entry describing a chapter without its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterInfo {
    pub id: String,
    pub name: String,
    pub order: u32,
}

impl Chapter {
    pub fn info(&self) -> ChapterInfo {
        ChapterInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            order: self.order,
        }
    }

    /// Lookup of concepts by id.
    pub fn concepts_by_id(&self) -> HashMap<&str, &Concept> {
        self.concepts.iter().map(|c| (c.id.as_str(), c)).collect()
    }

    /// Lookup of questions by id.
    pub fn questions_by_id(&self) -> HashMap<&RecordId, &Question> {
        self.questions.iter().map(|q| (&q.id, q)).collect()
    }

    pub fn concept(&self, id: &str) -> Option<&Concept> {
        self.concepts.iter().find(|c| c.id == id)
    }

    /// Term of the given concept, or "none" if it is absent or unknown.
    pub fn term_or_none(&self, concept_id: Option<&str>) -> String {
        concept_id
            .and_then(|id| self.concept(id))
            .map(|c| c.term.clone())
            .unwrap_or_else(|| "none".to_string())
    }

    /// Reject records the linker cannot work with.
    ///
    /// A concept needs a term and a definition; a question needs text and
    /// at least one choice.
    pub fn validate(&self) -> Result<(), LinkError> {
        for concept in &self.concepts {
            let missing = if concept.term.trim().is_empty() {
                Some("term")
            } else if concept.definition.trim().is_empty() {
                Some("definition")
            } else {
                None
            };
            if let Some(field) = missing {
                return Err(LinkError::MalformedConcept {
                    chapter_id: self.id.clone(),
                    concept_id: concept.id.clone(),
                    field,
                });
            }
        }

        for question in &self.questions {
            let missing = if question.question_text.trim().is_empty() {
                Some("question_text")
            } else if question.choices.is_empty() {
                Some("choices")
            } else {
                None
            };
            if let Some(field) = missing {
                return Err(LinkError::MalformedQuestion {
                    chapter_id: self.id.clone(),
                    question_id: question.id.clone(),
                    field,
                });
            }
        }

        Ok(())
    }
}
