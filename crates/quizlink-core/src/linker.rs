//! Concept–question linking.
//!
//! `associated_question_ids` is always rebuilt from scratch by text
//! matching. `primary_concept_id` is either assigned by the longest-term
//! heuristic or set by an external correction; the two are never merged.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::error::LinkError;
use crate::matcher::TermPattern;
use crate::model::{Chapter, Concept, RecordId};
use crate::text::normalize;

/// Which questions receive a heuristic primary concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryScope<'a> {
    /// Every question, replacing any existing primary.
    All,
    /// Only the listed questions; all others keep their primary.
    Only(&'a [RecordId]),
}

/// Outcome of applying external primary-concept corrections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrectionOutcome {
    /// Corrections that changed a question's primary concept.
    pub applied: usize,
    /// Corrections that matched the existing primary concept.
    pub unchanged: usize,
    /// Corrections that were not applied.
    pub rejected: Vec<LinkError>,
}

fn compile_patterns(concepts: &[Concept]) -> Vec<TermPattern> {
    concepts.iter().map(|c| TermPattern::new(&c.term)).collect()
}

/// Recompute every concept's `associated_question_ids` from scratch.
pub fn rebuild_associations(chapter: &mut Chapter) {
    let patterns = compile_patterns(&chapter.concepts);
    for concept in &mut chapter.concepts {
        concept.associated_question_ids.clear();
    }

    for question in &chapter.questions {
        let text = normalize(&question.search_text());
        for (concept, pattern) in chapter.concepts.iter_mut().zip(&patterns) {
            if pattern.is_match_normalized(&text) {
                concept.associated_question_ids.push(question.id.clone());
            }
        }
    }

    tracing::debug!(
        chapter = %chapter.id,
        linked = chapter
            .concepts
            .iter()
            .filter(|c| !c.associated_question_ids.is_empty())
            .count(),
        "rebuilt question associations"
    );
}

/// Assign each question in scope the first matching concept, trying
/// concepts longest term first so "Mechanical Solidarity" wins over
/// "Solidarity". Questions matching nothing get no primary.
pub fn assign_primary_concepts(chapter: &mut Chapter, scope: PrimaryScope<'_>) {
    // Stable sort: equal-length terms keep their input order.
    let mut by_length: Vec<(usize, &str, TermPattern)> = chapter
        .concepts
        .iter()
        .map(|c| (c.term.chars().count(), c.id.as_str(), TermPattern::new(&c.term)))
        .collect();
    by_length.sort_by_key(|(term_len, _, _)| Reverse(*term_len));

    let mut assigned = Vec::with_capacity(chapter.questions.len());
    for (index, question) in chapter.questions.iter().enumerate() {
        if let PrimaryScope::Only(ids) = scope {
            if !ids.contains(&question.id) {
                continue;
            }
        }
        let text = normalize(&question.search_text());
        let primary = by_length
            .iter()
            .find(|(_, _, pattern)| pattern.is_match_normalized(&text))
            .map(|(_, id, _)| id.to_string());
        assigned.push((index, primary));
    }

    for (index, primary) in assigned {
        chapter.questions[index].primary_concept_id = primary;
    }
}

/// Initial construction: assign primaries to every question, then rebuild
/// associations.
pub fn link_chapter(chapter: &mut Chapter) {
    assign_primary_concepts(chapter, PrimaryScope::All);
    rebuild_associations(chapter);
}

/// Apply `{question_id -> suggested concept}` corrections, then rebuild
/// associations.
///
/// A malformed chapter is rejected before anything changes. A `None`
/// suggestion clears the primary concept. Suggestions naming an unknown
/// question or concept are reported and skipped; the remaining corrections
/// still apply. Corrections never add a question to a concept's
/// associations that the text match does not support.
pub fn apply_corrections(
    chapter: &mut Chapter,
    corrections: &BTreeMap<RecordId, Option<String>>,
) -> Result<CorrectionOutcome, LinkError> {
    chapter.validate()?;
    let mut outcome = CorrectionOutcome::default();

    for (question_id, suggested) in corrections {
        let Some(index) = chapter.questions.iter().position(|q| &q.id == question_id) else {
            tracing::warn!(chapter = %chapter.id, question = %question_id, "question not found");
            outcome.rejected.push(LinkError::UnknownQuestion {
                chapter_id: chapter.id.clone(),
                question_id: question_id.clone(),
            });
            continue;
        };

        if let Some(concept_id) = suggested {
            if chapter.concept(concept_id).is_none() {
                tracing::warn!(
                    chapter = %chapter.id,
                    question = %question_id,
                    concept = %concept_id,
                    "suggested concept not in chapter, skipping"
                );
                outcome.rejected.push(LinkError::UnknownConceptReference {
                    chapter_id: chapter.id.clone(),
                    question_id: question_id.clone(),
                    concept_id: concept_id.clone(),
                });
                continue;
            }
        }

        let question = &mut chapter.questions[index];
        if question.primary_concept_id == *suggested {
            outcome.unchanged += 1;
            continue;
        }

        tracing::debug!(
            chapter = %chapter.id,
            question = %question_id,
            from = question.primary_concept_id.as_deref().unwrap_or("none"),
            to = suggested.as_deref().unwrap_or("none"),
            "corrected primary concept"
        );
        question.primary_concept_id = suggested.clone();
        outcome.applied += 1;
    }

    rebuild_associations(chapter);
    Ok(outcome)
}

/// Concepts that no question exercises.
pub fn concepts_missing_questions(chapter: &Chapter) -> Vec<&Concept> {
    chapter
        .concepts
        .iter()
        .filter(|c| c.associated_question_ids.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Question;

    fn question(id: i64, text: &str, choices: [&str; 4]) -> Question {
        Question {
            id: RecordId::Int(id),
            question_text: text.into(),
            choices: choices.iter().map(|c| c.to_string()).collect(),
            correct_choice_index: 0,
            primary_concept_id: None,
        }
    }

    fn socialization_chapter() -> Chapter {
        Chapter {
            id: "ch01".into(),
            name: "Socialization".into(),
            order: 1,
            concepts: vec![
                Concept::new("ch01_t01", "Socialization", "Learning the norms of a society."),
                Concept::new(
                    "ch01_t02",
                    "Resocialization",
                    "Replacing old norms with new ones.",
                ),
            ],
            questions: vec![question(
                101,
                "A recruit at boot camp sheds civilian habits. This is:",
                ["Anticipatory learning", "Resocialization", "Role strain", "Status set"],
            )],
        }
    }

    #[test]
    fn resocialization_scenario() {
        let mut chapter = socialization_chapter();
        link_chapter(&mut chapter);

        assert_eq!(
            chapter.concepts[1].associated_question_ids,
            vec![RecordId::Int(101)]
        );
        assert!(chapter.concepts[0].associated_question_ids.is_empty());
        assert_eq!(
            chapter.questions[0].primary_concept_id.as_deref(),
            Some("ch01_t02")
        );
    }

    #[test]
    fn rebuild_is_idempotent() {
        let mut chapter = socialization_chapter();
        chapter.concepts[1].associated_question_ids = vec![RecordId::Int(999)];
        rebuild_associations(&mut chapter);
        let first = chapter.clone();
        rebuild_associations(&mut chapter);
        assert_eq!(first, chapter);
        assert_eq!(
            chapter.concepts[1].associated_question_ids,
            vec![RecordId::Int(101)]
        );
    }

    #[test]
    fn longest_term_wins_primary() {
        let mut chapter = Chapter {
            id: "ch05".into(),
            name: "Groups".into(),
            order: 5,
            concepts: vec![
                Concept::new("ch05_t01", "Solidarity", "Unity within a group."),
                Concept::new(
                    "ch05_t02",
                    "Mechanical Solidarity",
                    "Unity based on sameness.",
                ),
            ],
            questions: vec![question(
                7,
                "Which describes mechanical solidarity?",
                ["Shared beliefs", "Division of labor", "Anomie", "Contracts"],
            )],
        };
        link_chapter(&mut chapter);

        assert_eq!(
            chapter.questions[0].primary_concept_id.as_deref(),
            Some("ch05_t02")
        );
        // Both concepts still list the question.
        assert_eq!(chapter.concepts[0].associated_question_ids.len(), 1);
        assert_eq!(chapter.concepts[1].associated_question_ids.len(), 1);
    }

    #[test]
    fn unmatched_question_has_no_primary() {
        let mut chapter = socialization_chapter();
        chapter
            .questions
            .push(question(102, "What is a folkway?", ["A", "B", "C", "D"]));
        chapter.questions[1].primary_concept_id = Some("ch01_t01".into());
        link_chapter(&mut chapter);
        assert!(chapter.questions[1].primary_concept_id.is_none());
    }

    #[test]
    fn scoped_assignment_leaves_other_questions_alone() {
        let mut chapter = socialization_chapter();
        chapter.questions[0].primary_concept_id = Some("ch01_t01".into());
        chapter.questions.push(question(
            102,
            "Which process replaces old norms?",
            ["Resocialization", "Drift", "Lag", "Strain"],
        ));
        assign_primary_concepts(&mut chapter, PrimaryScope::Only(&[RecordId::Int(102)]));

        assert_eq!(
            chapter.questions[0].primary_concept_id.as_deref(),
            Some("ch01_t01")
        );
        assert_eq!(
            chapter.questions[1].primary_concept_id.as_deref(),
            Some("ch01_t02")
        );
    }

    #[test]
    fn correction_sets_primary_without_forcing_membership() {
        let mut chapter = socialization_chapter();
        link_chapter(&mut chapter);

        let corrections = BTreeMap::from([(RecordId::Int(101), Some("ch01_t01".to_string()))]);
        let outcome = apply_corrections(&mut chapter, &corrections).unwrap();

        assert_eq!(outcome.applied, 1);
        assert!(outcome.rejected.is_empty());
        assert_eq!(
            chapter.questions[0].primary_concept_id.as_deref(),
            Some("ch01_t01")
        );
        // ch01_t01's term does not match the text, so it stays unlisted.
        assert!(chapter.concepts[0].associated_question_ids.is_empty());
        assert_eq!(
            chapter.concepts[1].associated_question_ids,
            vec![RecordId::Int(101)]
        );
    }

    #[test]
    fn unknown_concept_correction_is_rejected_and_others_apply() {
        let mut chapter = socialization_chapter();
        chapter.questions.push(question(
            102,
            "Socialization begins in the family.",
            ["True", "False", "Sometimes", "Never"],
        ));
        link_chapter(&mut chapter);

        let corrections = BTreeMap::from([
            (RecordId::Int(101), Some("ch01_t99".to_string())),
            (RecordId::Int(102), None),
            (RecordId::Int(555), Some("ch01_t01".to_string())),
        ]);
        let outcome = apply_corrections(&mut chapter, &corrections).unwrap();

        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.rejected.len(), 2);
        assert!(matches!(
            outcome.rejected[0],
            LinkError::UnknownConceptReference { .. }
        ));
        assert!(matches!(outcome.rejected[1], LinkError::UnknownQuestion { .. }));
        assert_eq!(
            chapter.questions[0].primary_concept_id.as_deref(),
            Some("ch01_t02")
        );
        assert!(chapter.questions[1].primary_concept_id.is_none());
    }

    #[test]
    fn malformed_chapter_rejects_corrections_untouched() {
        let mut chapter = socialization_chapter();
        link_chapter(&mut chapter);
        chapter.concepts[0].term.clear();
        let before = chapter.clone();

        let corrections = BTreeMap::from([(RecordId::Int(101), Some("ch01_t01".to_string()))]);
        let err = apply_corrections(&mut chapter, &corrections).unwrap_err();

        assert!(matches!(
            err,
            LinkError::MalformedConcept { field: "term", .. }
        ));
        assert_eq!(chapter, before);
    }

    #[test]
    fn unknown_question_is_reported_before_unknown_concept() {
        let mut chapter = socialization_chapter();
        link_chapter(&mut chapter);

        let corrections = BTreeMap::from([(RecordId::Int(404), Some("ch01_t99".to_string()))]);
        let outcome = apply_corrections(&mut chapter, &corrections).unwrap();

        assert_eq!(outcome.applied, 0);
        assert_eq!(
            outcome.rejected,
            vec![LinkError::UnknownQuestion {
                chapter_id: "ch01".into(),
                question_id: RecordId::Int(404),
            }]
        );
    }

    #[test]
    fn repeated_correction_counts_as_unchanged() {
        let mut chapter = socialization_chapter();
        link_chapter(&mut chapter);
        let corrections = BTreeMap::from([(RecordId::Int(101), Some("ch01_t02".to_string()))]);
        let outcome = apply_corrections(&mut chapter, &corrections).unwrap();
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.unchanged, 1);
    }

    #[test]
    fn missing_questions_lists_gaps() {
        let mut chapter = socialization_chapter();
        link_chapter(&mut chapter);
        let gaps: Vec<&str> = concepts_missing_questions(&chapter)
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(gaps, vec!["ch01_t01"]);
    }
}
