//! Build report types with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::Chapter;

/// Outcome of one `build` pass over a data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Similarity strategy used for confusable ranking.
    pub strategy: String,
    /// Chapters that were linked and ranked, in input order.
    pub chapters: Vec<ChapterSummary>,
    /// Chapters that were rejected.
    pub failures: Vec<ChapterFailure>,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Link statistics for one chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterSummary {
    pub chapter_id: String,
    pub name: String,
    pub concepts: usize,
    pub questions: usize,
    /// Questions with a primary concept.
    pub questions_with_primary: usize,
    /// Concepts with no associated questions.
    pub gaps: usize,
    /// Total entries across all confusable lists.
    pub confusable_links: usize,
}

impl ChapterSummary {
    pub fn from_chapter(chapter: &Chapter) -> Self {
        Self {
            chapter_id: chapter.id.clone(),
            name: chapter.name.clone(),
            concepts: chapter.concepts.len(),
            questions: chapter.questions.len(),
            questions_with_primary: chapter
                .questions
                .iter()
                .filter(|q| q.primary_concept_id.is_some())
                .count(),
            gaps: chapter
                .concepts
                .iter()
                .filter(|c| c.associated_question_ids.is_empty())
                .count(),
            confusable_links: chapter.concepts.iter().map(|c| c.confusable_ids.len()).sum(),
        }
    }

    /// Fraction of concepts with at least one associated question.
    pub fn coverage(&self) -> f64 {
        if self.concepts == 0 {
            return 0.0;
        }
        (self.concepts - self.gaps) as f64 / self.concepts as f64
    }
}

/// A chapter that failed validation or processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterFailure {
    pub chapter_id: String,
    pub error: String,
}

impl BuildReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: BuildReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Format the report as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        let concepts: usize = self.chapters.iter().map(|c| c.concepts).sum();
        let gaps: usize = self.chapters.iter().map(|c| c.gaps).sum();
        md.push_str(&format!(
            "**Summary:** {} chapters linked, {} failed, {} of {} concepts without questions ({} ranking)\n\n",
            self.chapters.len(),
            self.failures.len(),
            gaps,
            concepts,
            self.strategy
        ));

        if !self.chapters.is_empty() {
            md.push_str("| Chapter | Concepts | Questions | With primary | Gaps | Coverage |\n");
            md.push_str("|---------|----------|-----------|--------------|------|----------|\n");
            for c in &self.chapters {
                md.push_str(&format!(
                    "| {} | {} | {} | {} | {} | {:.1}% |\n",
                    c.chapter_id,
                    c.concepts,
                    c.questions,
                    c.questions_with_primary,
                    c.gaps,
                    c.coverage() * 100.0
                ));
            }
            md.push('\n');
        }

        if !self.failures.is_empty() {
            md.push_str("### Failed chapters\n\n");
            for f in &self.failures {
                md.push_str(&format!("- `{}`: {}\n", f.chapter_id, f.error));
            }
        }

        md
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Concept, Question, RecordId};

    fn make_report() -> BuildReport {
        let mut chapter = Chapter {
            id: "ch01".into(),
            name: "Culture".into(),
            order: 1,
            concepts: vec![
                Concept::new("ch01_t01", "Norms", "Rules."),
                Concept::new("ch01_t02", "Values", "Ideals."),
            ],
            questions: vec![Question {
                id: RecordId::Int(1),
                question_text: "Which are norms?".into(),
                choices: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_choice_index: 0,
                primary_concept_id: Some("ch01_t01".into()),
            }],
        };
        chapter.concepts[0].associated_question_ids = vec![RecordId::Int(1)];
        chapter.concepts[0].confusable_ids = vec!["ch01_t02".into()];

        BuildReport {
            id: Uuid::nil(),
            created_at: Utc::now(),
            strategy: "tfidf".into(),
            chapters: vec![ChapterSummary::from_chapter(&chapter)],
            failures: vec![ChapterFailure {
                chapter_id: "ch02".into(),
                error: "malformed concept 'ch02_t01' in chapter 'ch02': missing term".into(),
            }],
            duration_ms: 12,
        }
    }

    #[test]
    fn summary_counts() {
        let report = make_report();
        let summary = &report.chapters[0];
        assert_eq!(summary.concepts, 2);
        assert_eq!(summary.questions_with_primary, 1);
        assert_eq!(summary.gaps, 1);
        assert_eq!(summary.confusable_links, 1);
        assert!((summary.coverage() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn json_roundtrip() {
        let report = make_report();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.json");

        report.save_json(&path).unwrap();
        let loaded = BuildReport::load_json(&path).unwrap();

        assert_eq!(loaded.chapters, report.chapters);
        assert!(loaded.has_failures());
    }

    #[test]
    fn markdown_output() {
        let md = make_report().to_markdown();
        assert!(md.contains("1 chapters linked, 1 failed"));
        assert!(md.contains("| ch01 | 2 | 1 | 1 | 1 | 50.0% |"));
        assert!(md.contains("Failed chapters"));
    }
}
