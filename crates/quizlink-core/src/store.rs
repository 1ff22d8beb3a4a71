//! JSON content store.
//!
//! A data directory holds one `<chapter_id>.json` file per chapter, the
//! `chapters.json` manifest listing chapters in display order, and the
//! `content.json` bundle with every chapter. All writes are atomic: the
//! file is written to a temporary sibling and renamed into place.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{Chapter, ChapterInfo};

/// Chapter manifest file name.
pub const MANIFEST_FILE: &str = "chapters.json";

/// Monolithic bundle file name.
pub const BUNDLE_FILE: &str = "content.json";

/// Default audit report file name inside the data directory.
pub const AUDIT_REPORT_FILE: &str = "audit_report.json";

const RESERVED_FILES: &[&str] = &[MANIFEST_FILE, BUNDLE_FILE, AUDIT_REPORT_FILE];

/// Every chapter in manifest order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentBundle {
    pub chapters: Vec<Chapter>,
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    tmp.write_all(json.as_bytes())
        .and_then(|()| tmp.write_all(b"\n"))
        .with_context(|| format!("failed to write {}", path.display()))?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

/// Chapter files in a data directory.
#[derive(Debug, Clone)]
pub struct ContentStore {
    data_dir: PathBuf,
}

impl ContentStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn chapter_path(&self, chapter_id: &str) -> PathBuf {
        self.data_dir.join(format!("{chapter_id}.json"))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.data_dir.join(MANIFEST_FILE)
    }

    pub fn bundle_path(&self) -> PathBuf {
        self.data_dir.join(BUNDLE_FILE)
    }

    /// Chapters in display order.
    ///
    /// Without a manifest, every non-reserved `*.json` file that parses as
    /// a chapter is listed, sorted by `order` then id.
    pub fn load_manifest(&self) -> Result<Vec<ChapterInfo>> {
        let manifest = self.manifest_path();
        if manifest.is_file() {
            return read_json(&manifest);
        }

        if !self.data_dir.is_dir() {
            anyhow::bail!("not a directory: {}", self.data_dir.display());
        }

        let mut infos = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir)
            .with_context(|| format!("failed to read directory: {}", self.data_dir.display()))?
        {
            let path = entry?.path();
            let reserved = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| RESERVED_FILES.contains(&n));
            if reserved || !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            match read_json::<Chapter>(&path) {
                Ok(chapter) => infos.push(chapter.info()),
                Err(e) => tracing::warn!("skipping {}: {e:#}", path.display()),
            }
        }
        infos.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        Ok(infos)
    }

    pub fn load_chapter(&self, chapter_id: &str) -> Result<Chapter> {
        let chapter: Chapter = read_json(&self.chapter_path(chapter_id))?;
        if chapter.id != chapter_id {
            anyhow::bail!(
                "{} contains chapter '{}', expected '{chapter_id}'",
                self.chapter_path(chapter_id).display(),
                chapter.id
            );
        }
        Ok(chapter)
    }

    /// Every chapter in manifest order.
    pub fn load_all(&self) -> Result<Vec<Chapter>> {
        self.load_manifest()?
            .iter()
            .map(|info| self.load_chapter(&info.id))
            .collect()
    }

    pub fn save_chapter(&self, chapter: &Chapter) -> Result<()> {
        write_json_atomic(&self.chapter_path(&chapter.id), chapter)
    }

    pub fn write_manifest(&self, chapters: &[ChapterInfo]) -> Result<()> {
        write_json_atomic(&self.manifest_path(), chapters)
    }

    pub fn write_bundle(&self, chapters: &[Chapter]) -> Result<()> {
        write_json_atomic(
            &self.bundle_path(),
            &ContentBundle {
                chapters: chapters.to_vec(),
            },
        )
    }

    /// Persist the given chapter files, then the manifest and bundle built
    /// from `all` (which must include the changed chapters).
    pub fn save(&self, changed: &[&Chapter], all: &[Chapter]) -> Result<()> {
        for chapter in changed {
            self.save_chapter(chapter)?;
        }
        let infos: Vec<ChapterInfo> = all.iter().map(Chapter::info).collect();
        self.write_manifest(&infos)?;
        self.write_bundle(all)?;
        tracing::debug!(
            dir = %self.data_dir.display(),
            chapters = changed.len(),
            "persisted content"
        );
        Ok(())
    }
}

/// A non-fatal problem found in a chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub chapter_id: String,
    /// The concept or question id, if the warning is about one record.
    pub record_id: Option<String>,
    pub message: String,
}

/// Check a chapter for problems that do not stop linking.
pub fn lint_chapter(chapter: &Chapter) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut warn = |record_id: Option<String>, message: String| {
        warnings.push(ValidationWarning {
            chapter_id: chapter.id.clone(),
            record_id,
            message,
        });
    };

    let mut seen_concepts = HashSet::new();
    for concept in &chapter.concepts {
        if !seen_concepts.insert(concept.id.as_str()) {
            warn(
                Some(concept.id.clone()),
                format!("duplicate concept ID: {}", concept.id),
            );
        }
    }

    let mut seen_questions = HashSet::new();
    for question in &chapter.questions {
        let id = question.id.to_string();
        if !seen_questions.insert(&question.id) {
            warn(Some(id.clone()), format!("duplicate question ID: {id}"));
        }

        if question.choices.len() != 4 {
            warn(
                Some(id.clone()),
                format!("has {} choices, expected 4", question.choices.len()),
            );
        }
        if question.correct_choice_index >= question.choices.len() {
            warn(
                Some(id.clone()),
                format!(
                    "correct_choice_index {} is out of range",
                    question.correct_choice_index
                ),
            );
        }

        let Some(primary) = &question.primary_concept_id else {
            continue;
        };
        match chapter.concept(primary) {
            None => warn(
                Some(id.clone()),
                format!("primary concept '{primary}' is not in the chapter"),
            ),
            Some(concept) if !concept.associated_question_ids.contains(&question.id) => warn(
                Some(id.clone()),
                format!("primary concept '{primary}' does not list this question"),
            ),
            Some(_) => {}
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Concept, Question, RecordId};

    fn sample_chapter(id: &str, order: u32) -> Chapter {
        Chapter {
            id: id.into(),
            name: format!("Chapter {order}"),
            order,
            concepts: vec![Concept::new(
                &format!("{id}_t01"),
                "Culture",
                "Shared beliefs and practices.",
            )],
            questions: vec![Question {
                id: RecordId::Int(order as i64 * 100),
                question_text: "What is culture?".into(),
                choices: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_choice_index: 1,
                primary_concept_id: None,
            }],
        }
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let chapters = vec![sample_chapter("ch02", 2), sample_chapter("ch01", 1)];
        let changed: Vec<&Chapter> = chapters.iter().collect();
        store.save(&changed, &chapters).unwrap();

        let manifest = store.load_manifest().unwrap();
        assert_eq!(manifest[0].id, "ch02");
        assert_eq!(store.load_all().unwrap(), chapters);

        let bundle: ContentBundle = read_json(&store.bundle_path()).unwrap();
        assert_eq!(bundle.chapters.len(), 2);
    }

    #[test]
    fn manifest_falls_back_to_directory_scan() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        store.save_chapter(&sample_chapter("ch03", 3)).unwrap();
        store.save_chapter(&sample_chapter("ch01", 1)).unwrap();
        std::fs::write(dir.path().join("notes.json"), "not json").unwrap();
        std::fs::write(dir.path().join(AUDIT_REPORT_FILE), "{}").unwrap();

        let ids: Vec<String> = store
            .load_manifest()
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec!["ch01", "ch03"]);
    }

    #[test]
    fn atomic_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("value.json");
        write_json_atomic(&path, &vec![1, 2]).unwrap();
        write_json_atomic(&path, &vec![3]).unwrap();
        let back: Vec<u32> = read_json(&path).unwrap();
        assert_eq!(back, vec![3]);

        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn load_chapter_rejects_mismatched_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        write_json_atomic(&store.chapter_path("ch09"), &sample_chapter("ch01", 1)).unwrap();
        assert!(store.load_chapter("ch09").is_err());
    }

    #[test]
    fn missing_data_dir_is_an_error() {
        let store = ContentStore::new("/definitely/not/here");
        assert!(store.load_manifest().is_err());
    }

    #[test]
    fn lint_reports_structural_problems() {
        let mut chapter = sample_chapter("ch01", 1);
        chapter.concepts.push(Concept::new("ch01_t01", "Norms", "Rules."));
        let mut bad = chapter.questions[0].clone();
        bad.choices.pop();
        bad.correct_choice_index = 5;
        bad.primary_concept_id = Some("ch01_t99".into());
        chapter.questions.push(bad);

        let messages: Vec<String> = lint_chapter(&chapter)
            .into_iter()
            .map(|w| w.message)
            .collect();
        assert!(messages.iter().any(|m| m.contains("duplicate concept ID")));
        assert!(messages.iter().any(|m| m.contains("duplicate question ID")));
        assert!(messages.iter().any(|m| m.contains("3 choices")));
        assert!(messages.iter().any(|m| m.contains("out of range")));
        assert!(messages.iter().any(|m| m.contains("not in the chapter")));
    }

    #[test]
    fn lint_flags_primary_without_association() {
        let mut chapter = sample_chapter("ch01", 1);
        chapter.questions[0].primary_concept_id = Some("ch01_t01".into());
        let warnings = lint_chapter(&chapter);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("does not list this question"));

        chapter.concepts[0].associated_question_ids = vec![RecordId::Int(100)];
        assert!(lint_chapter(&chapter).is_empty());
    }
}
