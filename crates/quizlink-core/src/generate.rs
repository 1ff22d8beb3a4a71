//! Question generation for concepts that no question exercises.
//!
//! A generation model is prompted with a chapter's gap concepts and answers
//! in a numbered multiple-choice format. Parsed drafts are written as a
//! Markdown question file and can be merged into the chapter.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::LinkError;
use crate::linker::{
    assign_primary_concepts, concepts_missing_questions, rebuild_associations, PrimaryScope,
};
use crate::model::{Chapter, Concept, Question, RecordId};
use crate::retry::{generate_with_retry, RetryPolicy};
use crate::traits::{GenerateRequest, LlmProvider, TokenUsage};

static QUESTION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\s+(.+)").expect("question line regex"));

static CHOICE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\*)?([a-d])\)\s+(.+)").expect("choice line regex"));

const EXPLANATION_MARKER: &str = "**Explanation:**";

/// Generation settings, as read from the `[generation]` config table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_questions_per_concept")]
    pub questions_per_concept: usize,
    #[serde(default = "default_generation_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Directory holding `<chapter_id>.md` reference texts.
    #[serde(default)]
    pub reference_dir: Option<PathBuf>,
}

fn default_questions_per_concept() -> usize {
    3
}

fn default_generation_max_tokens() -> u32 {
    8192
}

fn default_temperature() -> f64 {
    0.7
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            questions_per_concept: default_questions_per_concept(),
            max_tokens: default_generation_max_tokens(),
            temperature: default_temperature(),
            reference_dir: None,
        }
    }
}

/// A generated question that has not been merged into a chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftQuestion {
    pub question_text: String,
    pub choices: Vec<String>,
    pub correct_choice_index: usize,
}

/// Build the generation prompt for a chapter's gap concepts.
pub fn build_generation_prompt(
    chapter_name: &str,
    concepts: &[&Concept],
    questions_per_concept: usize,
    reference: Option<&str>,
) -> String {
    let concept_list = concepts
        .iter()
        .map(|c| format!("- {}: {}", c.term, c.definition))
        .collect::<Vec<_>>()
        .join("\n");

    let mut prompt = format!(
        "You are creating exam questions for an introductory course.
For each concept below, generate exactly {questions_per_concept} multiple-choice application/analysis questions.
These should test higher-order thinking, NOT simple recall of definitions.

Good question types:
- \"Which scenario best illustrates [concept]?\"
- \"A researcher observes X. This is an example of...\"
- \"What distinguishes [concept A] from [concept B]?\"

Bad question types (avoid these):
- \"What is the definition of [concept]?\" (too simple)
- \"Which of the following is true about [concept]?\" (vague)

Rules:
- Each question must have exactly 4 choices labeled a) through d)
- Exactly one correct answer, marked with * before the letter
- The correct answer should not always be a); vary the position
- Include a brief explanation after each question
- Make distractors plausible but clearly wrong
- Each question MUST contain the concept term (or a close variant) in the question text or correct answer so it can be linked back to the concept

Format each question exactly like this (with a blank line between questions):

1. [Question text]
*a) [Correct answer]
b) [Distractor]
c) [Distractor]
d) [Distractor]
**Explanation:** [Brief explanation of why the correct answer is right]

Number questions sequentially starting from 1.

Concepts needing questions (from chapter: {chapter_name}):
{concept_list}"
    );

    if let Some(reference) = reference.filter(|r| !r.trim().is_empty()) {
        prompt.push_str("\n\nUse the following reference material:\n");
        prompt.push_str(reference);
    }
    prompt
}

fn parse_block(lines: &[&str]) -> Option<DraftQuestion> {
    let first = lines.first()?;
    let question_text = QUESTION_LINE.captures(first.trim())?[1].trim().to_string();

    let mut choices = Vec::new();
    let mut correct = Vec::new();
    for line in &lines[1..] {
        let line = line.trim();
        if line.starts_with(EXPLANATION_MARKER) {
            break;
        }
        if let Some(caps) = CHOICE_LINE.captures(line) {
            if caps.get(1).is_some() {
                correct.push(choices.len());
            }
            choices.push(caps[3].trim().to_string());
        }
    }

    if choices.len() == 4 && correct.len() == 1 {
        Some(DraftQuestion {
            question_text,
            choices,
            correct_choice_index: correct[0],
        })
    } else {
        let preview: String = question_text.chars().take(60).collect();
        tracing::warn!(
            choices = choices.len(),
            correct_marks = correct.len(),
            "skipping unparseable question: {preview}"
        );
        None
    }
}

/// Parse numbered multiple-choice questions.
///
/// A question starts at a line beginning with `N. `; its choices are the
/// following `a)`..`d)` lines, a leading `*` marking the correct one, up to
/// an `**Explanation:**` line. Questions without exactly four choices and
/// one correct mark are skipped.
pub fn parse_generated_questions(text: &str) -> Vec<DraftQuestion> {
    let mut blocks: Vec<Vec<&str>> = Vec::new();
    for line in text.lines() {
        if QUESTION_LINE.is_match(line) || blocks.is_empty() {
            blocks.push(Vec::new());
        }
        if let Some(block) = blocks.last_mut() {
            block.push(line);
        }
    }

    blocks
        .iter()
        .filter(|block| block.iter().any(|l| !l.trim().is_empty()))
        .filter_map(|block| {
            let start = block.iter().position(|l| !l.trim().is_empty())?;
            parse_block(&block[start..])
        })
        .collect()
}

/// Render drafts as a Markdown question file.
pub fn format_as_markdown(drafts: &[DraftQuestion], quiz_title: &str) -> String {
    let mut lines = vec![
        format!("Quiz title: {quiz_title}"),
        "shuffle answers: true".to_string(),
        String::new(),
    ];

    for (i, draft) in drafts.iter().enumerate() {
        lines.push(format!("{}. {}", i + 1, draft.question_text));
        for (j, choice) in draft.choices.iter().enumerate() {
            let letter = (b'a' + j as u8) as char;
            let prefix = if j == draft.correct_choice_index { "*" } else { "" };
            lines.push(format!("{prefix}{letter}) {choice}"));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Read `<reference_dir>/<chapter_id>.md`, if it exists.
pub fn load_reference(reference_dir: &Path, chapter_id: &str) -> Result<Option<String>> {
    let path = reference_dir.join(format!("{chapter_id}.md"));
    if !path.is_file() {
        tracing::warn!("no reference text at {}", path.display());
        return Ok(None);
    }
    std::fs::read_to_string(&path)
        .map(Some)
        .with_context(|| format!("failed to read reference text {}", path.display()))
}

fn next_question_id(chapter: &Chapter, generated: &mut usize) -> RecordId {
    let max_int = chapter.questions.iter().filter_map(|q| q.id.as_int()).max();
    if let Some(max) = max_int {
        return RecordId::Int(max + 1);
    }
    loop {
        *generated += 1;
        let id = RecordId::Text(format!("{}_g{:02}", chapter.id, *generated));
        if !chapter.questions.iter().any(|q| q.id == id) {
            return id;
        }
    }
}

/// Append drafts to `chapter` with fresh ids, assign their primary
/// concepts and rebuild associations. Returns the new ids.
///
/// Ids continue after the largest integer id; a chapter without integer
/// ids gets `<chapter_id>_gNN`. A malformed chapter is rejected before
/// anything is appended.
pub fn append_drafts(
    chapter: &mut Chapter,
    drafts: &[DraftQuestion],
) -> Result<Vec<RecordId>, LinkError> {
    chapter.validate()?;
    let mut counter = 0;
    let mut new_ids = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let id = next_question_id(chapter, &mut counter);
        chapter.questions.push(Question {
            id: id.clone(),
            question_text: draft.question_text.clone(),
            choices: draft.choices.clone(),
            correct_choice_index: draft.correct_choice_index,
            primary_concept_id: None,
        });
        new_ids.push(id);
    }

    assign_primary_concepts(chapter, PrimaryScope::Only(&new_ids));
    rebuild_associations(chapter);
    Ok(new_ids)
}

/// Drafts produced for one chapter.
#[derive(Debug, Clone)]
pub struct ChapterDrafts {
    pub chapter_id: String,
    /// Number of gap concepts the model was asked about.
    pub concepts: usize,
    pub drafts: Vec<DraftQuestion>,
    pub token_usage: TokenUsage,
}

impl ChapterDrafts {
    /// Questions the prompt asked for.
    pub fn expected(&self, questions_per_concept: usize) -> usize {
        self.concepts * questions_per_concept
    }
}

/// Generates questions with one model.
pub struct Generator {
    provider: Arc<dyn LlmProvider>,
    model: String,
    config: GenerationConfig,
    retry: RetryPolicy,
}

impl Generator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        config: GenerationConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            config,
            retry,
        }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Generate drafts for the chapter's gap concepts.
    ///
    /// Returns `None` when every concept already has a question.
    pub async fn generate_for_chapter(&self, chapter: &Chapter) -> Result<Option<ChapterDrafts>> {
        let missing = concepts_missing_questions(chapter);
        if missing.is_empty() {
            return Ok(None);
        }

        let reference = match &self.config.reference_dir {
            Some(dir) => load_reference(dir, &chapter.id)?,
            None => None,
        };

        tracing::info!(
            chapter = %chapter.id,
            concepts = missing.len(),
            "generating questions"
        );
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: build_generation_prompt(
                &chapter.name,
                &missing,
                self.config.questions_per_concept,
                reference.as_deref(),
            ),
            system_prompt: None,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = generate_with_retry(self.provider.as_ref(), &request, &self.retry)
            .await
            .with_context(|| format!("question generation for chapter {} failed", chapter.id))?;

        let drafts = parse_generated_questions(&response.content);
        tracing::info!(
            chapter = %chapter.id,
            parsed = drafts.len(),
            expected = missing.len() * self.config.questions_per_concept,
            "parsed generated questions"
        );

        Ok(Some(ChapterDrafts {
            chapter_id: chapter.id.clone(),
            concepts: missing.len(),
            drafts,
            token_usage: response.token_usage,
        }))
    }
}
