//! Primary-concept audit.
//!
//! Questions that already have a primary concept are sent in batches to a
//! judgement model, which names the concept each one mainly tests. Every
//! disagreement with the current primary becomes an [`AuditMismatch`].

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProviderError;
use crate::model::{Chapter, Question, RecordId};
use crate::retry::{generate_with_retry, RetryPolicy};
use crate::traits::{GenerateRequest, LlmProvider, TokenUsage};

/// Audit request settings, as read from the `[audit]` config table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Questions per request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_audit_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f64,
}

fn default_batch_size() -> usize {
    15
}

fn default_audit_max_tokens() -> u32 {
    2000
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_tokens: default_audit_max_tokens(),
            temperature: 0.0,
        }
    }
}

/// A question whose suggested primary concept differs from its current one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditMismatch {
    pub question_id: RecordId,
    /// Chapter id.
    pub chapter: String,
    pub question_text: String,
    pub current_link: Option<String>,
    pub suggested_link: Option<String>,
    pub current_term: String,
    pub suggested_term: String,
}

/// Result of auditing a set of chapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Model that judged the questions.
    pub model: String,
    /// Questions the model gave an answer for.
    pub total_audited: usize,
    pub mismatches: Vec<AuditMismatch>,
    /// Batches that failed after all retries.
    #[serde(default)]
    pub failed_batches: usize,
    #[serde(default)]
    pub token_usage: TokenUsage,
}

impl AuditReport {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        crate::store::write_json_atomic(path, self)
            .with_context(|| format!("failed to write audit report to {}", path.display()))
    }

    /// Load a report from a JSON file.
    ///
    /// A bare JSON array of mismatches is accepted as well.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read audit report from {}", path.display()))?;

        if content.trim_start().starts_with('[') {
            let mismatches: Vec<AuditMismatch> =
                serde_json::from_str(&content).context("failed to parse audit mismatch list")?;
            return Ok(Self {
                id: Uuid::nil(),
                created_at: Utc::now(),
                model: String::new(),
                total_audited: mismatches.len(),
                mismatches,
                failed_batches: 0,
                token_usage: TokenUsage::default(),
            });
        }

        serde_json::from_str(&content).context("failed to parse audit report JSON")
    }

    /// Suggested primary concepts grouped by chapter.
    pub fn corrections_by_chapter(&self) -> BTreeMap<String, BTreeMap<RecordId, Option<String>>> {
        let mut grouped: BTreeMap<String, BTreeMap<RecordId, Option<String>>> = BTreeMap::new();
        for m in &self.mismatches {
            grouped
                .entry(m.chapter.clone())
                .or_default()
                .insert(m.question_id.clone(), m.suggested_link.clone());
        }
        grouped
    }

    /// Mismatches grouped by chapter id.
    pub fn mismatches_by_chapter(&self) -> BTreeMap<&str, Vec<&AuditMismatch>> {
        let mut grouped: BTreeMap<&str, Vec<&AuditMismatch>> = BTreeMap::new();
        for m in &self.mismatches {
            grouped.entry(m.chapter.as_str()).or_default().push(m);
        }
        grouped
    }
}

/// One `Q<id>: <concept>` line from the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSuggestion {
    /// The question id exactly as written after `Q`.
    pub question_id: String,
    /// `None` when the model answered "none".
    pub concept_id: Option<String>,
}

/// Build the prompt for one batch of questions from `chapter`.
pub fn build_audit_prompt(chapter: &Chapter, batch: &[&Question]) -> String {
    let concept_list = chapter
        .concepts
        .iter()
        .map(|c| format!("- {}: {} \u{2014} {}", c.id, c.term, c.definition))
        .collect::<Vec<_>>()
        .join("\n");

    let question_list = batch
        .iter()
        .map(|q| {
            let choices = q
                .choices
                .iter()
                .enumerate()
                .map(|(i, choice)| {
                    if i == q.correct_choice_index {
                        format!("[CORRECT] {choice}")
                    } else {
                        choice.clone()
                    }
                })
                .collect::<Vec<_>>()
                .join(" | ");
            let current = q.primary_concept_id.as_deref();
            format!(
                "Q{} (currently: {} = {})\n  Question: {}\n  Choices: {}",
                q.id,
                current.unwrap_or("none"),
                chapter.term_or_none(current),
                q.question_text,
                choices
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are auditing a study app's question bank. For each question below, determine which concept from the chapter it PRIMARILY tests.

Chapter: {name}

Concepts in this chapter:
{concept_list}

Questions to audit:
{question_list}

For each question, respond with EXACTLY one line in this format:
Q<id>: <concept_id>

Only output the question ID and concept ID, nothing else. If a question doesn't clearly match any concept, use \"none\".
Example:
Q123: {id}_t05
Q124: {id}_t12
Q125: none",
        name = chapter.name,
        id = chapter.id,
    )
}

/// Parse `Q<id>: <concept_id|none>` lines.
///
/// Lines not starting with `Q`, lines without a colon and lines with an
/// empty id or answer are ignored.
pub fn parse_audit_response(text: &str) -> Vec<AuditSuggestion> {
    text.lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix('Q')?;
            let (id, answer) = rest.split_once(':')?;
            let (id, answer) = (id.trim(), answer.trim());
            if id.is_empty() || answer.is_empty() {
                return None;
            }
            Some(AuditSuggestion {
                question_id: id.to_string(),
                concept_id: (!answer.eq_ignore_ascii_case("none")).then(|| answer.to_string()),
            })
        })
        .collect()
}

/// Findings for one chapter.
#[derive(Debug, Clone, Default)]
pub struct ChapterAudit {
    pub audited: usize,
    pub mismatches: Vec<AuditMismatch>,
    pub failed_batches: usize,
    pub token_usage: TokenUsage,
}

/// Compare one batch's suggestions with the current primaries.
///
/// Suggestions for questions outside the batch are dropped.
pub fn collect_mismatches(
    chapter: &Chapter,
    batch: &[&Question],
    suggestions: &[AuditSuggestion],
) -> (usize, Vec<AuditMismatch>) {
    let by_id: HashMap<String, &Question> = batch.iter().map(|q| (q.id.to_string(), *q)).collect();

    let mut audited = 0;
    let mut mismatches = Vec::new();
    for suggestion in suggestions {
        let Some(question) = by_id.get(&suggestion.question_id) else {
            tracing::debug!(question = %suggestion.question_id, "answer for question outside batch");
            continue;
        };
        audited += 1;

        if suggestion.concept_id == question.primary_concept_id {
            continue;
        }
        mismatches.push(AuditMismatch {
            question_id: question.id.clone(),
            chapter: chapter.id.clone(),
            question_text: question.question_text.clone(),
            current_link: question.primary_concept_id.clone(),
            suggested_link: suggestion.concept_id.clone(),
            current_term: chapter.term_or_none(question.primary_concept_id.as_deref()),
            suggested_term: chapter.term_or_none(suggestion.concept_id.as_deref()),
        });
    }
    (audited, mismatches)
}

/// Runs audits against one model.
pub struct Auditor {
    provider: Arc<dyn LlmProvider>,
    model: String,
    config: AuditConfig,
    retry: RetryPolicy,
}

impl Auditor {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        config: AuditConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            config,
            retry,
        }
    }

    /// Audit every question in `chapter` that has a primary concept.
    ///
    /// A batch that still fails after retries is counted and skipped,
    /// unless the failure is permanent, which aborts the audit.
    pub async fn audit_chapter(&self, chapter: &Chapter) -> Result<ChapterAudit> {
        let linked: Vec<&Question> = chapter
            .questions
            .iter()
            .filter(|q| q.primary_concept_id.is_some())
            .collect();

        let mut result = ChapterAudit::default();
        if linked.is_empty() {
            tracing::info!(chapter = %chapter.id, "no linked questions, skipping");
            return Ok(result);
        }
        tracing::info!(chapter = %chapter.id, questions = linked.len(), "auditing chapter");

        let batch_size = self.config.batch_size.max(1);
        for (index, batch) in linked.chunks(batch_size).enumerate() {
            if index > 0 && !self.retry.request_delay.is_zero() {
                tokio::time::sleep(self.retry.request_delay).await;
            }

            let request = GenerateRequest {
                model: self.model.clone(),
                prompt: build_audit_prompt(chapter, batch),
                system_prompt: None,
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            };

            let response =
                match generate_with_retry(self.provider.as_ref(), &request, &self.retry).await {
                    Ok(response) => response,
                    Err(e) => {
                        if e
                            .downcast_ref::<ProviderError>()
                            .is_some_and(ProviderError::is_permanent)
                        {
                            return Err(e.context(format!("audit of chapter {} failed", chapter.id)));
                        }
                        tracing::error!(chapter = %chapter.id, batch = index, "batch failed: {e:#}");
                        result.failed_batches += 1;
                        continue;
                    }
                };
            result.token_usage.add(response.token_usage);

            let suggestions = parse_audit_response(&response.content);
            let (audited, mismatches) = collect_mismatches(chapter, batch, &suggestions);
            tracing::debug!(
                chapter = %chapter.id,
                batch = index,
                audited,
                mismatches = mismatches.len(),
                "audited batch"
            );
            result.audited += audited;
            result.mismatches.extend(mismatches);
        }

        tracing::info!(
            chapter = %chapter.id,
            mismatches = result.mismatches.len(),
            "chapter audit complete"
        );
        Ok(result)
    }

    /// Audit chapters in order and collect a single report.
    pub async fn audit(&self, chapters: &[Chapter]) -> Result<AuditReport> {
        let mut report = AuditReport {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            model: self.model.clone(),
            total_audited: 0,
            mismatches: Vec::new(),
            failed_batches: 0,
            token_usage: TokenUsage::default(),
        };

        for chapter in chapters {
            let result = self.audit_chapter(chapter).await?;
            report.total_audited += result.audited;
            report.failed_batches += result.failed_batches;
            report.token_usage.add(result.token_usage);
            report.mismatches.extend(result.mismatches);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Concept;
    use crate::retry::testing::{ScriptedProvider, Step};
    use std::time::Duration;

    fn question(id: i64, text: &str, primary: Option<&str>) -> Question {
        Question {
            id: RecordId::Int(id),
            question_text: text.into(),
            choices: vec!["Caste".into(), "Class".into(), "Meritocracy".into(), "Status".into()],
            correct_choice_index: 1,
            primary_concept_id: primary.map(str::to_string),
        }
    }

    fn stratification() -> Chapter {
        Chapter {
            id: "ch07".into(),
            name: "Social Stratification".into(),
            order: 7,
            concepts: vec![
                Concept::new("ch07_t01", "Caste System", "Status ascribed at birth."),
                Concept::new("ch07_t02", "Class System", "Status partly achieved."),
            ],
            questions: vec![
                question(524, "Which system allows mobility?", Some("ch07_t01")),
                question(525, "Which system fixes status at birth?", Some("ch07_t01")),
                question(526, "Unlinked question", None),
            ],
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 1,
            retry_delay: Duration::from_millis(10),
            request_delay: Duration::ZERO,
        }
    }

    #[test]
    fn prompt_lists_concepts_and_marks_correct_choice() {
        let chapter = stratification();
        let batch: Vec<&Question> = chapter.questions.iter().take(1).collect();
        let prompt = build_audit_prompt(&chapter, &batch);

        assert!(prompt.contains("Chapter: Social Stratification"));
        assert!(prompt.contains("- ch07_t01: Caste System \u{2014} Status ascribed at birth."));
        assert!(prompt.contains("Q524 (currently: ch07_t01 = Caste System)"));
        assert!(prompt.contains("  Question: Which system allows mobility?"));
        assert!(prompt.contains("  Choices: Caste | [CORRECT] Class | Meritocracy | Status"));
        assert!(prompt.contains("Q<id>: <concept_id>"));
    }

    #[test]
    fn parse_ignores_noise() {
        let text = "Here are my answers:\nQ524: ch07_t02\n  Q525 : none \nQuestion without colon\nQ: ch07_t01\nQ526:\nnote: ignored\nQgen-1: ch07_t01";
        let parsed = parse_audit_response(text);
        assert_eq!(
            parsed,
            vec![
                AuditSuggestion {
                    question_id: "524".into(),
                    concept_id: Some("ch07_t02".into()),
                },
                AuditSuggestion {
                    question_id: "525".into(),
                    concept_id: None,
                },
                AuditSuggestion {
                    question_id: "gen-1".into(),
                    concept_id: Some("ch07_t01".into()),
                },
            ]
        );
    }

    #[test]
    fn mismatches_record_terms_and_skip_foreign_ids() {
        let chapter = stratification();
        let batch: Vec<&Question> = chapter.questions.iter().take(2).collect();
        let suggestions = parse_audit_response("Q524: ch07_t02\nQ525: ch07_t01\nQ999: ch07_t02");
        let (audited, mismatches) = collect_mismatches(&chapter, &batch, &suggestions);

        assert_eq!(audited, 2);
        assert_eq!(mismatches.len(), 1);
        let m = &mismatches[0];
        assert_eq!(m.question_id, RecordId::Int(524));
        assert_eq!(m.current_term, "Caste System");
        assert_eq!(m.suggested_term, "Class System");
        assert_eq!(m.chapter, "ch07");
    }

    #[test]
    fn none_suggestion_is_a_mismatch_with_none_term() {
        let chapter = stratification();
        let batch: Vec<&Question> = chapter.questions.iter().take(1).collect();
        let (_, mismatches) =
            collect_mismatches(&chapter, &batch, &parse_audit_response("Q524: none"));
        assert_eq!(mismatches[0].suggested_link, None);
        assert_eq!(mismatches[0].suggested_term, "none");
    }

    #[tokio::test]
    async fn audit_batches_only_linked_questions() {
        let provider = Arc::new(ScriptedProvider::replies([
            "Q524: ch07_t02",
            "Q525: ch07_t01",
        ]));
        let auditor = Auditor::new(
            provider.clone(),
            "judge",
            AuditConfig {
                batch_size: 1,
                ..Default::default()
            },
            policy(),
        );
        let report = auditor.audit(&[stratification()]).await.unwrap();

        assert_eq!(provider.call_count(), 2);
        assert_eq!(report.total_audited, 2);
        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(report.model, "judge");
        assert_eq!(report.token_usage.total_tokens, 30);

        let requests = provider.requests.lock().unwrap();
        assert!(requests.iter().all(|r| !r.prompt.contains("Q526")));
        assert_eq!(requests[0].max_tokens, 2000);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_batch_failure_is_counted() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Step::Fail(ProviderError::Timeout(30)),
            Step::Fail(ProviderError::Timeout(30)),
        ]));
        let auditor = Auditor::new(provider, "judge", AuditConfig::default(), policy());
        let report = auditor.audit(&[stratification()]).await.unwrap();
        assert_eq!(report.failed_batches, 1);
        assert_eq!(report.total_audited, 0);
    }

    #[tokio::test]
    async fn permanent_failure_aborts() {
        let provider = Arc::new(ScriptedProvider::new(vec![Step::Fail(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]));
        let auditor = Auditor::new(provider, "judge", AuditConfig::default(), policy());
        let err = auditor.audit(&[stratification()]).await.unwrap_err();
        assert!(format!("{err:#}").contains("authentication failed"));
    }

    #[test]
    fn report_round_trip_and_grouping() {
        let chapter = stratification();
        let batch: Vec<&Question> = chapter.questions.iter().take(2).collect();
        let (_, mismatches) = collect_mismatches(
            &chapter,
            &batch,
            &parse_audit_response("Q524: ch07_t02\nQ525: none"),
        );
        let report = AuditReport {
            id: Uuid::nil(),
            created_at: Utc::now(),
            model: "judge".into(),
            total_audited: 2,
            mismatches,
            failed_batches: 0,
            token_usage: TokenUsage::default(),
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit_report.json");
        report.save_json(&path).unwrap();
        let loaded = AuditReport::load_json(&path).unwrap();
        assert_eq!(loaded.mismatches, report.mismatches);

        let corrections = loaded.corrections_by_chapter();
        let ch07 = &corrections["ch07"];
        assert_eq!(ch07[&RecordId::Int(524)].as_deref(), Some("ch07_t02"));
        assert_eq!(ch07[&RecordId::Int(525)], None);
    }

    #[test]
    fn load_accepts_bare_mismatch_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit_report.json");
        std::fs::write(
            &path,
            r#"[{"question_id": 524, "chapter": "ch07", "question_text": "Which?",
                 "current_link": "ch07_t01", "suggested_link": "ch07_t02",
                 "current_term": "Caste System", "suggested_term": "Class System"}]"#,
        )
        .unwrap();
        let report = AuditReport::load_json(&path).unwrap();
        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(report.mismatches_by_chapter()["ch07"].len(), 1);
    }
}
