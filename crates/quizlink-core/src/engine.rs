//! Chapter link engine.
//!
//! Runs validation, term linking and confusable ranking over many chapters
//! concurrently. Each chapter is processed on the blocking pool by the task
//! that owns it; results come back in input order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::error::LinkError;
use crate::linker::{assign_primary_concepts, rebuild_associations, PrimaryScope};
use crate::model::{Chapter, RecordId};
use crate::ranker::{ConfusableRanker, RankerConfig};
use crate::report::{BuildReport, ChapterFailure, ChapterSummary};

/// Configuration for the link engine.
#[derive(Debug, Clone)]
pub struct LinkEngineConfig {
    /// Maximum chapters processed at once.
    pub parallelism: usize,
    /// Confusable ranking settings.
    pub ranker: RankerConfig,
}

impl Default for LinkEngineConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            ranker: RankerConfig::default(),
        }
    }
}

/// How primary concepts are treated during a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkMode {
    /// Assign a primary concept to questions that have none; stored
    /// primaries, including audit corrections, are kept.
    #[default]
    FillMissing,
    /// Keep every primary concept as stored, even an empty one.
    KeepPrimaries,
    /// Discard stored primaries and reassign all of them.
    Reassign,
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_chapter_start(&self, chapter_id: &str);
    fn on_chapter_complete(&self, summary: &ChapterSummary);
    fn on_chapter_error(&self, chapter_id: &str, error: &str);
    fn on_run_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_chapter_start(&self, _: &str) {}
    fn on_chapter_complete(&self, _: &ChapterSummary) {}
    fn on_chapter_error(&self, _: &str, _: &str) {}
    fn on_run_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
}

/// Chapters after a run, with the report describing it.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// Every input chapter in input order. Rejected chapters are unchanged.
    pub chapters: Vec<Chapter>,
    /// Ids of chapters that were linked and ranked.
    pub processed: Vec<String>,
    pub report: BuildReport,
}

/// The chapter link engine.
pub struct LinkEngine {
    ranker: Arc<ConfusableRanker>,
    config: LinkEngineConfig,
}

impl LinkEngine {
    pub fn new(config: LinkEngineConfig) -> Self {
        Self {
            ranker: Arc::new(ConfusableRanker::new(&config.ranker)),
            config,
        }
    }

    pub fn ranker(&self) -> &ConfusableRanker {
        &self.ranker
    }

    /// Validate, link and rank one chapter in place.
    ///
    /// A chapter that fails validation is left untouched.
    pub fn process_chapter(
        &self,
        chapter: &mut Chapter,
        mode: LinkMode,
    ) -> Result<ChapterSummary, LinkError> {
        process(&self.ranker, chapter, mode)
    }

    /// Process every chapter, at most `parallelism` at a time.
    pub async fn run(
        &self,
        chapters: Vec<Chapter>,
        mode: LinkMode,
        progress: &dyn ProgressReporter,
    ) -> Result<BuildOutcome> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let total = chapters.len();

        let mut futures = FuturesUnordered::new();
        for (index, mut chapter) in chapters.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let ranker = Arc::clone(&self.ranker);

            futures.push(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| anyhow::anyhow!("semaphore closed"))?;
                progress.on_chapter_start(&chapter.id);

                let chapter_id = chapter.id.clone();
                let (chapter, result) = tokio::task::spawn_blocking(move || {
                    let result = process(&ranker, &mut chapter, mode);
                    (chapter, result)
                })
                .await
                .with_context(|| format!("chapter task for '{chapter_id}' panicked"))?;

                anyhow::Ok((index, chapter, result))
            });
        }

        let mut slots: Vec<Option<(Chapter, Result<ChapterSummary, LinkError>)>> =
            (0..total).map(|_| None).collect();
        while let Some(finished) = futures.next().await {
            let (index, chapter, result) = finished?;
            match &result {
                Ok(summary) => progress.on_chapter_complete(summary),
                Err(e) => {
                    tracing::error!("chapter {} failed: {e}", chapter.id);
                    progress.on_chapter_error(&chapter.id, &e.to_string());
                }
            }
            slots[index] = Some((chapter, result));
        }

        let mut outcome_chapters = Vec::with_capacity(total);
        let mut processed = Vec::new();
        let mut summaries = Vec::new();
        let mut failures = Vec::new();
        for (chapter, result) in slots.into_iter().flatten() {
            match result {
                Ok(summary) => {
                    processed.push(chapter.id.clone());
                    summaries.push(summary);
                }
                Err(e) => failures.push(ChapterFailure {
                    chapter_id: chapter.id.clone(),
                    error: e.to_string(),
                }),
            }
            outcome_chapters.push(chapter);
        }

        let elapsed = start.elapsed();
        progress.on_run_complete(total, summaries.len(), failures.len(), elapsed);
        tracing::info!(
            chapters = total,
            failed = failures.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "link run complete"
        );

        Ok(BuildOutcome {
            chapters: outcome_chapters,
            processed,
            report: BuildReport {
                id: run_id,
                created_at: chrono::Utc::now(),
                strategy: self.ranker.strategy().to_string(),
                chapters: summaries,
                failures,
                duration_ms: elapsed.as_millis() as u64,
            },
        })
    }
}

fn process(
    ranker: &ConfusableRanker,
    chapter: &mut Chapter,
    mode: LinkMode,
) -> Result<ChapterSummary, LinkError> {
    chapter.validate()?;

    match mode {
        LinkMode::FillMissing => {
            let unassigned: Vec<RecordId> = chapter
                .questions
                .iter()
                .filter(|q| q.primary_concept_id.is_none())
                .map(|q| q.id.clone())
                .collect();
            if !unassigned.is_empty() {
                assign_primary_concepts(chapter, PrimaryScope::Only(&unassigned));
            }
        }
        LinkMode::KeepPrimaries => {}
        LinkMode::Reassign => assign_primary_concepts(chapter, PrimaryScope::All),
    }
    rebuild_associations(chapter);
    ranker.rank_chapter(chapter);

    let summary = ChapterSummary::from_chapter(chapter);
    tracing::debug!(
        chapter = %chapter.id,
        concepts = summary.concepts,
        questions = summary.questions,
        gaps = summary.gaps,
        "linked chapter"
    );
    Ok(summary)
}
