//! The `quizlink build` command.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use quizlink_core::engine::{LinkEngine, LinkEngineConfig, LinkMode, ProgressReporter};
use quizlink_core::model::Chapter;
use quizlink_core::ranker::Strategy;
use quizlink_core::report::{BuildReport, ChapterSummary};

use super::{open_store, GlobalArgs};

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_chapter_start(&self, chapter_id: &str) {
        eprintln!("  Linking: {chapter_id}");
    }

    fn on_chapter_complete(&self, summary: &ChapterSummary) {
        eprintln!(
            "  Done: {} ({} concepts, {} questions, {} gaps)",
            summary.chapter_id, summary.concepts, summary.questions, summary.gaps
        );
    }

    fn on_chapter_error(&self, chapter_id: &str, error: &str) {
        eprintln!("  ERROR: {chapter_id}: {error}");
    }

    fn on_run_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {completed}/{total} chapters linked, {failed} failed ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

pub async fn execute(
    global: &GlobalArgs,
    strategy: Option<String>,
    mode: LinkMode,
    parallelism: Option<usize>,
    report_path: Option<PathBuf>,
) -> Result<()> {
    let config = global.load_config()?;

    let mut ranker = config.linking.clone();
    if let Some(s) = strategy {
        ranker.strategy = s.parse::<Strategy>().map_err(anyhow::Error::msg)?;
    }
    let parallelism = parallelism.unwrap_or(config.parallelism);
    anyhow::ensure!(parallelism >= 1, "parallelism must be at least 1");

    let store = open_store(&config);
    let chapters = store
        .load_all()
        .with_context(|| format!("failed to load chapters from {}", store.data_dir().display()))?;
    anyhow::ensure!(
        !chapters.is_empty(),
        "no chapters found in {}",
        store.data_dir().display()
    );

    eprintln!(
        "quizlink v{}: linking {} chapters ({} ranking)",
        env!("CARGO_PKG_VERSION"),
        chapters.len(),
        ranker.strategy
    );
    eprintln!();

    let engine = LinkEngine::new(LinkEngineConfig {
        parallelism,
        ranker,
    });
    let outcome = engine.run(chapters, mode, &ConsoleReporter).await?;

    let changed: Vec<&Chapter> = outcome
        .chapters
        .iter()
        .filter(|c| outcome.processed.contains(&c.id))
        .collect();
    store.save(&changed, &outcome.chapters)?;
    eprintln!("Saved {} chapters to {}", changed.len(), store.data_dir().display());

    print_summary(&outcome.report);

    if let Some(path) = report_path {
        outcome.report.save_json(&path)?;
        eprintln!("Build report: {}", path.display());
    }

    if outcome.report.has_failures() {
        anyhow::bail!(
            "{} chapter(s) failed validation: {}",
            outcome.report.failures.len(),
            outcome
                .report
                .failures
                .iter()
                .map(|f| f.chapter_id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    Ok(())
}

fn print_summary(report: &BuildReport) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec![
        "Chapter",
        "Concepts",
        "Questions",
        "With primary",
        "Gaps",
        "Confusable links",
        "Coverage",
    ]);

    for s in &report.chapters {
        table.add_row(vec![
            Cell::new(&s.chapter_id),
            Cell::new(s.concepts),
            Cell::new(s.questions),
            Cell::new(s.questions_with_primary),
            Cell::new(s.gaps),
            Cell::new(s.confusable_links),
            Cell::new(format!("{:.1}%", s.coverage() * 100.0)),
        ]);
    }

    println!("{table}");
}
