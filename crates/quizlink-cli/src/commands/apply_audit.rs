//! The `quizlink apply-audit` command.

use std::path::PathBuf;

use anyhow::Result;

use quizlink_core::audit::AuditReport;
use quizlink_core::linker::apply_corrections;
use quizlink_core::model::Chapter;
use quizlink_core::store::AUDIT_REPORT_FILE;

use super::{open_store, GlobalArgs};

pub fn execute(global: &GlobalArgs, report_path: Option<PathBuf>, dry_run: bool) -> Result<()> {
    let config = global.load_config()?;
    let store = open_store(&config);

    let report_path = report_path.unwrap_or_else(|| store.data_dir().join(AUDIT_REPORT_FILE));
    let report = AuditReport::load_json(&report_path)?;
    let corrections = report.corrections_by_chapter();
    if corrections.is_empty() {
        println!("No mismatches in {}, nothing to apply.", report_path.display());
        return Ok(());
    }

    let mut chapters = store.load_all()?;
    let mut changed_ids = Vec::new();
    let mut applied = 0;
    let mut rejected = 0;
    let mut failed = Vec::new();

    for (chapter_id, chapter_corrections) in &corrections {
        let Some(chapter) = chapters.iter_mut().find(|c| &c.id == chapter_id) else {
            eprintln!(
                "  WARNING: chapter '{chapter_id}' not found, skipping {} correction(s)",
                chapter_corrections.len()
            );
            rejected += chapter_corrections.len();
            continue;
        };

        let outcome = match apply_corrections(chapter, chapter_corrections) {
            Ok(outcome) => outcome,
            Err(e) => {
                eprintln!("  ERROR: {chapter_id}: {e}");
                failed.push(chapter_id.clone());
                continue;
            }
        };
        for error in &outcome.rejected {
            eprintln!("  WARNING: {error}");
        }
        println!(
            "{chapter_id}: {} applied, {} unchanged, {} rejected",
            outcome.applied,
            outcome.unchanged,
            outcome.rejected.len()
        );
        applied += outcome.applied;
        rejected += outcome.rejected.len();
        if outcome.applied > 0 {
            changed_ids.push(chapter_id.clone());
        }
    }

    if dry_run {
        println!("\nDry run: {applied} correction(s) would be applied, {rejected} rejected.");
        return check_failed(&failed);
    }

    let changed: Vec<&Chapter> = chapters
        .iter()
        .filter(|c| changed_ids.contains(&c.id))
        .collect();
    if !changed.is_empty() {
        store.save(&changed, &chapters)?;
    }
    println!(
        "\nApplied {applied} correction(s) across {} chapter(s), {rejected} rejected.",
        changed.len()
    );

    check_failed(&failed)
}

fn check_failed(failed: &[String]) -> Result<()> {
    if !failed.is_empty() {
        anyhow::bail!(
            "{} chapter(s) failed validation: {}",
            failed.len(),
            failed.join(", ")
        );
    }
    Ok(())
}
