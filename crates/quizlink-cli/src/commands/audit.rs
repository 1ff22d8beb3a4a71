//! The `quizlink audit` command.

use std::path::PathBuf;

use anyhow::Result;

use quizlink_core::audit::{AuditReport, Auditor};
use quizlink_core::store::AUDIT_REPORT_FILE;
use quizlink_report::write_audit_markdown;

use super::{open_store, select_chapters, GlobalArgs};

pub async fn execute(
    global: &GlobalArgs,
    provider_name: Option<String>,
    model: Option<String>,
    chapter_ids: Vec<String>,
    batch_size: Option<usize>,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = global.load_config()?;

    let mut audit_config = config.audit.clone();
    if let Some(size) = batch_size {
        anyhow::ensure!(size >= 1, "batch size must be at least 1");
        audit_config.batch_size = size;
    }

    let store = open_store(&config);
    let chapters = select_chapters(store.load_all()?, &chapter_ids)?;

    let provider = config.provider(provider_name.as_deref())?;
    let model = model.unwrap_or_else(|| config.default_model.clone());
    eprintln!(
        "Auditing {} chapters with {}/{} (batches of {})",
        chapters.len(),
        provider.name(),
        model,
        audit_config.batch_size
    );

    let auditor = Auditor::new(provider, model, audit_config, config.retry_policy());
    let report = auditor.audit(&chapters).await?;

    let json_path = output.unwrap_or_else(|| store.data_dir().join(AUDIT_REPORT_FILE));
    report.save_json(&json_path)?;
    let md_path = json_path.with_extension("md");
    write_audit_markdown(&report, &md_path)?;

    print_summary(&report);
    eprintln!("Audit report: {}", json_path.display());
    eprintln!("Markdown report: {}", md_path.display());

    Ok(())
}

fn print_summary(report: &AuditReport) {
    use comfy_table::{Cell, Table};

    let by_chapter = report.mismatches_by_chapter();
    if !by_chapter.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Chapter", "Mismatches"]);
        for (chapter, mismatches) in &by_chapter {
            table.add_row(vec![Cell::new(chapter), Cell::new(mismatches.len())]);
        }
        println!("{table}");
    }

    println!(
        "Audited {} questions: {} mismatches, {} failed batches, {} tokens",
        report.total_audited,
        report.mismatches.len(),
        report.failed_batches,
        report.token_usage.total_tokens
    );
}
