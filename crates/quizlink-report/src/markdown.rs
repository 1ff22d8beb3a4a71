//! Markdown rendering of audit reports.

use std::path::Path;

use anyhow::{Context, Result};

use quizlink_core::audit::{AuditMismatch, AuditReport};

/// Longest question excerpt shown in a table cell.
const MAX_QUESTION_CHARS: usize = 80;

/// Truncate to [`MAX_QUESTION_CHARS`] characters and make the text safe
/// inside a table cell.
fn table_cell(text: &str) -> String {
    let flat = text.replace(['\n', '\r'], " ");
    let mut cell: String = flat.chars().take(MAX_QUESTION_CHARS).collect();
    if flat.chars().count() > MAX_QUESTION_CHARS {
        cell.push_str("...");
    }
    cell.replace('|', "\\|")
}

fn link_cell(id: Option<&str>, term: &str) -> String {
    match id {
        Some(id) => format!("{id} ({})", term.replace('|', "\\|")),
        None => "none".to_string(),
    }
}

fn mismatch_row(m: &AuditMismatch) -> String {
    format!(
        "| Q{} | {} | {} | {} |\n",
        m.question_id,
        link_cell(m.current_link.as_deref(), &m.current_term),
        link_cell(m.suggested_link.as_deref(), &m.suggested_term),
        table_cell(&m.question_text)
    )
}

/// Format an audit report as markdown, one table per chapter.
pub fn audit_to_markdown(report: &AuditReport) -> String {
    let mut md = String::new();

    md.push_str("# Question-Concept Link Audit Report\n\n");
    if !report.model.is_empty() {
        md.push_str(&format!("**Model:** {}  \n", report.model));
    }
    md.push_str(&format!("**Total audited:** {}  \n", report.total_audited));
    md.push_str(&format!("**Mismatches:** {}\n", report.mismatches.len()));
    if report.failed_batches > 0 {
        md.push_str(&format!(
            "\n> {} batch(es) failed and were not audited.\n",
            report.failed_batches
        ));
    }

    for (chapter, mismatches) in report.mismatches_by_chapter() {
        md.push_str(&format!(
            "\n## {chapter} ({} mismatches)\n\n",
            mismatches.len()
        ));
        md.push_str("| Question | Current | Suggested | Question Text |\n");
        md.push_str("|----------|---------|-----------|---------------|\n");
        for m in mismatches {
            md.push_str(&mismatch_row(m));
        }
    }

    md
}

/// Write the markdown rendering of `report` to `path`.
pub fn write_audit_markdown(report: &AuditReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, audit_to_markdown(report))
        .with_context(|| format!("failed to write audit markdown to {}", path.display()))
}
