//! The `quizlink report` command.

use std::path::PathBuf;

use anyhow::Result;

use quizlink_core::audit::AuditReport;
use quizlink_core::store::AUDIT_REPORT_FILE;
use quizlink_report::{write_audit_markdown, write_html_report};

use super::{open_store, GlobalArgs};

pub fn execute(global: &GlobalArgs, output: Option<PathBuf>, audit: Option<PathBuf>) -> Result<()> {
    let config = global.load_config()?;
    let store = open_store(&config);
    let chapters = store.load_all()?;

    let output = output.unwrap_or_else(|| store.data_dir().to_path_buf());

    let html_path = output.join("coverage.html");
    write_html_report(&chapters, &html_path)?;
    println!("HTML report: {}", html_path.display());

    let audit_path = match audit {
        Some(path) => Some(path),
        None => Some(store.data_dir().join(AUDIT_REPORT_FILE)).filter(|p| p.is_file()),
    };
    if let Some(path) = audit_path {
        let report = AuditReport::load_json(&path)?;
        let md_path = output.join("audit_report.md");
        write_audit_markdown(&report, &md_path)?;
        println!("Audit report: {}", md_path.display());
    }

    Ok(())
}
