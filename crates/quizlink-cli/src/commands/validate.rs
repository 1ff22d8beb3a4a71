//! The `quizlink validate` command.

use anyhow::Result;

use quizlink_core::store::lint_chapter;

use super::{open_store, GlobalArgs};

pub fn execute(global: &GlobalArgs) -> Result<()> {
    let config = global.load_config()?;
    let store = open_store(&config);
    let chapters = store.load_all()?;

    let mut total_warnings = 0;
    let mut invalid = 0;

    for chapter in &chapters {
        println!(
            "Chapter {}: {} ({} concepts, {} questions)",
            chapter.id,
            chapter.name,
            chapter.concepts.len(),
            chapter.questions.len()
        );

        if let Err(e) = chapter.validate() {
            println!("  ERROR: {e}");
            invalid += 1;
        }

        let warnings = lint_chapter(chapter);
        for w in &warnings {
            let prefix = w
                .record_id
                .as_ref()
                .map(|id| format!("  [{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if invalid > 0 {
        anyhow::bail!("{invalid} chapter(s) failed validation");
    }

    if total_warnings == 0 {
        println!("All chapters valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
