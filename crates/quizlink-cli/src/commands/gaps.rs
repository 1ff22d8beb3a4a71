//! The `quizlink gaps` command.

use anyhow::Result;

use quizlink_core::linker::concepts_missing_questions;

use super::{open_store, select_chapters, GlobalArgs};

pub fn execute(global: &GlobalArgs, chapter_ids: Vec<String>, format: String) -> Result<()> {
    let config = global.load_config()?;
    let store = open_store(&config);
    let chapters = select_chapters(store.load_all()?, &chapter_ids)?;

    match format.as_str() {
        "json" => {
            let gaps: Vec<serde_json::Value> = chapters
                .iter()
                .map(|chapter| {
                    let missing: Vec<serde_json::Value> = concepts_missing_questions(chapter)
                        .iter()
                        .map(|c| serde_json::json!({"id": c.id, "term": c.term}))
                        .collect();
                    serde_json::json!({
                        "chapter_id": chapter.id,
                        "name": chapter.name,
                        "concepts": chapter.concepts.len(),
                        "missing": missing,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&gaps)?);
        }
        "table" => {
            use comfy_table::{Cell, Table};

            let mut table = Table::new();
            table.set_header(vec!["Chapter", "Concept", "Term"]);
            let mut total = 0;
            for chapter in &chapters {
                for concept in concepts_missing_questions(chapter) {
                    table.add_row(vec![
                        Cell::new(&chapter.id),
                        Cell::new(&concept.id),
                        Cell::new(&concept.term),
                    ]);
                    total += 1;
                }
            }

            if total == 0 {
                println!("Every concept has at least one question.");
            } else {
                println!("{table}");
                println!("{total} concept(s) without questions.");
            }
        }
        other => anyhow::bail!("unknown format '{other}', expected table or json"),
    }

    Ok(())
}
