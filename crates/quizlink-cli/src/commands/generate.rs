//! The `quizlink generate` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use quizlink_core::generate::{append_drafts, format_as_markdown, Generator};
use quizlink_core::model::Chapter;

use super::{open_store, select_chapters, GlobalArgs};

pub struct GenerateArgs {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub chapters: Vec<String>,
    pub per_concept: Option<usize>,
    pub reference_dir: Option<PathBuf>,
    pub output: PathBuf,
    pub merge: bool,
}

pub async fn execute(global: &GlobalArgs, args: GenerateArgs) -> Result<()> {
    let config = global.load_config()?;

    let mut generation = config.generation.clone();
    if let Some(n) = args.per_concept {
        anyhow::ensure!(n >= 1, "questions per concept must be at least 1");
        generation.questions_per_concept = n;
    }
    if args.reference_dir.is_some() {
        generation.reference_dir = args.reference_dir;
    }

    let store = open_store(&config);
    let mut all = store.load_all()?;
    let selected: Vec<String> = select_chapters(all.clone(), &args.chapters)?
        .into_iter()
        .map(|c| c.id)
        .collect();

    let provider = config.provider(args.provider.as_deref())?;
    let model = args.model.unwrap_or_else(|| config.default_model.clone());
    let generator = Generator::new(provider, model, generation, config.retry_policy());

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;

    let mut changed_ids = Vec::new();
    let mut failed = Vec::new();
    let mut total_tokens = 0;
    for chapter in all.iter_mut().filter(|c| selected.contains(&c.id)) {
        if let Err(e) = chapter.validate() {
            eprintln!("  ERROR: {}: {e}", chapter.id);
            failed.push(chapter.id.clone());
            continue;
        }
        let Some(result) = generator.generate_for_chapter(chapter).await? else {
            eprintln!("  {}: no gaps, skipping", chapter.id);
            continue;
        };
        total_tokens += result.token_usage.total_tokens;

        let expected = result.expected(generator.config().questions_per_concept);
        eprintln!(
            "  {}: {} of {} questions parsed for {} concept(s)",
            chapter.id,
            result.drafts.len(),
            expected,
            result.concepts
        );
        if result.drafts.is_empty() {
            continue;
        }

        let path = args.output.join(format!("{}_generated.md", chapter.id));
        std::fs::write(&path, format_as_markdown(&result.drafts, &chapter.name))
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());

        if args.merge {
            match append_drafts(chapter, &result.drafts) {
                Ok(ids) => {
                    eprintln!("  {}: merged {} question(s)", chapter.id, ids.len());
                    changed_ids.push(chapter.id.clone());
                }
                Err(e) => {
                    eprintln!("  ERROR: {}: {e}", chapter.id);
                    failed.push(chapter.id.clone());
                }
            }
        }
    }

    if !changed_ids.is_empty() {
        let changed: Vec<&Chapter> = all.iter().filter(|c| changed_ids.contains(&c.id)).collect();
        store.save(&changed, &all)?;
        println!("Merged generated questions into {} chapter(s)", changed.len());
    }
    eprintln!("Total tokens: {total_tokens}");

    if !failed.is_empty() {
        anyhow::bail!(
            "{} chapter(s) failed validation: {}",
            failed.len(),
            failed.join(", ")
        );
    }
    Ok(())
}
