//! The `quizlink list-models` command.

use anyhow::Result;

use quizlink_providers::create_provider;

use super::GlobalArgs;

pub fn execute(global: &GlobalArgs, provider_filter: Option<String>) -> Result<()> {
    let config = global.load_config()?;

    let mut names: Vec<&String> = config.providers.keys().collect();
    names.sort();

    let mut found_any = false;
    for name in names {
        if provider_filter.as_ref().is_some_and(|filter| filter != name) {
            continue;
        }

        let provider = match create_provider(&config.providers[name]) {
            Ok(provider) => provider,
            Err(e) => {
                eprintln!("Provider {name}: {e:#}");
                continue;
            }
        };
        let models = provider.available_models();

        if !models.is_empty() {
            found_any = true;
            println!("Provider: {name}");
            for model in &models {
                println!(
                    "  {}: {} ({}K context, ${:.4}/{:.4} per 1K tokens)",
                    model.id,
                    model.name,
                    model.max_context / 1000,
                    model.cost_per_1k_input,
                    model.cost_per_1k_output,
                );
            }
            println!();
        }
    }

    if !found_any {
        println!("No providers configured. Run `quizlink init` to create a config file.");
    }

    Ok(())
}
