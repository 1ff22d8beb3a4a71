//! The `quizlink init` command.

use std::path::Path;

use anyhow::{Context, Result};

pub fn execute() -> Result<()> {
    if Path::new("quizlink.toml").exists() {
        println!("quizlink.toml already exists, skipping.");
    } else {
        std::fs::write("quizlink.toml", SAMPLE_CONFIG).context("failed to write quizlink.toml")?;
        println!("Created quizlink.toml");
    }

    std::fs::create_dir_all("data").context("failed to create data directory")?;
    let example_path = Path::new("data/ch01.json");
    if example_path.exists() {
        println!("data/ch01.json already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_CHAPTER)
            .with_context(|| format!("failed to write {}", example_path.display()))?;
        println!("Created data/ch01.json");
    }

    println!("\nNext steps:");
    println!("  1. Edit quizlink.toml with your API keys");
    println!("  2. Run: quizlink validate");
    println!("  3. Run: quizlink build");
    println!("  4. Run: quizlink gaps");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# quizlink configuration

default_provider = "anthropic"
default_model = "claude-sonnet-4-20250514"
data_dir = "data"
max_retries = 3
retry_delay_ms = 1000
request_delay_ms = 1000
parallelism = 4

[providers.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[linking]
strategy = "tfidf"        # or "jaccard"
# max_confusables = 4
# min_score = 0.05
extra_stop_words = []

[audit]
batch_size = 15
max_tokens = 2000

[generation]
questions_per_concept = 3
max_tokens = 8192
# reference_dir = "reference"
"#;

const EXAMPLE_CHAPTER: &str = r#"{
  "id": "ch01",
  "name": "Socialization",
  "order": 1,
  "concepts": [
    {
      "id": "ch01_t01",
      "term": "Socialization",
      "definition": "The lifelong process of learning the norms, values and behaviors of a society."
    },
    {
      "id": "ch01_t02",
      "term": "Resocialization",
      "definition": "The process of discarding old norms and behaviors and adopting new ones."
    },
    {
      "id": "ch01_t03",
      "term": "Socioeconomic Status (SES)",
      "definition": "A combined measure of income, education and occupation."
    }
  ],
  "questions": [
    {
      "id": 1,
      "question_text": "A new army recruit gives up civilian habits during boot camp. This is an example of:",
      "choices": ["Anticipatory socialization", "Resocialization", "Role strain", "Status set"],
      "correct_choice_index": 1
    },
    {
      "id": 2,
      "question_text": "Which measure combines income, education and occupation?",
      "choices": ["Prestige", "Wealth", "SES", "Power"],
      "correct_choice_index": 2
    }
  ]
}
"#;
