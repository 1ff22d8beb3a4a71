//! Subcommand implementations.

use std::path::PathBuf;

use anyhow::Result;

use quizlink_core::model::Chapter;
use quizlink_core::store::ContentStore;
use quizlink_providers::{load_config, QuizlinkConfig};

pub mod apply_audit;
pub mod audit;
pub mod build;
pub mod gaps;
pub mod generate;
pub mod init;
pub mod list_models;
pub mod report;
pub mod validate;

/// Options accepted by every subcommand.
pub struct GlobalArgs {
    pub config: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
}

impl GlobalArgs {
    /// Load the config, applying `--data-dir`.
    pub fn load_config(&self) -> Result<QuizlinkConfig> {
        let mut config = load_config(self.config.as_deref())?;
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        tracing::debug!(
            data_dir = %config.data_dir.display(),
            providers = config.providers.len(),
            "configuration loaded"
        );
        Ok(config)
    }
}

pub fn open_store(config: &QuizlinkConfig) -> ContentStore {
    ContentStore::new(config.data_dir.clone())
}

/// Keep only the requested chapters; an empty filter keeps all of them.
/// Unknown ids are an error.
pub fn select_chapters(chapters: Vec<Chapter>, ids: &[String]) -> Result<Vec<Chapter>> {
    if ids.is_empty() {
        return Ok(chapters);
    }
    if let Some(missing) = ids.iter().find(|id| !chapters.iter().any(|c| &c.id == *id)) {
        anyhow::bail!(
            "unknown chapter '{missing}'. Available: {}",
            chapters
                .iter()
                .map(|c| c.id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(chapters
        .into_iter()
        .filter(|c| ids.contains(&c.id))
        .collect())
}
