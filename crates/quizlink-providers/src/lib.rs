//! quizlink-providers: language-model backends and configuration loading.
//!
//! Implements the `LlmProvider` trait for Anthropic and OpenAI-compatible
//! endpoints, plus the configuration file that selects between them.

pub mod anthropic;
pub mod config;
mod http;
pub mod mock;
pub mod openai;

pub use config::{create_provider, load_config, ProviderConfig, QuizlinkConfig};
pub use quizlink_core::error::ProviderError;
