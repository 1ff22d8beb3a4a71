//! Core trait definitions for language-model providers.
//!
//! The auditor and the question generator talk to a remote model through
//! [`LlmProvider`]; implementations live in the `quizlink-providers` crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Trait for LLM backends that answer a text prompt.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Name used in config and logs, such as "anthropic".
    fn name(&self) -> &str;

    /// Send a prompt and return the model's reply.
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse>;

    /// Models this backend knows about, for `list-models`.
    fn available_models(&self) -> Vec<ModelInfo>;
}

/// Request sent to an LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model to ask.
    pub model: String,
    /// Audit or generation prompt.
    pub prompt: String,
    /// Optional system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Upper bound on reply tokens.
    pub max_tokens: u32,
    pub temperature: f64,
}

/// Response from an LLM request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// The raw response text.
    pub content: String,
    /// Model that actually produced the response.
    pub model: String,
    pub token_usage: TokenUsage,
    /// Wall-clock time of the request.
    pub latency_ms: u64,
}

/// Token accounting for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Catalogue entry for one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    /// Display name.
    pub name: String,
    pub provider: String,
    /// Context window in tokens.
    pub max_context: u32,
    /// USD per 1K prompt tokens.
    pub cost_per_1k_input: f64,
    /// USD per 1K completion tokens.
    pub cost_per_1k_output: f64,
}
