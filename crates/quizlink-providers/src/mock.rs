//! Mock provider for testing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use quizlink_core::traits::{
    GenerateRequest, GenerateResponse, LlmProvider, ModelInfo, TokenUsage,
};

/// A mock LLM provider for exercising audits and generation without API calls.
///
/// Replies are chosen by prompt substring; the first registered rule whose
/// key occurs in the prompt wins.
pub struct MockProvider {
    /// (prompt substring, reply) rules, checked in order.
    responses: Vec<(String, String)>,
    /// Reply when no rule matches.
    default_response: String,
    call_count: AtomicU32,
    last_request: Mutex<Option<GenerateRequest>>,
}

impl MockProvider {
    pub fn new(responses: Vec<(String, String)>) -> Self {
        Self {
            responses,
            default_response: String::new(),
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// A mock that always returns the same reply.
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            default_response: response.to_string(),
            ..Self::new(Vec::new())
        }
    }

    /// Add a rule replying with `response` when the prompt contains `key`.
    pub fn on_prompt(mut self, key: &str, response: &str) -> Self {
        self.responses.push((key.to_string(), response.to_string()));
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.last_request
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        let content = self
            .responses
            .iter()
            .find(|(key, _)| request.prompt.contains(key.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.default_response.clone());

        // Rough estimate, four characters per token.
        let prompt_tokens = (request.prompt.len() / 4) as u32;
        let completion_tokens = (content.len() / 4) as u32;

        Ok(GenerateResponse {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            latency_ms: 1,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "mock-model".into(),
            name: "Mock Model".into(),
            provider: "mock".into(),
            max_context: 100_000,
            cost_per_1k_input: 0.0,
            cost_per_1k_output: 0.0,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> GenerateRequest {
        GenerateRequest {
            model: "mock-model".into(),
            prompt: prompt.into(),
            system_prompt: None,
            max_tokens: 100,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn fixed_response() {
        let provider = MockProvider::with_fixed_response("Q1: ch01_t01");
        let response = provider.generate(&request("anything")).await.unwrap();
        assert_eq!(response.content, "Q1: ch01_t01");
        assert_eq!(response.model, "mock-model");
        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.last_request().unwrap().prompt, "anything");
    }

    #[tokio::test]
    async fn prompt_matching_uses_first_rule() {
        let provider = MockProvider::new(Vec::new())
            .on_prompt("Chapter: Socialization", "Q1: ch05_t01")
            .on_prompt("Chapter:", "Q1: none");

        let resp = provider
            .generate(&request("Chapter: Socialization\nQ1: ..."))
            .await
            .unwrap();
        assert_eq!(resp.content, "Q1: ch05_t01");

        let resp = provider
            .generate(&request("Chapter: Deviance\nQ1: ..."))
            .await
            .unwrap();
        assert_eq!(resp.content, "Q1: none");

        let resp = provider.generate(&request("unrelated")).await.unwrap();
        assert!(resp.content.is_empty());
        assert_eq!(provider.call_count(), 3);
    }
}
