//! Retrying provider calls with exponential backoff.

use std::time::Duration;

use anyhow::Result;

use crate::error::ProviderError;
use crate::traits::{GenerateRequest, GenerateResponse, LlmProvider};

/// Upper bound for the delay between two attempts.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Retry and pacing settings for remote model calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub retry_delay: Duration,
    /// Pause between consecutive batch requests.
    pub request_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            request_delay: Duration::from_secs(1),
        }
    }
}

/// Send `request`, retrying transient provider failures.
///
/// Authentication and unknown-model errors are returned at once. A
/// rate-limit response's retry-after hint replaces the current delay.
pub async fn generate_with_retry(
    provider: &dyn LlmProvider,
    request: &GenerateRequest,
    policy: &RetryPolicy,
) -> Result<GenerateResponse> {
    let mut last_error = None;
    let mut retry_delay = policy.retry_delay;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            tokio::time::sleep(retry_delay).await;
            retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
        }

        match provider.generate(request).await {
            Ok(response) => {
                tracing::debug!(
                    provider = provider.name(),
                    model = %response.model,
                    latency_ms = response.latency_ms,
                    tokens = response.token_usage.total_tokens,
                    "model replied"
                );
                return Ok(response);
            }
            Err(e) => {
                if let Some(provider_error) = e.downcast_ref::<ProviderError>() {
                    if provider_error.is_permanent() {
                        return Err(e);
                    }
                    if let Some(ms) = provider_error.retry_after_ms() {
                        retry_delay = Duration::from_millis(ms).min(MAX_RETRY_DELAY);
                    }
                }
                tracing::warn!(
                    provider = provider.name(),
                    attempt = attempt + 1,
                    "request failed: {e:#}"
                );
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("unknown error")))
}

#[cfg(test)]
pub(crate) mod testing {
    //! A scripted provider for exercising retry, audit and generation loops.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::ProviderError;
    use crate::traits::{GenerateRequest, GenerateResponse, LlmProvider, ModelInfo, TokenUsage};

    pub(crate) enum Step {
        Reply(String),
        Fail(ProviderError),
    }

    /// Replays queued steps; replies with an empty string once exhausted.
    pub(crate) struct ScriptedProvider {
        steps: Mutex<VecDeque<Step>>,
        pub(crate) requests: Mutex<Vec<GenerateRequest>>,
    }

    impl ScriptedProvider {
        pub(crate) fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn replies<I: IntoIterator<Item = S>, S: Into<String>>(replies: I) -> Self {
            Self::new(replies.into_iter().map(|r| Step::Reply(r.into())).collect())
        }

        pub(crate) fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
            self.requests.lock().unwrap().push(request.clone());
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Fail(e)) => Err(e.into()),
                Some(Step::Reply(content)) => Ok(GenerateResponse {
                    content,
                    model: request.model.clone(),
                    token_usage: TokenUsage {
                        prompt_tokens: 10,
                        completion_tokens: 5,
                        total_tokens: 15,
                    },
                    latency_ms: 1,
                }),
                None => Ok(GenerateResponse {
                    content: String::new(),
                    model: request.model.clone(),
                    token_usage: TokenUsage::default(),
                    latency_ms: 1,
                }),
            }
        }

        fn available_models(&self) -> Vec<ModelInfo> {
            vec![]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{ScriptedProvider, Step};
    use super::*;

    fn request() -> GenerateRequest {
        GenerateRequest {
            model: "test-model".into(),
            prompt: "prompt".into(),
            system_prompt: None,
            max_tokens: 100,
            temperature: 0.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_rate_limited_requests() {
        let provider = ScriptedProvider::new(vec![
            Step::Fail(ProviderError::RateLimited { retry_after_ms: 500 }),
            Step::Fail(ProviderError::NetworkError("reset".into())),
            Step::Reply("ok".into()),
        ]);
        let response = generate_with_retry(&provider, &request(), &RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_retry_authentication_failure() {
        let provider = ScriptedProvider::new(vec![
            Step::Fail(ProviderError::AuthenticationFailed("bad key".into())),
            Step::Reply("never".into()),
        ]);
        let err = generate_with_retry(&provider, &request(), &RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("authentication"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let provider = ScriptedProvider::new(
            (0..5).map(|_| Step::Fail(ProviderError::Timeout(30))).collect(),
        );
        let policy = RetryPolicy {
            max_retries: 2,
            ..Default::default()
        };
        let err = generate_with_retry(&provider, &request(), &policy)
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<ProviderError>().is_some());
        assert_eq!(provider.call_count(), 3);
    }
}
