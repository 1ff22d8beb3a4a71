//! Error types for the linking core and for language-model providers.
//!
//! `ProviderError` lives here rather than in `quizlink-providers` so the
//! audit and generation loops can downcast and classify failures for retry
//! decisions without string matching.

use thiserror::Error;

use crate::model::RecordId;

/// Errors raised while recomputing a chapter's derived links.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// A concept record is missing its term or definition.
    #[error("malformed concept '{concept_id}' in chapter '{chapter_id}': missing {field}")]
    MalformedConcept {
        chapter_id: String,
        concept_id: String,
        field: &'static str,
    },

    /// A question record is missing its text or choices.
    #[error("malformed question '{question_id}' in chapter '{chapter_id}': missing {field}")]
    MalformedQuestion {
        chapter_id: String,
        question_id: RecordId,
        field: &'static str,
    },

    /// A correction names a concept that does not exist in the chapter.
    #[error("question '{question_id}' references unknown concept '{concept_id}' in chapter '{chapter_id}'")]
    UnknownConceptReference {
        chapter_id: String,
        question_id: RecordId,
        concept_id: String,
    },

    /// A correction names a question that does not exist in the chapter.
    #[error("question '{question_id}' not found in chapter '{chapter_id}'")]
    UnknownQuestion {
        chapter_id: String,
        question_id: RecordId,
    },
}

/// Errors that can occur when interacting with an LLM provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_)
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}
