//! Answer generator trait

/// Result type for answer generation
pub type GeneratorResult<T> = Result<T, GeneratorError>;

#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("generator produced an empty answer")]
    EmptyAnswer,

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// Turns query text into response text.
///
/// No latency or determinism contract; implementations bound their own
/// latency. The provider retries the same query on the next poll cycle when
/// generation fails.
#[async_trait::async_trait]
pub trait AnswerGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, query_text: &str) -> GeneratorResult<String>;
}
