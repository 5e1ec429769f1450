//! Retrying, order-preserving embedding client.

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use repoqa_llm::retry::with_retry;
use repoqa_llm::{LlmError, LlmProvider, RetryPolicy};

const DEFAULT_MAX_PARALLEL: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Network, rate-limit or timeout failure that outlived the retry policy.
    #[error("embedding service temporarily unavailable: {0}")]
    Transient(#[source] LlmError),

    /// Auth or configuration failure; never retried.
    #[error("embedding failed: {0}")]
    Fatal(#[source] LlmError),
}

impl From<LlmError> for EmbedError {
    fn from(e: LlmError) -> Self {
        if e.is_transient() {
            Self::Transient(e)
        } else {
            Self::Fatal(e)
        }
    }
}

pub struct EmbeddingClient<P: LlmProvider> {
    provider: Arc<P>,
    retry: RetryPolicy,
    max_parallel: usize,
}

impl<P: LlmProvider> EmbeddingClient<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, retry: RetryPolicy) -> Self {
        Self {
            provider,
            retry,
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }

    /// Cap on in-flight requests during `embed_many`. Values below 1 are treated as 1.
    #[must_use]
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// # Errors
    ///
    /// Returns `EmbedError::Transient` once retries are exhausted, or
    /// `EmbedError::Fatal` immediately for non-retryable failures.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let vector = with_retry(&self.retry, "embed", || self.provider.embed(text)).await?;
        Ok(vector)
    }

    /// Embed every text, at most `max_parallel` at a time, preserving input order.
    ///
    /// # Errors
    ///
    /// Fails on the first text whose embedding fails.
    pub async fn embed_many<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(count = texts.len(), max_parallel = self.max_parallel, "embedding batch");
        futures::stream::iter(texts.iter().map(|t| self.embed(t.as_ref())))
            .buffered(self.max_parallel)
            .try_collect()
            .await
    }
}
