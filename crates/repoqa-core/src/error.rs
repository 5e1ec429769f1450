use repoqa_llm::LlmError;
use repoqa_memory::document::DocumentError;
use repoqa_memory::{EmbedError, IndexError};

#[derive(Debug, thiserror::Error)]
pub enum QaError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("retrieval failed: {0}")]
    Index(#[from] IndexError),

    #[error("answer generation failed: {0}")]
    Generation(#[source] LlmError),

    #[error("ingestion failed: {0}")]
    Document(#[from] DocumentError),

    #[error("corpus error: {0}")]
    Corpus(String),
}

impl QaError {
    /// Whether retrying the same question later could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Embedding(EmbedError::Transient(_)) => true,
            Self::Generation(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_error_display() {
        let err = QaError::Generation(LlmError::EmptyResponse { provider: "openai" });
        assert!(err.to_string().starts_with("answer generation failed"));
    }

    #[test]
    fn transient_classification() {
        assert!(QaError::Embedding(EmbedError::Transient(LlmError::Timeout(
            std::time::Duration::from_secs(1)
        )))
        .is_transient());
        assert!(QaError::Generation(LlmError::Unavailable { status: 503 }).is_transient());
        assert!(!QaError::Generation(LlmError::Auth { provider: "openai" }).is_transient());
        assert!(!QaError::InvalidConfig("k".into()).is_transient());
    }
}
