//! Wiring of providers, index and session from a validated [`Config`].

use std::sync::Arc;
use std::time::Duration;

use repoqa_llm::LlmProvider;
use repoqa_llm::openai::{GenerationOptions, OpenAiProvider};
use repoqa_memory::document::{IngestionPipeline, TextSplitter};
use repoqa_memory::{EmbeddingClient, VectorIndex};

use crate::config::Config;
use crate::corpus::CorpusSource;
use crate::error::QaError;
use crate::qa::{QaSession, SessionOptions};

/// # Errors
///
/// Returns `QaError::InvalidConfig` if no API key was resolved or the HTTP
/// client cannot be built.
pub fn build_provider(config: &Config) -> Result<OpenAiProvider, QaError> {
    let api_key = config
        .secrets
        .openai_api_key
        .as_ref()
        .ok_or_else(|| QaError::InvalidConfig("REPOQA_OPENAI_API_KEY is not set".into()))?;

    let request_timeout = Duration::from_secs(
        config
            .timeouts
            .llm_seconds
            .max(config.timeouts.embedding_seconds),
    );

    OpenAiProvider::new(
        api_key.expose().to_owned(),
        config.llm.base_url.clone(),
        GenerationOptions {
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
        },
        Some(config.llm.embedding_model.clone()),
        request_timeout,
    )
    .map_err(|e| QaError::InvalidConfig(format!("failed to build LLM client: {e}")))
}

#[must_use]
pub fn session_options(config: &Config) -> SessionOptions {
    SessionOptions {
        k: config.retrieval.k,
        mode: config.retrieval.search_mode(),
        condense_question: config.retrieval.condense_question,
        fallback_turns: config.memory.fallback_turns,
    }
}

#[must_use]
pub fn build_session<P: LlmProvider>(
    provider: Arc<P>,
    index: Arc<VectorIndex>,
    config: &Config,
) -> QaSession<P> {
    QaSession::new(provider, index, session_options(config)).with_retry(
        config.retry.policy(config.timeouts.llm_seconds),
        config.retry.policy(config.timeouts.embedding_seconds),
    )
}

/// # Errors
///
/// Returns `QaError::Document` if the chunking parameters are invalid.
pub fn build_pipeline<P: LlmProvider>(
    provider: Arc<P>,
    index: Arc<VectorIndex>,
    config: &Config,
) -> Result<IngestionPipeline<P>, QaError> {
    let splitter = TextSplitter::new(config.chunking.splitter_config())?;
    let embedder = EmbeddingClient::new(
        provider,
        config.retry.policy(config.timeouts.embedding_seconds),
    )
    .with_max_parallel(config.embedding.max_parallel);
    Ok(IngestionPipeline::new(splitter, embedder, index))
}

/// Load the index snapshot if one is configured and present, otherwise
/// ingest `corpus` and write the snapshot for next time.
///
/// # Errors
///
/// Returns an error if the snapshot is unreadable, the corpus cannot be
/// listed, or ingestion fails.
pub async fn load_or_build_index<P, C>(
    provider: Arc<P>,
    corpus: &C,
    config: &Config,
) -> Result<Arc<VectorIndex>, QaError>
where
    P: LlmProvider,
    C: CorpusSource + ?Sized,
{
    if let Some(path) = config.index.snapshot_path.as_deref()
        && path.exists()
    {
        return Ok(Arc::new(VectorIndex::load(path)?));
    }

    let index = Arc::new(VectorIndex::new());
    let pipeline = build_pipeline(provider, Arc::clone(&index), config)?;
    let documents = corpus.list_documents()?;
    pipeline.ingest_all(&documents).await?;

    if let Some(path) = config.index.snapshot_path.as_deref()
        && let Err(e) = index.save(path)
    {
        tracing::warn!(path = %path.display(), "failed to write index snapshot: {e}");
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use repoqa_llm::mock::MockProvider;
    use repoqa_memory::document::Document;

    use super::*;
    use crate::config::{RetrievalMode, Secret};

    #[test]
    fn build_provider_requires_api_key() {
        let config = Config::default();
        assert!(matches!(
            build_provider(&config),
            Err(QaError::InvalidConfig(msg)) if msg.contains("REPOQA_OPENAI_API_KEY")
        ));
    }

    #[test]
    fn build_provider_uses_config() {
        let mut config = Config::default();
        config.secrets.openai_api_key = Some(Secret::new("sk-test"));
        config.llm.model = "gpt-4o".into();
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.options().model, "gpt-4o");
        assert_eq!(provider.options().max_tokens, 1024);
    }

    #[test]
    fn session_options_follow_config() {
        let mut config = Config::default();
        config.retrieval.k = 3;
        config.retrieval.mode = RetrievalMode::Similarity;
        config.retrieval.condense_question = true;
        let options = session_options(&config);
        assert_eq!(options.k, 3);
        assert_eq!(options.mode, repoqa_memory::SearchMode::Similarity);
        assert!(options.condense_question);
        assert_eq!(options.fallback_turns, 4);
    }

    #[test]
    fn build_pipeline_rejects_bad_chunking() {
        let mut config = Config::default();
        config.chunking.overlap = config.chunking.chunk_size;
        let result = build_pipeline(
            Arc::new(MockProvider::default()),
            Arc::new(VectorIndex::new()),
            &config,
        );
        assert!(matches!(result, Err(QaError::Document(_))));
    }

    #[tokio::test]
    async fn builds_then_reuses_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.index.snapshot_path = Some(dir.path().join("index.json"));
        let corpus = vec![
            Document::new("a.py", "def a():\n    return 1\n"),
            Document::new("b.py", "def b():\n    return 2\n"),
        ];

        let provider = MockProvider::default().with_embedding(vec![0.5, 0.5]);
        let built = load_or_build_index(Arc::new(provider.clone()), &corpus, &config)
            .await
            .unwrap();
        assert_eq!(built.len(), 2);
        assert_eq!(provider.embed_calls(), 2);
        assert!(dir.path().join("index.json").exists());

        let loaded = load_or_build_index(Arc::new(provider.clone()), &corpus, &config)
            .await
            .unwrap();
        assert_eq!(loaded.entries(), built.entries());
        assert_eq!(provider.embed_calls(), 2);
    }

    #[tokio::test]
    async fn builds_without_snapshot_path() {
        let config = Config::default();
        let corpus = vec![Document::new("a.py", "x = 1\n")];
        let index = load_or_build_index(Arc::new(MockProvider::default()), &corpus, &config)
            .await
            .unwrap();
        assert_eq!(index.len(), 1);
    }
}
