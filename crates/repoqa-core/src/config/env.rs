use std::path::PathBuf;

use super::{Config, RetrievalMode, Secret};

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("REPOQA_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("REPOQA_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("REPOQA_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("REPOQA_LLM_TEMPERATURE") {
            if let Ok(t) = v.parse::<f32>() {
                self.llm.temperature = t;
            } else {
                tracing::warn!("ignoring invalid REPOQA_LLM_TEMPERATURE value: {v}");
            }
        }
        if let Ok(v) = std::env::var("REPOQA_LLM_MAX_TOKENS") {
            if let Ok(n) = v.parse::<u32>() {
                self.llm.max_tokens = n;
            } else {
                tracing::warn!("ignoring invalid REPOQA_LLM_MAX_TOKENS value: {v}");
            }
        }
        if let Ok(v) = std::env::var("REPOQA_CHUNK_SIZE") {
            if let Ok(n) = v.parse::<usize>() {
                self.chunking.chunk_size = n;
            } else {
                tracing::warn!("ignoring invalid REPOQA_CHUNK_SIZE value: {v}");
            }
        }
        if let Ok(v) = std::env::var("REPOQA_CHUNK_OVERLAP") {
            if let Ok(n) = v.parse::<usize>() {
                self.chunking.overlap = n;
            } else {
                tracing::warn!("ignoring invalid REPOQA_CHUNK_OVERLAP value: {v}");
            }
        }
        if let Ok(v) = std::env::var("REPOQA_RETRIEVAL_K") {
            if let Ok(k) = v.parse::<usize>() {
                self.retrieval.k = k;
            } else {
                tracing::warn!("ignoring invalid REPOQA_RETRIEVAL_K value: {v}");
            }
        }
        if let Ok(v) = std::env::var("REPOQA_RETRIEVAL_MODE") {
            match v.parse::<RetrievalMode>() {
                Ok(mode) => self.retrieval.mode = mode,
                Err(e) => tracing::warn!("ignoring REPOQA_RETRIEVAL_MODE: {e}"),
            }
        }
        if let Ok(v) = std::env::var("REPOQA_MMR_LAMBDA") {
            if let Ok(lambda) = v.parse::<f32>() {
                self.retrieval.mmr_lambda = lambda;
            } else {
                tracing::warn!("ignoring invalid REPOQA_MMR_LAMBDA value: {v}");
            }
        }
        if let Ok(v) = std::env::var("REPOQA_INDEX_SNAPSHOT") {
            self.index.snapshot_path = (!v.trim().is_empty()).then(|| PathBuf::from(v));
        }
    }

    /// Read credentials from the environment.
    pub fn resolve_secrets(&mut self) {
        if let Ok(v) = std::env::var("REPOQA_OPENAI_API_KEY")
            && !v.trim().is_empty()
        {
            self.secrets.openai_api_key = Some(Secret::new(v));
        }
    }
}
