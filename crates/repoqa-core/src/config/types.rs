use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use repoqa_llm::RetryPolicy;
use repoqa_memory::SearchMode;
use repoqa_memory::document::SplitterConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

/// String wrapper that never prints its contents.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Credentials resolved from the environment, never from the config file.
#[derive(Debug, Default)]
pub struct ResolvedSecrets {
    pub openai_api_key: Option<Secret>,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_model() -> String {
    "gpt-4-1106-preview".into()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_llm_timeout")]
    pub llm_seconds: u64,
    #[serde(default = "default_embedding_timeout")]
    pub embedding_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            llm_seconds: default_llm_timeout(),
            embedding_seconds: default_embedding_timeout(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8000
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Retry policy with a per-attempt timeout of `timeout_secs`.
    #[must_use]
    pub fn policy(&self, timeout_secs: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            timeout: None,
        }
        .with_timeout(Duration::from_secs(timeout_secs))
    }
}

fn default_chunk_size() -> usize {
    2000
}

fn default_overlap() -> usize {
    200
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

impl ChunkingConfig {
    #[must_use]
    pub fn splitter_config(&self) -> SplitterConfig {
        SplitterConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.overlap,
        }
    }
}

/// Retrieval ranking strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Similarity,
    #[default]
    Diverse,
}

impl std::str::FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "similarity" => Ok(Self::Similarity),
            "diverse" | "mmr" => Ok(Self::Diverse),
            other => Err(format!("unknown retrieval mode: {other}")),
        }
    }
}

fn default_k() -> usize {
    8
}

fn default_mmr_lambda() -> f32 {
    repoqa_memory::vector_index::DEFAULT_MMR_LAMBDA
}

fn default_fetch_k() -> usize {
    repoqa_memory::vector_index::DEFAULT_FETCH_K
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub mode: RetrievalMode,
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f32,
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,
    /// Rewrite follow-up questions into standalone ones before retrieval.
    #[serde(default)]
    pub condense_question: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            mode: RetrievalMode::default(),
            mmr_lambda: default_mmr_lambda(),
            fetch_k: default_fetch_k(),
            condense_question: false,
        }
    }
}

impl RetrievalConfig {
    #[must_use]
    pub fn search_mode(&self) -> SearchMode {
        match self.mode {
            RetrievalMode::Similarity => SearchMode::Similarity,
            RetrievalMode::Diverse => SearchMode::Diverse {
                lambda: self.mmr_lambda,
                fetch_k: self.fetch_k,
            },
        }
    }
}

fn default_fallback_turns() -> usize {
    4
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct MemoryConfig {
    /// Raw turns used as context when the summary is stale.
    #[serde(default = "default_fallback_turns")]
    pub fallback_turns: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            fallback_turns: default_fallback_turns(),
        }
    }
}

fn default_max_parallel() -> usize {
    4
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec!["py".into()]
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorpusConfig {
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IndexConfig {
    /// JSON snapshot loaded at startup when present, written after a fresh build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
}
