mod env;
mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use std::path::Path;

use anyhow::Context;

use crate::error::QaError;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to sensible defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        if config
            .index
            .snapshot_path
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            config.index.snapshot_path = None;
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Check value ranges before any component is built.
    ///
    /// # Errors
    ///
    /// Returns `QaError::InvalidConfig` naming the first offending option.
    pub fn validate(&self) -> Result<(), QaError> {
        self.chunking
            .splitter_config()
            .validate()
            .map_err(|e| QaError::InvalidConfig(e.to_string()))?;

        let checks: [(bool, &str); 11] = [
            (self.retrieval.k >= 1, "retrieval.k must be at least 1"),
            (
                (0.0..=1.0).contains(&self.retrieval.mmr_lambda),
                "retrieval.mmr_lambda must be within [0, 1]",
            ),
            (
                self.retrieval.fetch_k >= self.retrieval.k,
                "retrieval.fetch_k must be at least retrieval.k",
            ),
            (
                (0.0..=2.0).contains(&self.llm.temperature),
                "llm.temperature must be within [0, 2]",
            ),
            (self.llm.max_tokens >= 1, "llm.max_tokens must be at least 1"),
            (self.retry.max_attempts >= 1, "retry.max_attempts must be at least 1"),
            (
                self.timeouts.llm_seconds >= 1,
                "timeouts.llm_seconds must be at least 1",
            ),
            (
                self.timeouts.embedding_seconds >= 1,
                "timeouts.embedding_seconds must be at least 1",
            ),
            (
                self.embedding.max_parallel >= 1,
                "embedding.max_parallel must be at least 1",
            ),
            (!self.llm.model.trim().is_empty(), "llm.model must not be empty"),
            (
                !self.llm.embedding_model.trim().is_empty(),
                "llm.embedding_model must not be empty",
            ),
        ];

        match checks.into_iter().find(|(ok, _)| !ok) {
            Some((_, msg)) => Err(QaError::InvalidConfig(msg.into())),
            None => Ok(()),
        }
    }
}
