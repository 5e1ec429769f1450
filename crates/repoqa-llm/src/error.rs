use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("provider unavailable (status {status})")]
    Unavailable { status: u16 },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("authentication rejected by {provider}")]
    Auth { provider: &'static str },

    #[error("{provider} request failed (status {status})")]
    Api { provider: &'static str, status: u16 },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("embedding not supported by {provider}")]
    EmbedUnsupported { provider: &'static str },

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Whether the failure is worth retrying: network trouble, rate limits,
    /// server-side outages and timeouts. Everything else is fatal.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::RateLimited { .. } | Self::Unavailable { .. } | Self::Timeout(_) => true,
            Self::Json(_)
            | Self::Auth { .. }
            | Self::Api { .. }
            | Self::EmptyResponse { .. }
            | Self::EmbedUnsupported { .. }
            | Self::Other(_) => false,
        }
    }

    /// Server-provided hint for how long to wait before retrying.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
