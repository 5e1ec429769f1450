//! Shared HTTP client construction for consistent timeout and TLS configuration.

use std::time::Duration;

use crate::error::LlmError;

/// Create an HTTP client with the standard repoqa configuration.
///
/// Config: 30s connect timeout, `request_timeout` per request, rustls TLS,
/// `repoqa/{version}` user-agent, redirect limit 10.
///
/// # Errors
///
/// Returns `LlmError::Http` if the TLS backend cannot be initialized.
pub fn default_client(request_timeout: Duration) -> Result<reqwest::Client, LlmError> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(request_timeout)
        .user_agent(concat!("repoqa/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()?;
    Ok(client)
}
