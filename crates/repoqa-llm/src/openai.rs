use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message, Role};

const PROVIDER: &str = "openai";

/// Generation options forwarded with every chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Client for any OpenAI-compatible `/chat/completions` + `/embeddings` API.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    options: GenerationOptions,
    embedding_model: Option<String>,
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("options", &self.options)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

impl OpenAiProvider {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        api_key: String,
        mut base_url: String,
        options: GenerationOptions,
        embedding_model: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, LlmError> {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self {
            client: crate::http::default_client(request_timeout)?,
            api_key,
            base_url,
            options,
            embedding_model,
        })
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<String, LlmError> {
        let response = self
            .client
            .post(format!("{}/{path}", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let retry_after = parse_retry_after(&response);
        let text = response.text().await.map_err(LlmError::Http)?;

        if status.is_success() {
            return Ok(text);
        }

        tracing::error!("OpenAI API error on /{path} {status}: {text}");
        Err(classify_status(status, retry_after))
    }
}

/// Parse the `Retry-After` header value as whole seconds.
fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    let val = response.headers().get("retry-after")?;
    let secs = val.to_str().ok()?.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(secs))
}

fn classify_status(status: reqwest::StatusCode, retry_after: Option<Duration>) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::Auth { provider: PROVIDER },
        429 => LlmError::RateLimited { retry_after },
        code @ (408 | 500..=599) => LlmError::Unavailable { status: code },
        code => LlmError::Api {
            provider: PROVIDER,
            status: code,
        },
    }
}

impl LlmProvider for OpenAiProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        let api_messages = convert_messages(messages);
        let body = ChatRequest {
            model: &self.options.model,
            messages: &api_messages,
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
        };

        let text = self.post("chat/completions", &body).await?;
        let resp: OpenAiChatResponse = serde_json::from_str(&text)?;

        if let Some(usage) = resp.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "OpenAI API usage"
            );
        }

        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse { provider: PROVIDER })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let model = self
            .embedding_model
            .as_deref()
            .ok_or(LlmError::EmbedUnsupported { provider: PROVIDER })?;

        let body = EmbeddingRequest { input: text, model };
        let text = self.post("embeddings", &body).await?;
        let resp: EmbeddingResponse = serde_json::from_str(&text)?;

        resp.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(LlmError::EmptyResponse { provider: PROVIDER })
    }

    fn supports_embeddings(&self) -> bool {
        self.embedding_model.is_some()
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        PROVIDER
    }
}

fn convert_messages(messages: &[Message]) -> Vec<ApiMessage<'_>> {
    messages
        .iter()
        .map(|m| ApiMessage {
            role: match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: &m.content,
        })
        .collect()
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage<'a>],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn options() -> GenerationOptions {
        GenerationOptions {
            model: "gpt-4-1106-preview".into(),
            temperature: 0.2,
            max_tokens: 256,
        }
    }

    fn provider(base_url: &str, embedding_model: Option<&str>) -> OpenAiProvider {
        OpenAiProvider::new(
            "sk-test-key".into(),
            base_url.into(),
            options(),
            embedding_model.map(str::to_owned),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn new_trims_trailing_slashes() {
        let p = provider("https://api.openai.com/v1//", None);
        assert_eq!(p.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn debug_redacts_api_key() {
        let p = provider("https://api.openai.com/v1", None);
        let dbg = format!("{p:?}");
        assert!(dbg.contains("<redacted>"));
        assert!(!dbg.contains("sk-test-key"));
    }

    #[test]
    fn supports_embeddings_requires_model() {
        assert!(!provider("http://x", None).supports_embeddings());
        assert!(provider("http://x", Some("text-embedding-3-small")).supports_embeddings());
    }

    #[test]
    fn status_classification() {
        use reqwest::StatusCode;
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, None),
            LlmError::Auth { .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(2))),
            LlmError::RateLimited {
                retry_after: Some(_)
            }
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, None),
            LlmError::Unavailable { status: 502 }
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, None),
            LlmError::Api { status: 400, .. }
        ));
    }

    #[tokio::test]
    async fn chat_sends_options_and_returns_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4-1106-preview",
                "max_tokens": 256
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "It adds numbers."}}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 4}
            })))
            .mount(&server)
            .await;

        let p = provider(&server.uri(), None);
        let answer = p.chat(&[Message::user("what does add do?")]).await.unwrap();
        assert_eq!(answer, "It adds numbers.");
    }

    #[tokio::test]
    async fn chat_without_choices_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let err = provider(&server.uri(), None)
            .chat(&[Message::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { .. }));
    }

    #[tokio::test]
    async fn chat_unauthorized_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = provider(&server.uri(), None)
            .chat(&[Message::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Auth { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn chat_rate_limited_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3"))
            .mount(&server)
            .await;

        let err = provider(&server.uri(), None)
            .chat(&[Message::user("hi")])
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn embed_returns_first_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(serde_json::json!({
                "model": "text-embedding-3-small",
                "input": "def add"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.25, -0.5, 1.0]}]
            })))
            .mount(&server)
            .await;

        let p = provider(&server.uri(), Some("text-embedding-3-small"));
        let v = p.embed("def add").await.unwrap();
        assert_eq!(v, vec![0.25, -0.5, 1.0]);
    }

    #[tokio::test]
    async fn embed_without_model_is_unsupported() {
        let err = provider("http://127.0.0.1:1", None)
            .embed("text")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmbedUnsupported { .. }));
    }

    #[tokio::test]
    async fn embed_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = provider(&server.uri(), Some("m"))
            .embed("text")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Unavailable { status: 503 }));
    }
}
