//! OpenAI-compatible LLM client
//!
//! Provides an async HTTP client with:
//! - Chat completions (optionally constrained to a JSON object)
//! - Batched embeddings with requested output dimensions
//! - Rate limit handling with exponential backoff

use std::future::Future;
use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::types::{
    ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse, LlmResponse, Message,
};

/// Maximum number of attempts for rate-limited requests
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (in milliseconds)
const BACKOFF_BASE_MS: u64 = 1000;

/// Wait used when a 429 response carries no retry hint
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Thread-safe client for chat completion and embedding requests
#[derive(Clone)]
pub struct LlmClient {
    http_client: HttpClient,
    config: LlmConfig,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("base_url", &self.base_url)
            .field("chat_model", &self.config.chat_model)
            .field("embedding_model", &self.config.embedding_model)
            .finish()
    }
}

/// Builder for creating an LlmClient
#[derive(Default)]
pub struct LlmClientBuilder {
    config: Option<LlmConfig>,
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

impl LlmClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: LlmConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Override the configured base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn build(self) -> Result<LlmClient> {
        let config = self.config.unwrap_or_default();
        let api_key = self
            .api_key
            .ok_or_else(|| Error::LLMError("API key is required".to_string()))?;

        let timeout_secs = self.timeout_secs.unwrap_or(config.timeout_secs);

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        let base_url = self
            .base_url
            .unwrap_or_else(|| config.base_url.clone())
            .trim_end_matches('/')
            .to_string();

        Ok(LlmClient {
            http_client,
            config,
            api_key,
            base_url,
        })
    }
}

impl LlmClient {
    pub fn new(config: LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        LlmClientBuilder::new()
            .config(config)
            .api_key(api_key)
            .build()
    }

    pub fn builder() -> LlmClientBuilder {
        LlmClientBuilder::new()
    }

    /// Create a client from configuration, reading the API key from the environment
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .resolved_api_key()
            .map_err(|e| Error::ConfigError(e.to_string()))?
            .ok_or_else(|| {
                Error::LLMError("No API key found in INNERGRAPH_API_KEY or OPENAI_API_KEY".into())
            })?;

        Self::new(config.clone(), api_key)
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Chat completion with the configured temperature and token limit
    pub async fn complete(&self, messages: Vec<Message>, model: &str) -> Result<LlmResponse> {
        let request = ChatRequest::new(model, messages)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        self.execute_chat(&request).await
    }

    /// Chat completion constrained to a single JSON object
    pub async fn complete_json(&self, messages: Vec<Message>, model: &str) -> Result<LlmResponse> {
        let request = ChatRequest::new(model, messages)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens)
            .with_json_output();

        self.execute_chat(&request).await
    }

    /// Embed a batch of texts with the configured embedding model
    ///
    /// Returns one vector per input, in input order.
    pub async fn embed_batch(
        &self,
        texts: Vec<String>,
        dimensions: Option<usize>,
    ) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let expected = texts.len();
        let mut request = EmbeddingRequest::new(&self.config.embedding_model, texts);
        if let Some(dimensions) = dimensions {
            request = request.with_dimensions(dimensions);
        }

        debug!(
            model = %request.model,
            inputs = expected,
            "Sending embedding request"
        );

        let response: EmbeddingResponse = self
            .with_retry(|| self.post("embeddings", &request))
            .await?;
        let vectors = response.into_vectors();

        if vectors.len() != expected {
            return Err(Error::LLMError(format!(
                "Embedding response returned {} vectors for {} inputs",
                vectors.len(),
                expected
            )));
        }

        Ok(vectors)
    }

    async fn execute_chat(&self, request: &ChatRequest) -> Result<LlmResponse> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat completion request"
        );

        let response: ChatResponse = self
            .with_retry(|| self.post("chat/completions", request))
            .await?;

        LlmResponse::from_chat_response(response)
            .ok_or_else(|| Error::LLMError("Empty response from API".to_string()))
    }

    /// Retry `call` on rate limiting with exponential backoff
    async fn with_retry<T, F, Fut>(&self, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match call().await {
                Err(Error::RateLimited(wait_secs)) if attempts < MAX_RETRY_ATTEMPTS => {
                    let backoff = calculate_backoff(attempts, wait_secs);
                    warn!(
                        attempt = attempts,
                        wait_ms = backoff,
                        "Rate limited, retrying after backoff"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                result => return result,
            }
        }
    }

    /// POST a JSON body to `{base_url}/{path}` and decode the JSON reply
    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| Error::LLMError(format!("Failed to parse response: {}", e)))
    }
}

/// Map a non-success HTTP status to an error
fn error_for_status(status: reqwest::StatusCode, body: &str) -> Error {
    error!(status = %status, body = %body, "API request failed");

    match status.as_u16() {
        401 => Error::LLMError("Invalid API key".to_string()),
        429 => Error::RateLimited(extract_retry_after(body).unwrap_or(DEFAULT_RETRY_AFTER_SECS)),
        400 => Error::LLMError(format!("Bad request: {}", body)),
        403 => Error::LLMError(format!("Forbidden: {}", body)),
        404 => Error::LLMError(format!(
            "Model not found or endpoint unavailable: {}",
            body
        )),
        500..=599 => Error::LLMError(format!("Server error ({}): {}", status, body)),
        _ => Error::LLMError(format!("HTTP error {}: {}", status, body)),
    }
}

/// Calculate backoff delay with jitter
fn calculate_backoff(attempt: u32, suggested_wait: u64) -> u64 {
    let base = BACKOFF_BASE_MS * 2u64.pow(attempt.saturating_sub(1));
    let suggested = suggested_wait * 1000;

    let delay = base.max(suggested);

    // Up to 10% jitter
    let jitter = delay / 10;
    delay + (rand_jitter() % jitter.max(1))
}

fn rand_jitter() -> u64 {
    use std::time::SystemTime;
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64 % 1000)
        .unwrap_or(0)
}

/// Extract a retry-after hint from an error body
fn extract_retry_after(body: &str) -> Option<u64> {
    let json = serde_json::from_str::<serde_json::Value>(body).ok()?;

    json.get("retry_after")
        .and_then(|v| v.as_u64())
        .or_else(|| {
            json.get("error")
                .and_then(|error| error.get("retry_after"))
                .and_then(|v| v.as_u64())
        })
}
