//! OpenAI-compatible provider implementation
//!
//! This module implements [`LLMProvider`] and [`EmbeddingProvider`] against the
//! OpenAI chat-completions and embeddings endpoints. Any service speaking the
//! same wire format (DashScope compatible mode, vLLM, llama.cpp server, ...)
//! works through a custom `api_base`.
//! See: https://platform.openai.com/docs/api-reference/chat
//!
//! # Examples
//!
//! ## Basic usage with environment variable
//!
//! ```no_run
//! use agent_llm::{CompletionRequest, Message, LLMProvider};
//! use agent_llm::providers::OpenAIProvider;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Create provider from OPENAI_API_KEY environment variable
//!     let provider = OpenAIProvider::from_env()?;
//!
//!     let request = CompletionRequest::builder("gpt-4o-mini")
//!         .add_message(Message::user("Hello!"))
//!         .temperature(0.2)
//!         .build();
//!
//!     let response = provider.complete(request).await?;
//!     println!("{}", response.text());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Streaming tokens
//!
//! ```no_run
//! use agent_llm::{CompletionRequest, Message, LLMProvider};
//! use agent_llm::providers::{OpenAIConfig, OpenAIProvider};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OpenAIConfig::new("not-needed")
//!         .with_api_base("http://localhost:8000/v1")
//!         .with_requests_per_minute(30);
//!     let provider = OpenAIProvider::with_config(config)?;
//!
//!     let request = CompletionRequest::builder("qwen2.5")
//!         .add_message(Message::user("Summarise today's market"))
//!         .build();
//!
//!     let mut tokens = provider.stream(request).await?;
//!     while let Some(token) = tokens.next().await {
//!         print!("{}", token?);
//!     }
//!     Ok(())
//! }
//! ```

use crate::{
    CompletionRequest, CompletionResponse, EmbeddingProvider, LLMError, LLMProvider, Message,
    Result, RetryPolicy, StopReason, TokenStream, TokenUsage,
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;
type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Configuration for OpenAI provider
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// API key for authentication
    pub api_key: String,

    /// Base URL for the OpenAI API (default: "https://api.openai.com/v1")
    pub api_base: String,

    /// Request timeout in seconds (default: 120)
    pub timeout_secs: u64,

    /// Model used by the embeddings endpoint
    pub embedding_model: String,

    /// Client-side request budget per minute
    pub requests_per_minute: u32,

    /// Retry policy for transient failures
    pub retry: RetryPolicy,

    /// Optional list of supported chat models
    /// If None, any model string is accepted
    pub supported_models: Option<Vec<String>>,
}

impl OpenAIConfig {
    /// Create a new config with the given API key and default settings
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Create config from environment variables
    ///
    /// Reads the API key from `OPENAI_API_KEY`. Optionally reads
    /// `OPENAI_API_BASE`, `OPENAI_EMBEDDING_MODEL` and
    /// `OPENAI_REQUESTS_PER_MINUTE`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            LLMError::ConfigurationError("OPENAI_API_KEY environment variable not set".to_string())
        })?;

        let mut config = Self::new(api_key);

        if let Ok(api_base) = std::env::var("OPENAI_API_BASE") {
            config.api_base = api_base;
        }
        if let Ok(model) = std::env::var("OPENAI_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Ok(rpm) = std::env::var("OPENAI_REQUESTS_PER_MINUTE") {
            config.requests_per_minute = rpm.parse().map_err(|_| {
                LLMError::ConfigurationError(format!(
                    "OPENAI_REQUESTS_PER_MINUTE must be a positive integer, got '{rpm}'"
                ))
            })?;
        }

        Ok(config)
    }

    /// Set custom API base URL
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Set request timeout in seconds
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set the embeddings model
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Set the client-side request budget
    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.requests_per_minute = rpm;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set supported models list
    pub fn with_supported_models(mut self, models: Vec<String>) -> Self {
        self.supported_models = Some(models);
        self
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: DEFAULT_OPENAI_API_BASE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            retry: RetryPolicy::default(),
            supported_models: None,
        }
    }
}

/// OpenAI-compatible provider
///
/// Every HTTP round trip waits on a shared rate limiter and runs under the
/// configured [`RetryPolicy`].
pub struct OpenAIProvider {
    client: Client,
    config: OpenAIConfig,
    rate_limiter: SharedRateLimiter,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider with custom configuration
    pub fn with_config(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let quota = Quota::per_minute(
            NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN),
        );
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            client,
            config,
            rate_limiter,
        })
    }

    /// Create a new OpenAI provider with API key and default settings
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(OpenAIConfig::new(api_key))
    }

    /// Create a provider from environment variables
    pub fn from_env() -> Result<Self> {
        Self::with_config(OpenAIConfig::from_env()?)
    }

    /// Get the current configuration
    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    /// Validate model name against supported models list (if configured)
    fn validate_model(&self, model: &str) -> Result<()> {
        if let Some(supported) = &self.config.supported_models {
            if !supported.iter().any(|m| m == model) {
                return Err(LLMError::InvalidRequest(format!(
                    "Model '{model}' is not in the supported models list: {supported:?}"
                )));
            }
        }
        Ok(())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    /// One rate-limited POST; non-2xx statuses are mapped to typed errors
    async fn post<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
        model: &str,
    ) -> Result<reqwest::Response> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .post(self.endpoint(path))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await?;
        Err(map_status_error(status.as_u16(), error_text, model))
    }

    async fn complete_once(&self, body: &ChatRequest) -> Result<OpenAIResponse> {
        let response = self.post("chat/completions", body, &body.model).await?;
        read_json(response).await
    }

    async fn embed_once(&self, body: &EmbeddingRequest<'_>) -> Result<EmbeddingResponse> {
        let response = self.post("embeddings", body, body.model).await?;
        read_json(response).await
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    #[instrument(skip(self, request), fields(model = %request.model, api_base = %self.config.api_base))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        debug!("Sending request to OpenAI API at {}", self.config.api_base);

        self.validate_model(&request.model)?;
        let body = build_chat_request(request, false);

        let response = self
            .config
            .retry
            .execute("chat_completion", || self.complete_once(&body))
            .await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::UnexpectedResponse("No choices in response".to_string()))?;

        let usage = response.usage.unwrap_or_default();
        let finish_reason = choice.finish_reason.unwrap_or_default();
        debug!(
            "Received response - stop_reason: {}, tokens: {}/{}",
            finish_reason, usage.prompt_tokens, usage.completion_tokens
        );

        Ok(CompletionResponse {
            message: Message::assistant(choice.message.content.unwrap_or_default()),
            stop_reason: map_stop_reason(&finish_reason),
            usage: TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
        })
    }

    #[instrument(skip(self, request), fields(model = %request.model, api_base = %self.config.api_base))]
    async fn stream(&self, request: CompletionRequest) -> Result<TokenStream> {
        debug!("Opening completion stream");

        self.validate_model(&request.model)?;
        let body = build_chat_request(request, true);

        let response = self
            .config
            .retry
            .execute("chat_stream", || {
                self.post("chat/completions", &body, &body.model)
            })
            .await?;

        Ok(sse_token_stream(response.bytes_stream()))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    #[instrument(skip(self, texts), fields(count = texts.len(), model = %self.config.embedding_model))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: texts,
        };

        let response = self
            .config
            .retry
            .execute("embeddings", || self.embed_once(&body))
            .await?;

        let mut data = response.data;
        if data.len() != texts.len() {
            return Err(LLMError::UnexpectedResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                data.len()
            )));
        }
        data.sort_by_key(|item| item.index);

        Ok(data.into_iter().map(|item| item.embedding).collect())
    }

    fn embedding_model(&self) -> &str {
        &self.config.embedding_model
    }
}

// ============================================================================
// OpenAI-specific request/response types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

#[derive(Debug, Default, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

// ============================================================================
// Conversion functions
// ============================================================================

/// The system prompt travels as the first message of the array
fn build_chat_request(request: CompletionRequest, stream: bool) -> ChatRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = request.system {
        messages.push(Message::system(system));
    }
    messages.extend(request.messages);

    ChatRequest {
        model: request.model,
        messages,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        top_p: request.top_p,
        stop: request.stop_sequences,
        stream,
    }
}

fn map_status_error(status: u16, error_text: String, model: &str) -> LLMError {
    match status {
        401 => LLMError::AuthenticationFailed,
        429 => LLMError::RateLimitExceeded(error_text),
        400 => LLMError::InvalidRequest(error_text),
        404 => LLMError::ModelNotFound(model.to_string()),
        s if s >= 500 => LLMError::RequestFailed(format!("HTTP {s}: {error_text}")),
        s => LLMError::InvalidRequest(format!("HTTP {s}: {error_text}")),
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    response
        .json()
        .await
        .map_err(|e| LLMError::UnexpectedResponse(format!("Failed to parse response: {e}")))
}

/// Map OpenAI stop reason to our format
fn map_stop_reason(reason: &str) -> StopReason {
    match reason {
        "stop" | "" => StopReason::EndTurn,
        "length" => StopReason::MaxTokens,
        "content_filter" => {
            debug!("Content filtered by provider safety systems");
            StopReason::ContentFilter
        }
        _ => {
            debug!("Unknown stop reason: {}", reason);
            StopReason::EndTurn
        }
    }
}

// ============================================================================
// Server-sent events
// ============================================================================

#[derive(Debug, PartialEq, Eq)]
enum SseEvent {
    Token(String),
    Done,
    Error(String),
    Skip,
}

fn parse_sse_line(line: &str) -> SseEvent {
    let Some(data) = line.strip_prefix("data:") else {
        // comments, `event:`/`id:` fields and blank separators
        return SseEvent::Skip;
    };
    let data = data.trim();

    if data.is_empty() {
        return SseEvent::Skip;
    }
    if data == "[DONE]" {
        return SseEvent::Done;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => {
            if let Some(error) = chunk.error {
                return SseEvent::Error(error.message);
            }
            let text: String = chunk
                .choices
                .into_iter()
                .filter_map(|choice| choice.delta.content)
                .collect();
            if text.is_empty() {
                SseEvent::Skip
            } else {
                SseEvent::Token(text)
            }
        }
        Err(e) => SseEvent::Error(format!("malformed stream chunk: {e}")),
    }
}

/// Line-buffers raw bytes so that events and multi-byte characters split
/// across network chunks are decoded whole.
struct SseDecoder {
    bytes: ByteStream,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String>>,
    finished: bool,
}

impl SseDecoder {
    fn new(bytes: ByteStream) -> Self {
        Self {
            bytes,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    async fn next_item(&mut self) -> Option<Result<String>> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            if self.finished {
                return None;
            }
            match self.bytes.next().await {
                Some(Ok(chunk)) => self.feed(&chunk),
                Some(Err(e)) => {
                    warn!("Completion stream interrupted: {}", e);
                    self.finished = true;
                    return Some(Err(e));
                }
                None => {
                    self.finished = true;
                    self.flush();
                }
            }
        }
    }

    fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&line);
            if self.finished {
                self.buffer.clear();
                break;
            }
        }
    }

    fn flush(&mut self) {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.handle_line(&line);
        }
    }

    fn handle_line(&mut self, line: &[u8]) {
        let line = String::from_utf8_lossy(line);
        match parse_sse_line(line.trim_end_matches(['\r', '\n'])) {
            SseEvent::Token(token) => self.pending.push_back(Ok(token)),
            SseEvent::Done => self.finished = true,
            SseEvent::Error(message) => {
                self.pending.push_back(Err(LLMError::StreamError(message)));
                self.finished = true;
            }
            SseEvent::Skip => {}
        }
    }
}

fn sse_token_stream<S, B, E>(bytes: S) -> TokenStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + 'static,
    E: Into<LLMError> + 'static,
{
    let bytes: ByteStream =
        Box::pin(bytes.map(|chunk| chunk.map(|b| b.as_ref().to_vec()).map_err(Into::into)));

    Box::pin(futures::stream::unfold(
        SseDecoder::new(bytes),
        |mut decoder| async move { decoder.next_item().await.map(|item| (item, decoder)) },
    ))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;

    fn chunks(parts: Vec<&[u8]>) -> TokenStream {
        let items: Vec<std::result::Result<Vec<u8>, LLMError>> =
            parts.into_iter().map(|p| Ok(p.to_vec())).collect();
        sse_token_stream(futures::stream::iter(items))
    }

    fn collect(stream: TokenStream) -> Vec<Result<String>> {
        tokio_test::block_on(stream.collect::<Vec<_>>())
    }

    #[test]
    fn test_provider_creation() {
        let provider = OpenAIProvider::new("test-key").unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.config().api_key, "test-key");
        assert_eq!(provider.config().api_base, "https://api.openai.com/v1");
        assert_eq!(provider.config().requests_per_minute, 60);
    }

    #[test]
    fn test_provider_with_custom_config() {
        let config = OpenAIConfig::new("test-key")
            .with_api_base("https://dashscope.aliyuncs.com/compatible-mode/v1/")
            .with_timeout(60)
            .with_embedding_model("text-embedding-v3")
            .with_requests_per_minute(0);

        let provider = OpenAIProvider::with_config(config).unwrap();
        assert_eq!(provider.config().timeout_secs, 60);
        assert_eq!(provider.config().embedding_model, "text-embedding-v3");
        assert_eq!(provider.embedding_model(), "text-embedding-v3");
        assert_eq!(
            provider.endpoint("chat/completions"),
            "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions"
        );
    }

    #[test]
    fn test_model_validation() {
        let config = OpenAIConfig::new("test-key").with_supported_models(vec!["qwen-plus".into()]);
        let provider = OpenAIProvider::with_config(config).unwrap();

        assert!(provider.validate_model("qwen-plus").is_ok());
        assert!(matches!(
            provider.validate_model("other"),
            Err(LLMError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_config_from_env() {
        unsafe {
            std::env::remove_var("OPENAI_API_KEY");
        }
        assert!(OpenAIConfig::from_env().is_err());

        unsafe {
            std::env::set_var("OPENAI_API_KEY", "test-key-from-env");
            std::env::set_var("OPENAI_API_BASE", "https://custom.openai.com/v1");
            std::env::set_var("OPENAI_REQUESTS_PER_MINUTE", "12");
        }

        let config = OpenAIConfig::from_env().unwrap();
        assert_eq!(config.api_key, "test-key-from-env");
        assert_eq!(config.api_base, "https://custom.openai.com/v1");
        assert_eq!(config.requests_per_minute, 12);

        unsafe {
            std::env::remove_var("OPENAI_API_KEY");
            std::env::remove_var("OPENAI_API_BASE");
            std::env::remove_var("OPENAI_REQUESTS_PER_MINUTE");
        }
    }

    #[test]
    fn test_system_prompt_goes_first() {
        let request = CompletionRequest::builder("m")
            .system("You are helpful")
            .add_message(Message::user("hi"))
            .top_p(0.95)
            .build();

        let body = build_chat_request(request, false);
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].role, Role::System);
        assert_eq!(body.messages[1].content, "hi");

        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("stream").is_none());
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["messages"][0]["role"], "system");
    }

    #[test]
    fn test_stream_flag_serialized() {
        let body = build_chat_request(CompletionRequest::builder("m").build(), true);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], true);
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status_error(401, String::new(), "m"),
            LLMError::AuthenticationFailed
        ));
        assert!(map_status_error(429, "slow".into(), "m").is_retryable());
        assert!(map_status_error(503, "busy".into(), "m").is_retryable());
        assert!(matches!(
            map_status_error(404, String::new(), "gpt-x"),
            LLMError::ModelNotFound(m) if m == "gpt-x"
        ));
        assert!(!map_status_error(403, "denied".into(), "m").is_retryable());
    }

    #[test]
    fn test_stop_reason_mapping() {
        assert_eq!(map_stop_reason("stop"), StopReason::EndTurn);
        assert_eq!(map_stop_reason("length"), StopReason::MaxTokens);
        assert_eq!(map_stop_reason("content_filter"), StopReason::ContentFilter);
        assert_eq!(map_stop_reason("unknown"), StopReason::EndTurn);
    }

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#),
            SseEvent::Token("Hel".to_string())
        );
        assert_eq!(parse_sse_line("data: [DONE]"), SseEvent::Done);
        assert_eq!(parse_sse_line(": keep-alive"), SseEvent::Skip);
        assert_eq!(parse_sse_line(""), SseEvent::Skip);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseEvent::Skip
        );
        assert_eq!(
            parse_sse_line(r#"data: {"error":{"message":"quota"}}"#),
            SseEvent::Error("quota".to_string())
        );
        assert!(matches!(parse_sse_line("data: {oops"), SseEvent::Error(_)));
    }

    #[test]
    fn test_stream_reassembles_split_chunks() {
        let payload = "data: {\"choices\":[{\"delta\":{\"content\":\"股价\"}}]}\n\n\
                       data: {\"choices\":[{\"delta\":{\"content\":\" up\"}}]}\n\n\
                       data: [DONE]\n\n";
        let bytes = payload.as_bytes();
        // split inside the first multi-byte character
        let split = payload.find('股').unwrap() + 1;

        let items = collect(chunks(vec![&bytes[..split], &bytes[split..]]));
        let tokens: Vec<String> = items.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(tokens, vec!["股价".to_string(), " up".to_string()]);
    }

    #[test]
    fn test_stream_ignores_data_after_done() {
        let payload = b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\
                        data: [DONE]\n\
                        data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n";
        let items = collect(chunks(vec![&payload[..]]));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "a");
    }

    #[test]
    fn test_stream_flushes_unterminated_tail() {
        let items = collect(chunks(vec![
            &b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}"[..],
        ]));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "tail");
    }

    #[test]
    fn test_stream_surfaces_error_event() {
        let items = collect(chunks(vec![
            &b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n"[..],
            &b"data: {\"error\":{\"message\":\"overloaded\"}}\n"[..],
            &b"data: {\"choices\":[{\"delta\":{\"content\":\"y\"}}]}\n"[..],
        ]));
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[1], Err(LLMError::StreamError(m)) if m == "overloaded"));
    }
}
