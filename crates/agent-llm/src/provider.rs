//! LLM provider trait definitions

use crate::{CompletionRequest, CompletionResponse, Result};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Lazily produced sequence of incremental text tokens
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Trait for chat-completion providers
///
/// Implementations apply their own low-level retry and rate limiting; any
/// error they return is final for the caller.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a completion from the LLM
    ///
    /// # Arguments
    ///
    /// * `request` - The completion request with messages and sampling parameters
    ///
    /// # Returns
    ///
    /// The completion response with the assistant's message and metadata
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Generate a completion delivered token by token
    ///
    /// The returned stream ends after the last token; transport failures
    /// mid-stream surface as an `Err` item.
    async fn stream(&self, request: CompletionRequest) -> Result<TokenStream>;

    /// Get the provider name (e.g., "openai")
    fn name(&self) -> &str;
}

/// Trait for text-embedding providers
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed each text, returning one vector per input in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embedding model; vectors from different models are not comparable
    fn embedding_model(&self) -> &str;
}
