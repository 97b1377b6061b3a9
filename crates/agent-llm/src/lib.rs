//! LLM adapter layer for agent-rs
//!
//! This crate provides provider-agnostic abstractions for talking to chat
//! models. It includes:
//!
//! - Message types for LLM communication
//! - Completion request/response types
//! - Provider traits for single-shot completion, token streaming and embeddings
//! - A retry policy with exponential backoff for transient transport errors
//! - An OpenAI-compatible provider implementation (behind the `openai` feature)

pub mod completion;
pub mod error;
pub mod messages;
pub mod provider;
pub mod retry;

// Re-export main types
pub use completion::{CompletionRequest, CompletionResponse, StopReason, TokenUsage};
pub use error::{LLMError, Result};
pub use messages::{Message, Role};
pub use provider::{EmbeddingProvider, LLMProvider, TokenStream};
pub use retry::RetryPolicy;

// Provider implementations (feature-gated)
#[cfg(feature = "openai")]
pub mod providers;
