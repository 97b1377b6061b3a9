//! Concrete LLM provider implementations
//!
//! This module contains implementations of the LLMProvider and
//! EmbeddingProvider traits for LLM services.

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "openai")]
pub use openai::{OpenAIConfig, OpenAIProvider};
