//! Sampling settings and single-shot chat calls

use crate::config::QueryConfig;
use crate::error::Result;
use agent_llm::{CompletionRequest, LLMProvider, Message};
use tracing::debug;

/// Model and sampling parameters applied to every call of a component
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    /// Chat model name
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling mass
    pub top_p: f32,
    /// Cap on generated tokens
    pub max_tokens: Option<usize>,
}

impl ModelSettings {
    /// Take the sampling fields of a [`QueryConfig`]
    pub fn from_config(config: &QueryConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
        }
    }

    /// Build a request for `messages`, with an optional system prompt
    pub fn request(&self, messages: Vec<Message>, system: Option<String>) -> CompletionRequest {
        let mut builder = CompletionRequest::builder(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .top_p(self.top_p)
            .max_tokens_opt(self.max_tokens);
        if let Some(system) = system {
            builder = builder.system(system);
        }
        builder.build()
    }

    /// Send one user prompt and return the reply text
    pub async fn ask(&self, llm: &dyn LLMProvider, prompt: String) -> Result<String> {
        debug!(model = %self.model, provider = llm.name(), chars = prompt.chars().count(), "Sending prompt");
        let response = llm
            .complete(self.request(vec![Message::user(prompt)], None))
            .await?;
        Ok(response.into_text())
    }
}

impl From<&QueryConfig> for ModelSettings {
    fn from(config: &QueryConfig) -> Self {
        Self::from_config(config)
    }
}
