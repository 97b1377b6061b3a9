//! Configuration for query resolution

use crate::error::{QueryError, Result};
use crate::prompts::Language;
use agent_utils::{env_opt, env_or};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration shared by the resolver, the chat session and the analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Chat model used for every LLM call
    pub model: String,

    /// Iterations per cycle for direct resolution calls
    pub max_iterations: usize,

    /// Cycles that may be restarted after a duplicate abort
    pub max_retries: usize,

    /// Documentation snippets fed to generation and judging
    pub doc_limit: usize,

    /// Characters of an outcome shown to the LLM
    pub preview_chars: usize,

    /// Sampling temperature
    pub temperature: f32,

    /// Nucleus sampling mass
    pub top_p: f32,

    /// Cap on generated tokens per call
    pub max_tokens: Option<usize>,

    /// Prompt language
    pub language: Language,

    /// Chat history capacity, pinned messages included
    pub history_capacity: usize,

    /// Iterations per cycle when chat needs data
    pub session_max_iterations: usize,

    /// Iterations per cycle for report sections
    pub report_max_iterations: usize,

    /// Wall-clock limit of one sandbox execution
    pub sandbox_timeout: Duration,

    /// Interpreter used by the Python sandbox
    pub python: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_iterations: 3,
            max_retries: 3,
            doc_limit: 5,
            preview_chars: 1000,
            temperature: 0.2,
            top_p: 0.95,
            max_tokens: None,
            language: Language::Chinese,
            history_capacity: 10,
            session_max_iterations: 10,
            report_max_iterations: 10,
            sandbox_timeout: Duration::from_secs(120),
            python: "python3".to_string(),
        }
    }
}

impl QueryConfig {
    /// Create a new configuration builder
    pub fn builder() -> QueryConfigBuilder {
        QueryConfigBuilder::default()
    }

    /// Build from `QUERY_*` environment variables, defaults for the rest
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            model: env_or("QUERY_MODEL", defaults.model)?,
            max_iterations: env_or("QUERY_MAX_ITERATIONS", defaults.max_iterations)?,
            max_retries: env_or("QUERY_MAX_RETRIES", defaults.max_retries)?,
            doc_limit: env_or("QUERY_DOC_LIMIT", defaults.doc_limit)?,
            preview_chars: defaults.preview_chars,
            temperature: env_or("QUERY_TEMPERATURE", defaults.temperature)?,
            top_p: env_or("QUERY_TOP_P", defaults.top_p)?,
            max_tokens: env_opt("QUERY_MAX_TOKENS")?,
            language: match env_opt::<String>("QUERY_LANGUAGE")? {
                Some(code) => code.parse()?,
                None => defaults.language,
            },
            history_capacity: env_or("QUERY_HISTORY_CAPACITY", defaults.history_capacity)?,
            session_max_iterations: env_or(
                "QUERY_SESSION_MAX_ITERATIONS",
                defaults.session_max_iterations,
            )?,
            report_max_iterations: env_or(
                "QUERY_REPORT_MAX_ITERATIONS",
                defaults.report_max_iterations,
            )?,
            sandbox_timeout: env_opt::<u64>("QUERY_SANDBOX_TIMEOUT_SECS")?
                .map_or(defaults.sandbox_timeout, Duration::from_secs),
            python: env_or("QUERY_PYTHON", defaults.python)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(QueryError::Config("model must not be empty".to_string()));
        }

        for (name, value) in [
            ("max_iterations", self.max_iterations),
            ("session_max_iterations", self.session_max_iterations),
            ("report_max_iterations", self.report_max_iterations),
            ("doc_limit", self.doc_limit),
            ("preview_chars", self.preview_chars),
            ("history_capacity", self.history_capacity),
        ] {
            if value == 0 {
                return Err(QueryError::Config(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(QueryError::Config(format!(
                "temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }

        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(QueryError::Config(format!(
                "top_p must be within (0.0, 1.0], got {}",
                self.top_p
            )));
        }

        if self.sandbox_timeout.is_zero() {
            return Err(QueryError::Config(
                "sandbox_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for QueryConfig
#[derive(Debug, Default)]
pub struct QueryConfigBuilder {
    model: Option<String>,
    max_iterations: Option<usize>,
    max_retries: Option<usize>,
    doc_limit: Option<usize>,
    preview_chars: Option<usize>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    max_tokens: Option<usize>,
    language: Option<Language>,
    history_capacity: Option<usize>,
    session_max_iterations: Option<usize>,
    report_max_iterations: Option<usize>,
    sandbox_timeout: Option<Duration>,
    python: Option<String>,
}

impl QueryConfigBuilder {
    /// Set the chat model
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set iterations per cycle
    pub fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Set the retry ceiling
    pub fn max_retries(mut self, n: usize) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Set how many documentation snippets are used
    pub fn doc_limit(mut self, n: usize) -> Self {
        self.doc_limit = Some(n);
        self
    }

    /// Set outcome preview length
    pub fn preview_chars(mut self, n: usize) -> Self {
        self.preview_chars = Some(n);
        self
    }

    /// Set sampling temperature
    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Set top-p
    pub fn top_p(mut self, p: f32) -> Self {
        self.top_p = Some(p);
        self
    }

    /// Set generated-token cap
    pub fn max_tokens(mut self, n: usize) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Set prompt language
    pub fn language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    /// Set chat history capacity
    pub fn history_capacity(mut self, n: usize) -> Self {
        self.history_capacity = Some(n);
        self
    }

    /// Set iterations per cycle for chat
    pub fn session_max_iterations(mut self, n: usize) -> Self {
        self.session_max_iterations = Some(n);
        self
    }

    /// Set iterations per cycle for report sections
    pub fn report_max_iterations(mut self, n: usize) -> Self {
        self.report_max_iterations = Some(n);
        self
    }

    /// Set sandbox timeout
    pub fn sandbox_timeout(mut self, timeout: Duration) -> Self {
        self.sandbox_timeout = Some(timeout);
        self
    }

    /// Set the Python interpreter
    pub fn python(mut self, python: impl Into<String>) -> Self {
        self.python = Some(python.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<QueryConfig> {
        let defaults = QueryConfig::default();

        let config = QueryConfig {
            model: self.model.unwrap_or(defaults.model),
            max_iterations: self.max_iterations.unwrap_or(defaults.max_iterations),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            doc_limit: self.doc_limit.unwrap_or(defaults.doc_limit),
            preview_chars: self.preview_chars.unwrap_or(defaults.preview_chars),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            max_tokens: self.max_tokens.or(defaults.max_tokens),
            language: self.language.unwrap_or(defaults.language),
            history_capacity: self.history_capacity.unwrap_or(defaults.history_capacity),
            session_max_iterations: self
                .session_max_iterations
                .unwrap_or(defaults.session_max_iterations),
            report_max_iterations: self
                .report_max_iterations
                .unwrap_or(defaults.report_max_iterations),
            sandbox_timeout: self.sandbox_timeout.unwrap_or(defaults.sandbox_timeout),
            python: self.python.unwrap_or(defaults.python),
        };

        config.validate()?;
        Ok(config)
    }
}
