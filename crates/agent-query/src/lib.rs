//! Reflective stock-data query resolution for agent-rs
//!
//! A question in natural language is answered by code the LLM writes
//! against a Python financial-data library. This crate provides:
//!
//! - Query rewriting grounded in documentation titles
//! - Candidate generation with reflection on previous attempts
//! - Sandboxed execution of candidates behind the [`CodeSandbox`] trait
//! - An LLM judge with tolerant verdict parsing
//! - Reflection cycles with duplicate detection, and a retry controller on top
//! - Conversational sessions with bounded history and streamed answers
//! - Stock research reports assembled from resolved sections
//! - Keyword and embedding retrieval over markdown documentation
//!
//! # Example
//!
//! ```no_run
//! use agent_llm::providers::OpenAIProvider;
//! use agent_query::{KeywordIndex, QueryConfig, QueryResolver, load_markdown_dir};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let docs = load_markdown_dir("docs")?;
//! let resolver = QueryResolver::builder()
//!     .llm(Arc::new(OpenAIProvider::from_env()?))
//!     .retriever(Arc::new(KeywordIndex::new(docs)))
//!     .config(QueryConfig::from_env()?)
//!     .build()?;
//!
//! let resolution = resolver.resolve("贵州茅台最近的股价表现").await?;
//! if let Some(outcome) = resolution.outcome() {
//!     println!("{}", outcome.text());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod cycle;
pub mod error;
pub mod extract;
pub mod generator;
pub mod judge;
pub mod model;
pub mod observer;
pub mod outcome;
pub mod prompts;
pub mod query;
pub mod report;
pub mod resolver;
pub mod retrieval;
pub mod rewriter;
pub mod sandbox;
pub mod session;
pub mod verdict;

#[cfg(test)]
mod testing;

// Re-export main types
pub use config::{QueryConfig, QueryConfigBuilder};
pub use cycle::{CycleState, CycleTerminal};
pub use error::{QueryError, Result};
pub use extract::{CandidateCode, CodeOrigin, extract_code};
pub use generator::CandidateGenerator;
pub use judge::{CondensedOutcome, ResultJudge};
pub use model::ModelSettings;
pub use observer::{
    NoOpObserver, ReflectionObserver, TraceEvent, TraceRecorder, TraceStage, TracingObserver,
};
pub use outcome::{ExecutionOutcome, select_best};
pub use prompts::{Language, PromptKind, PromptLibrary};
pub use query::{Clock, Query, fixed_clock, system_clock};
pub use report::{SectionData, SectionKind, SectionResult, StockAnalysis, StockAnalyzer};
pub use resolver::{DirectResolution, QueryResolver, QueryResolverBuilder, Resolution};
pub use retrieval::{
    Document, EmbeddingIndex, Grounding, KeywordIndex, Retriever, load_markdown_dir,
};
pub use rewriter::QueryRewriter;
pub use sandbox::{CodeSandbox, Namespace, PythonSandbox, SandboxError};
pub use session::{ChatSession, ChatTurn, MessageHistory, SessionStore, parse_yes_no, session_key};
pub use verdict::{Verdict, VerdictParseError};
