//! Top-level query resolution
//!
//! [`QueryResolver::resolve`] is the retry controller: it gathers
//! documentation once, then runs reflection cycles until one ends in
//! anything but a duplicate abort. After `max_retries` aborted cycles one
//! final cycle runs unconditionally and its result is returned as-is.

use crate::config::QueryConfig;
use crate::cycle::{CycleDriver, CycleTerminal};
use crate::error::{QueryError, Result};
use crate::extract::CandidateCode;
use crate::generator::CandidateGenerator;
use crate::judge::ResultJudge;
use crate::model::ModelSettings;
use crate::observer::{ReflectionObserver, TracingObserver};
use crate::outcome::ExecutionOutcome;
use crate::prompts::{Language, PromptLibrary};
use crate::query::{Clock, Query, system_clock};
use crate::retrieval::{Grounding, Retriever};
use crate::rewriter::QueryRewriter;
use crate::sandbox::{CodeSandbox, PythonSandbox, run_candidate};
use agent_llm::LLMProvider;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

/// Result of a reflective resolution call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    /// Terminal state of the last cycle
    pub terminal: CycleTerminal,
    /// Cycles run, between 1 and `max_retries + 1`
    pub attempts: usize,
    /// The query as last rewritten
    pub query: Query,
}

impl Resolution {
    /// Outcome of a passed or exhausted final cycle
    pub fn outcome(&self) -> Option<&ExecutionOutcome> {
        self.terminal.outcome()
    }

    /// Whether the final cycle aborted on a duplicate
    pub fn is_aborted(&self) -> bool {
        self.terminal.is_aborted()
    }
}

/// Result of a single non-reflective pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectResolution {
    /// The rewritten query
    pub query: Query,
    /// The only candidate generated
    pub candidate: CandidateCode,
    /// What it produced
    pub outcome: ExecutionOutcome,
}

/// Resolves questions into data by generating and judging code
pub struct QueryResolver {
    llm: Arc<dyn LLMProvider>,
    retriever: Arc<dyn Retriever>,
    sandbox: Arc<dyn CodeSandbox>,
    observer: Arc<dyn ReflectionObserver>,
    prompts: Arc<PromptLibrary>,
    clock: Clock,
    config: QueryConfig,
    rewriter: QueryRewriter,
    generator: CandidateGenerator,
    judge: ResultJudge,
}

impl QueryResolver {
    /// Start building a resolver
    pub fn builder() -> QueryResolverBuilder {
        QueryResolverBuilder::default()
    }

    /// Active configuration
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Chat transport shared with sessions and the analyzer
    pub fn llm(&self) -> &Arc<dyn LLMProvider> {
        &self.llm
    }

    /// Compiled prompt templates
    pub fn prompts(&self) -> &Arc<PromptLibrary> {
        &self.prompts
    }

    /// Sampling settings from the configuration
    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings::from_config(&self.config)
    }

    /// Resolve with the configured iteration ceiling
    pub async fn resolve(&self, question: &str) -> Result<Resolution> {
        self.resolve_with_limit(question, self.config.max_iterations)
            .await
    }

    /// Resolve with `max_iterations` per cycle
    #[instrument(skip(self), fields(max_retries = self.config.max_retries))]
    pub async fn resolve_with_limit(&self, question: &str, max_iterations: usize) -> Result<Resolution> {
        if max_iterations == 0 {
            return Err(QueryError::Config(
                "max_iterations must be greater than 0".to_string(),
            ));
        }

        let mut query = Query::at(question, &self.clock, self.config.language);
        let grounding =
            Grounding::gather(self.retriever.as_ref(), question, self.config.doc_limit).await?;
        let driver = self.driver();

        let mut attempt = 1;
        loop {
            if attempt > 1 {
                self.observer.on_retry(attempt).await;
            }

            let terminal = driver
                .run(attempt, &mut query, &grounding, max_iterations)
                .await?;
            self.observer.on_cycle_end(attempt, &terminal).await;

            if !terminal.is_aborted() || attempt > self.config.max_retries {
                info!(attempts = attempt, terminal = terminal.label(), "Resolution finished");
                return Ok(Resolution {
                    terminal,
                    attempts: attempt,
                    query,
                });
            }
            attempt += 1;
        }
    }

    /// One rewrite, one candidate, one execution; no judge and no retry
    #[instrument(skip(self))]
    pub async fn resolve_direct(&self, question: &str) -> Result<DirectResolution> {
        let mut query = Query::at(question, &self.clock, self.config.language);
        let grounding =
            Grounding::gather(self.retriever.as_ref(), question, self.config.doc_limit).await?;

        query.rewritten_text = Some(self.rewriter.rewrite(&query, &grounding.titles).await?);
        self.observer.on_rewrite(1, &query).await;

        let candidate = self.generator.initial(&query, &grounding.docs).await?;
        self.observer.on_candidate(&candidate).await;

        let outcome = run_candidate(self.sandbox.as_ref(), &candidate).await?;
        self.observer.on_outcome(candidate.iteration, &outcome).await;

        Ok(DirectResolution {
            query,
            candidate,
            outcome,
        })
    }

    fn driver(&self) -> CycleDriver<'_> {
        CycleDriver {
            rewriter: &self.rewriter,
            generator: &self.generator,
            judge: &self.judge,
            sandbox: self.sandbox.as_ref(),
            observer: self.observer.as_ref(),
        }
    }
}

/// Note used in place of data when every cycle aborted on a duplicate
pub(crate) fn duplicate_abort_message(language: Language) -> &'static str {
    match language {
        Language::Chinese => "多次查询得到重复结果，未能获取有效数据",
        Language::English => "repeated attempts kept producing duplicate results",
    }
}

/// Builder for [`QueryResolver`]
///
/// The LLM and the retriever are required. The sandbox defaults to a
/// [`PythonSandbox`] built from the configuration, the observer to
/// [`TracingObserver`] and the clock to local wall time.
#[derive(Default)]
pub struct QueryResolverBuilder {
    llm: Option<Arc<dyn LLMProvider>>,
    retriever: Option<Arc<dyn Retriever>>,
    sandbox: Option<Arc<dyn CodeSandbox>>,
    observer: Option<Arc<dyn ReflectionObserver>>,
    clock: Option<Clock>,
    config: Option<QueryConfig>,
}

impl QueryResolverBuilder {
    /// Set the chat transport
    pub fn llm(mut self, llm: Arc<dyn LLMProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Set the documentation retriever
    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Set the code sandbox
    pub fn sandbox(mut self, sandbox: Arc<dyn CodeSandbox>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    /// Set the observer
    pub fn observer(mut self, observer: Arc<dyn ReflectionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Set the clock used to stamp queries
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the configuration
    pub fn config(mut self, config: QueryConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the resolver
    pub fn build(self) -> Result<QueryResolver> {
        let llm = self
            .llm
            .ok_or_else(|| QueryError::Config("an LLM provider is required".to_string()))?;
        let retriever = self
            .retriever
            .ok_or_else(|| QueryError::Config("a retriever is required".to_string()))?;
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let prompts = Arc::new(PromptLibrary::new(config.language)?);
        let settings = ModelSettings::from_config(&config);
        let sandbox = self
            .sandbox
            .unwrap_or_else(|| Arc::new(PythonSandbox::from_config(&config)));

        Ok(QueryResolver {
            rewriter: QueryRewriter::new(llm.clone(), prompts.clone(), settings.clone()),
            generator: CandidateGenerator::new(
                llm.clone(),
                prompts.clone(),
                settings.clone(),
                config.preview_chars,
            ),
            judge: ResultJudge::new(llm.clone(), prompts.clone(), settings, config.preview_chars),
            llm,
            retriever,
            sandbox,
            observer: self.observer.unwrap_or_else(|| Arc::new(TracingObserver)),
            prompts,
            clock: self.clock.unwrap_or_else(system_clock),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{TraceRecorder, TraceStage};
    use crate::query::fixed_clock;
    use crate::testing::{
        ScriptedProvider, ScriptedSandbox, fenced, monday, static_retriever, verdict_reply,
    };
    use serde_json::json;

    struct Harness {
        llm: Arc<ScriptedProvider>,
        sandbox: Arc<ScriptedSandbox>,
        recorder: Arc<TraceRecorder>,
        resolver: QueryResolver,
    }

    fn harness(llm: ScriptedProvider, sandbox: ScriptedSandbox, config: QueryConfig) -> Harness {
        let llm = Arc::new(llm);
        let sandbox = Arc::new(sandbox);
        let recorder = Arc::new(TraceRecorder::new());
        let resolver = QueryResolver::builder()
            .llm(llm.clone())
            .retriever(Arc::new(static_retriever(
                &["股票行情", "个股信息"],
                &["doc-1", "doc-2", "doc-3", "doc-4", "doc-5", "doc-6"],
            )))
            .sandbox(sandbox.clone())
            .observer(recorder.clone())
            .clock(fixed_clock(monday()))
            .config(config)
            .build()
            .unwrap();
        Harness {
            llm,
            sandbox,
            recorder,
            resolver,
        }
    }

    fn stages(recorder: &TraceRecorder) -> Vec<TraceStage> {
        recorder.events().iter().map(|e| e.stage).collect()
    }

    #[tokio::test]
    async fn test_pass_on_first_iteration() {
        let h = harness(
            ScriptedProvider::new([
                "需要用到的数据是：个股信息".to_string(),
                fenced("result = info()"),
                verdict_reply(true, "完整", ""),
            ]),
            ScriptedSandbox::new().binds("result = info()", json!({"股票代码": "600519"})),
            QueryConfig::default(),
        );

        let resolution = h.resolver.resolve("茅台的基本信息").await.unwrap();

        assert_eq!(resolution.attempts, 1);
        assert_eq!(
            resolution.terminal,
            CycleTerminal::Passed(ExecutionOutcome::success(json!({"股票代码": "600519"})))
        );
        assert_eq!(
            resolution.query.rewritten_text.as_deref(),
            Some("需要用到的数据是：个股信息")
        );
        assert_eq!(resolution.query.issued_at, "2024-05-13 10:00:00 星期一");
        assert_eq!(h.llm.remaining(), 0);

        // Only the first five snippets reach generation.
        let generation_prompt = &h.llm.prompts()[1];
        assert!(generation_prompt.contains("doc-1\ndoc-2\ndoc-3\ndoc-4\ndoc-5"));
        assert!(!generation_prompt.contains("doc-6"));
    }

    #[tokio::test]
    async fn test_exhaustion_keeps_longest_error() {
        let config = QueryConfig::builder().max_iterations(2).build().unwrap();
        let h = harness(
            ScriptedProvider::new([
                "rewritten".to_string(),
                fenced("a()"),
                verdict_reply(false, "短错误", "fix a"),
                fenced("b()"),
                verdict_reply(false, "更长的错误", "fix b"),
            ]),
            ScriptedSandbox::new()
                .raises("a()", "KeyError: 'x'")
                .raises("b()", "ValueError: something much longer"),
            config,
        );

        let resolution = h.resolver.resolve("q").await.unwrap();

        assert_eq!(resolution.attempts, 1);
        assert_eq!(
            resolution.terminal,
            CycleTerminal::Exhausted(ExecutionOutcome::failure(
                "ValueError: something much longer"
            ))
        );
        assert_eq!(h.sandbox.executed(), vec!["a()", "b()"]);

        // The reflection prompt carries the first attempt and its feedback.
        let reflection_prompt = &h.llm.prompts()[3];
        assert!(reflection_prompt.contains("a()"));
        assert!(reflection_prompt.contains("KeyError: 'x'"));
        assert!(reflection_prompt.contains("短错误\nfix a"));
    }

    #[tokio::test]
    async fn test_duplicate_restarts_with_fresh_rewrite() {
        let config = QueryConfig::builder().max_iterations(5).build().unwrap();
        let h = harness(
            ScriptedProvider::new([
                // cycle 1: outcomes 1, 2, then 1 again
                "first rewrite".to_string(),
                fenced("one()"),
                verdict_reply(false, "t", "n"),
                fenced("two()"),
                verdict_reply(false, "t", "n"),
                fenced("one_again()"),
                // cycle 2
                "second rewrite".to_string(),
                fenced("three()"),
                verdict_reply(true, "ok", ""),
            ]),
            ScriptedSandbox::new()
                .binds("one()", json!([1]))
                .binds("two()", json!([2]))
                .binds("one_again()", json!([1]))
                .binds("three()", json!([3])),
            config,
        );

        let resolution = h.resolver.resolve("q").await.unwrap();

        assert_eq!(resolution.attempts, 2);
        assert_eq!(
            resolution.terminal,
            CycleTerminal::Passed(ExecutionOutcome::success(json!([3])))
        );
        assert_eq!(resolution.query.rewritten_text.as_deref(), Some("second rewrite"));
        assert_eq!(h.llm.remaining(), 0);

        let stages = stages(&h.recorder);
        assert!(stages.contains(&TraceStage::Duplicate));
        assert!(stages.contains(&TraceStage::Retry));
        assert_eq!(
            stages.iter().filter(|s| **s == TraceStage::Verdict).count(),
            3
        );
    }

    #[tokio::test]
    async fn test_final_cycle_may_abort() {
        let config = QueryConfig::builder()
            .max_iterations(3)
            .max_retries(1)
            .build()
            .unwrap();
        let mut replies = Vec::new();
        for _ in 0..2 {
            replies.extend([
                "rewrite".to_string(),
                fenced("same()"),
                verdict_reply(false, "t", "n"),
                fenced("same()"),
            ]);
        }
        let h = harness(
            ScriptedProvider::new(replies),
            ScriptedSandbox::new().binds("same()", json!({"k": 1})),
            config,
        );

        let resolution = h.resolver.resolve("q").await.unwrap();

        assert_eq!(resolution.attempts, 2);
        assert!(resolution.is_aborted());
        assert!(resolution.outcome().is_none());
        assert_eq!(h.llm.remaining(), 0);
    }

    #[tokio::test]
    async fn test_zero_retries_runs_one_cycle() {
        let config = QueryConfig::builder()
            .max_iterations(3)
            .max_retries(0)
            .build()
            .unwrap();
        let h = harness(
            ScriptedProvider::new([
                "rewrite".to_string(),
                fenced("same()"),
                verdict_reply(false, "t", "n"),
                fenced("same()"),
            ]),
            ScriptedSandbox::new().binds("same()", json!(null)),
            config,
        );

        let resolution = h.resolver.resolve("q").await.unwrap();
        assert_eq!(resolution.attempts, 1);
        assert!(resolution.is_aborted());
    }

    #[tokio::test]
    async fn test_verdict_parse_failure_fails_the_call() {
        let h = harness(
            ScriptedProvider::new([
                "rewrite".to_string(),
                fenced("x()"),
                "I think it is fine".to_string(),
            ]),
            ScriptedSandbox::new().binds("x()", json!(1)),
            QueryConfig::default(),
        );

        let err = h.resolver.resolve("q").await.unwrap_err();
        assert!(matches!(err, QueryError::Verdict(_)));
    }

    #[tokio::test]
    async fn test_direct_resolution_skips_judge() {
        let h = harness(
            ScriptedProvider::new(["rewrite".to_string(), fenced("result = 5")]),
            ScriptedSandbox::new().binds("result = 5", json!(5)),
            QueryConfig::default(),
        );

        let direct = h.resolver.resolve_direct("q").await.unwrap();
        assert_eq!(direct.outcome, ExecutionOutcome::success(json!(5)));
        assert_eq!(direct.candidate.source, "result = 5");
        assert_eq!(h.llm.requests().len(), 2);
        assert!(!stages(&h.recorder).contains(&TraceStage::Verdict));
    }

    #[tokio::test]
    async fn test_zero_iteration_limit_is_rejected() {
        let h = harness(
            ScriptedProvider::default(),
            ScriptedSandbox::new(),
            QueryConfig::default(),
        );
        assert!(matches!(
            h.resolver.resolve_with_limit("q", 0).await,
            Err(QueryError::Config(_))
        ));
    }

    #[test]
    fn test_builder_requires_llm_and_retriever() {
        let result = QueryResolver::builder().build();
        assert!(matches!(result, Err(QueryError::Config(msg)) if msg.contains("LLM")));

        let result = QueryResolver::builder()
            .llm(Arc::new(ScriptedProvider::default()))
            .build();
        assert!(matches!(result, Err(QueryError::Config(msg)) if msg.contains("retriever")));
    }
}
