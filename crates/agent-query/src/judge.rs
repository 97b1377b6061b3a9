//! Result judging

use crate::error::Result;
use crate::extract::CandidateCode;
use crate::model::ModelSettings;
use crate::outcome::ExecutionOutcome;
use crate::prompts::{Language, PromptKind, PromptLibrary};
use crate::query::Query;
use crate::verdict::Verdict;
use agent_llm::LLMProvider;
use minijinja::context;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// What the judge sees of an outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CondensedOutcome {
    /// One-line shape description
    pub structure: String,
    /// Whether the snippet raised
    pub failed: bool,
    /// Error text, or the first characters of the value's textual form
    pub text: String,
}

impl CondensedOutcome {
    /// Condense `outcome` to `limit` characters
    pub fn new(outcome: &ExecutionOutcome, language: Language, limit: usize) -> Self {
        Self {
            structure: outcome.structure(language),
            failed: !outcome.is_success(),
            text: match outcome {
                ExecutionOutcome::Failure { error_message } => error_message.clone(),
                ExecutionOutcome::Success { .. } => outcome.preview(limit),
            },
        }
    }
}

/// LLM-backed verifier of execution outcomes
pub struct ResultJudge {
    llm: Arc<dyn LLMProvider>,
    prompts: Arc<PromptLibrary>,
    settings: ModelSettings,
    preview_chars: usize,
}

impl ResultJudge {
    /// Create a judge showing `preview_chars` of successful outcomes
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        prompts: Arc<PromptLibrary>,
        settings: ModelSettings,
        preview_chars: usize,
    ) -> Self {
        Self {
            llm,
            prompts,
            settings,
            preview_chars,
        }
    }

    /// Decide whether `outcome` answers the question
    ///
    /// A reply that does not parse as a verdict is an error.
    pub async fn judge(
        &self,
        query: &Query,
        docs: &str,
        outcome: &ExecutionOutcome,
        candidate: &CandidateCode,
    ) -> Result<Verdict> {
        let condensed = CondensedOutcome::new(outcome, self.prompts.language(), self.preview_chars);
        let prompt = self.prompts.render(
            PromptKind::Judge,
            context! {
                question => &query.raw_text,
                docs => docs,
                structure => &condensed.structure,
                failed => condensed.failed,
                current_result => &condensed.text,
                current_code => &candidate.source,
            },
        )?;

        let reply = self.settings.ask(self.llm.as_ref(), prompt).await?;
        let verdict = Verdict::parse(&reply)?;
        debug!(iteration = candidate.iteration, is_pass = verdict.is_pass, "Judged outcome");
        Ok(verdict)
    }
}
