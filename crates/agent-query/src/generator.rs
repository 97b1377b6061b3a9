//! Candidate code generation

use crate::error::Result;
use crate::extract::{CandidateCode, CodeOrigin};
use crate::model::ModelSettings;
use crate::outcome::ExecutionOutcome;
use crate::prompts::{PromptKind, PromptLibrary};
use crate::query::Query;
use crate::verdict::Verdict;
use agent_llm::LLMProvider;
use minijinja::context;
use std::sync::Arc;
use tracing::debug;

/// Asks the LLM for data-fetching code
pub struct CandidateGenerator {
    llm: Arc<dyn LLMProvider>,
    prompts: Arc<PromptLibrary>,
    settings: ModelSettings,
    preview_chars: usize,
}

impl CandidateGenerator {
    /// Create a generator; reflection prompts show `preview_chars` of the
    /// previous outcome
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

    /// First candidate of a cycle
    pub async fn initial(&self, query: &Query, docs: &str) -> Result<CandidateCode> {
        let prompt = self.prompts.render(
            PromptKind::WriteCode,
            context! {
                question => &query.raw_text,
                rewritten => query.effective_text(),
                docs => docs,
                current_time => &query.issued_at,
            },
        )?;

        let reply = self.settings.ask(self.llm.as_ref(), prompt).await?;
        let candidate = CandidateCode::from_response(&reply, 1, CodeOrigin::Initial);
        debug!(chars = candidate.source.len(), "Initial candidate");
        Ok(candidate)
    }

    /// Revise `previous` given what it produced and what the judge said
    pub async fn reflect(
        &self,
        query: &Query,
        docs: &str,
        previous: &CandidateCode,
        outcome: &ExecutionOutcome,
        verdict: &Verdict,
    ) -> Result<CandidateCode> {
        let prompt = self.prompts.render(
            PromptKind::ReflectCode,
            context! {
                docs => docs,
                history_code => &previous.source,
                current_result => outcome.preview(self.preview_chars),
                feedback => verdict.feedback(),
                current_time => &query.issued_at,
            },
        )?;

        let reply = self.settings.ask(self.llm.as_ref(), prompt).await?;
        let candidate =
            CandidateCode::from_response(&reply, previous.iteration + 1, CodeOrigin::Reflection);
        debug!(iteration = candidate.iteration, chars = candidate.source.len(), "Reflected candidate");
        Ok(candidate)
    }
}
