//! One reflection cycle: rewrite, then generate, execute, dedup-check and
//! judge until the judge passes, a duplicate appears or iterations run out

use crate::error::Result;
use crate::generator::CandidateGenerator;
use crate::judge::ResultJudge;
use crate::observer::ReflectionObserver;
use crate::outcome::{ExecutionOutcome, select_best};
use crate::query::Query;
use crate::retrieval::Grounding;
use crate::rewriter::QueryRewriter;
use crate::sandbox::{CodeSandbox, run_candidate};
use serde::Serialize;
use std::collections::HashSet;

/// How a cycle ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "outcome", rename_all = "snake_case")]
pub enum CycleTerminal {
    /// The judge accepted this outcome
    Passed(ExecutionOutcome),
    /// Iterations ran out; the best outcome seen
    Exhausted(ExecutionOutcome),
    /// An outcome repeated an earlier one; the only state that triggers a retry
    AbortedDuplicate,
}

impl CycleTerminal {
    /// Short name for logs and traces
    pub fn label(&self) -> &'static str {
        match self {
            Self::Passed(_) => "passed",
            Self::Exhausted(_) => "exhausted",
            Self::AbortedDuplicate => "aborted_duplicate",
        }
    }

    /// Whether this cycle asks for a fresh one
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::AbortedDuplicate)
    }

    /// The outcome carried by a passed or exhausted cycle
    pub fn outcome(&self) -> Option<&ExecutionOutcome> {
        match self {
            Self::Passed(outcome) | Self::Exhausted(outcome) => Some(outcome),
            Self::AbortedDuplicate => None,
        }
    }

    /// Consume into the carried outcome
    pub fn into_outcome(self) -> Option<ExecutionOutcome> {
        match self {
            Self::Passed(outcome) | Self::Exhausted(outcome) => Some(outcome),
            Self::AbortedDuplicate => None,
        }
    }
}

/// Outcomes of the current cycle, in order, plus their canonical forms
#[derive(Debug, Default)]
pub struct CycleState {
    history: Vec<ExecutionOutcome>,
    seen: HashSet<String>,
}

impl CycleState {
    /// Empty state for a new cycle
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterations completed so far
    pub fn iteration_count(&self) -> usize {
        self.history.len()
    }

    /// Outcomes in execution order
    pub fn history(&self) -> &[ExecutionOutcome] {
        &self.history
    }

    /// Whether an equal outcome is already in the history
    pub fn is_duplicate(&self, outcome: &ExecutionOutcome) -> bool {
        self.seen.contains(&outcome.canonical())
    }

    /// Append an outcome
    pub fn push(&mut self, outcome: ExecutionOutcome) {
        self.seen.insert(outcome.canonical());
        self.history.push(outcome);
    }

    /// Highest-ranked outcome, earliest on ties
    pub fn best(&self) -> Option<&ExecutionOutcome> {
        select_best(&self.history)
    }
}

/// Collaborators used by a cycle
pub(crate) struct CycleDriver<'a> {
    pub rewriter: &'a QueryRewriter,
    pub generator: &'a CandidateGenerator,
    pub judge: &'a ResultJudge,
    pub sandbox: &'a dyn CodeSandbox,
    pub observer: &'a dyn ReflectionObserver,
}

impl CycleDriver<'_> {
    /// Run cycle `attempt` with at most `max_iterations` iterations
    ///
    /// Rewrites `query` in place; the rewrite is reused by every iteration.
    pub(crate) async fn run(
        &self,
        attempt: usize,
        query: &mut Query,
        grounding: &Grounding,
        max_iterations: usize,
    ) -> Result<CycleTerminal> {
        let rewritten = self.rewriter.rewrite(query, &grounding.titles).await?;
        query.rewritten_text = Some(rewritten);
        self.observer.on_rewrite(attempt, query).await;

        let mut state = CycleState::new();
        let mut candidate = self.generator.initial(query, &grounding.docs).await?;

        loop {
            self.observer.on_candidate(&candidate).await;
            let iteration = candidate.iteration;

            let outcome = run_candidate(self.sandbox, &candidate).await?;
            self.observer.on_outcome(iteration, &outcome).await;

            if state.is_duplicate(&outcome) {
                self.observer.on_duplicate(iteration).await;
                return Ok(CycleTerminal::AbortedDuplicate);
            }
            state.push(outcome.clone());

            let verdict = self
                .judge
                .judge(query, &grounding.docs, &outcome, &candidate)
                .await?;
            self.observer.on_verdict(iteration, &verdict).await;

            if verdict.is_pass {
                return Ok(CycleTerminal::Passed(outcome));
            }

            if state.iteration_count() >= max_iterations {
                let best = state.best().cloned().unwrap_or(outcome);
                return Ok(CycleTerminal::Exhausted(best));
            }

            candidate = self
                .generator
                .reflect(query, &grounding.docs, &candidate, &outcome, &verdict)
                .await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_duplicates_match_anywhere_in_history() {
        let mut state = CycleState::new();
        state.push(ExecutionOutcome::success(json!({"a": 1, "b": 2})));
        state.push(ExecutionOutcome::failure("boom"));

        assert!(state.is_duplicate(&ExecutionOutcome::success(json!({"b": 2, "a": 1}))));
        assert!(state.is_duplicate(&ExecutionOutcome::failure("boom")));
        assert!(!state.is_duplicate(&ExecutionOutcome::success(json!("boom"))));
        assert_eq!(state.iteration_count(), 2);
    }

    #[test]
    fn test_best_of_history() {
        let mut state = CycleState::new();
        assert!(state.best().is_none());

        state.push(ExecutionOutcome::failure("short"));
        state.push(ExecutionOutcome::success(json!([1, 2, 3])));
        assert_eq!(state.best(), Some(&state.history()[1]));
    }

    #[test]
    fn test_terminal_accessors() {
        let passed = CycleTerminal::Passed(ExecutionOutcome::success(json!(1)));
        assert_eq!(passed.label(), "passed");
        assert!(!passed.is_aborted());
        assert_eq!(passed.outcome(), Some(&ExecutionOutcome::success(json!(1))));

        let aborted = CycleTerminal::AbortedDuplicate;
        assert!(aborted.is_aborted());
        assert!(aborted.into_outcome().is_none());
        assert_eq!(
            serde_json::to_value(CycleTerminal::AbortedDuplicate).unwrap(),
            json!({"state": "aborted_duplicate"})
        );
    }
}
