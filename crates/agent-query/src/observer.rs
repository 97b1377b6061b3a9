//! Observation hooks for the reflection loop
//!
//! The resolver reports every step of a call to a [`ReflectionObserver`].
//! Observers cannot influence the loop; they log, record or stream progress.

use crate::cycle::CycleTerminal;
use crate::extract::CandidateCode;
use crate::outcome::{ExecutionOutcome, truncate_chars};
use crate::query::Query;
use crate::verdict::Verdict;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

const DETAIL_CHARS: usize = 120;

/// Event handler for resolution steps
///
/// Every method has an empty default, so implementors override only the
/// events they care about.
#[async_trait]
pub trait ReflectionObserver: Send + Sync {
    /// The rewriter finished for cycle `attempt`
    async fn on_rewrite(&self, _attempt: usize, _query: &Query) {}

    /// A candidate was generated
    async fn on_candidate(&self, _candidate: &CandidateCode) {}

    /// A candidate was executed
    async fn on_outcome(&self, _iteration: usize, _outcome: &ExecutionOutcome) {}

    /// An outcome repeated one already in the cycle's history
    async fn on_duplicate(&self, _iteration: usize) {}

    /// The judge returned a verdict
    async fn on_verdict(&self, _iteration: usize, _verdict: &Verdict) {}

    /// Cycle `attempt` ended
    async fn on_cycle_end(&self, _attempt: usize, _terminal: &CycleTerminal) {}

    /// A fresh cycle `attempt` is starting after an aborted one
    async fn on_retry(&self, _attempt: usize) {}
}

/// Observer that ignores everything
pub struct NoOpObserver;

#[async_trait]
impl ReflectionObserver for NoOpObserver {}

/// Observer that emits `tracing` events
pub struct TracingObserver;

#[async_trait]
impl ReflectionObserver for TracingObserver {
    async fn on_rewrite(&self, attempt: usize, query: &Query) {
        info!(attempt, rewritten = %query.effective_text(), "Query rewritten");
    }

    async fn on_candidate(&self, candidate: &CandidateCode) {
        debug!(
            iteration = candidate.iteration,
            origin = ?candidate.origin,
            lines = candidate.source.lines().count(),
            "Candidate generated"
        );
    }

    async fn on_outcome(&self, iteration: usize, outcome: &ExecutionOutcome) {
        debug!(
            iteration,
            success = outcome.is_success(),
            preview = %outcome.preview(DETAIL_CHARS),
            "Candidate executed"
        );
    }

    async fn on_duplicate(&self, iteration: usize) {
        warn!(iteration, "Duplicate outcome, aborting cycle");
    }

    async fn on_verdict(&self, iteration: usize, verdict: &Verdict) {
        info!(iteration, is_pass = verdict.is_pass, thoughts = %verdict.thoughts, "Verdict received");
    }

    async fn on_cycle_end(&self, attempt: usize, terminal: &CycleTerminal) {
        info!(attempt, terminal = terminal.label(), "Cycle ended");
    }

    async fn on_retry(&self, attempt: usize) {
        info!(attempt, "Retrying with a fresh cycle");
    }
}

/// Step of a resolution call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStage {
    /// Query rewritten
    Rewrite,
    /// Candidate generated
    Candidate,
    /// Candidate executed
    Outcome,
    /// Duplicate outcome detected
    Duplicate,
    /// Verdict received
    Verdict,
    /// Cycle ended
    CycleEnd,
    /// Fresh cycle started
    Retry,
}

impl fmt::Display for TraceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rewrite => "rewrite",
            Self::Candidate => "candidate",
            Self::Outcome => "outcome",
            Self::Duplicate => "duplicate",
            Self::Verdict => "verdict",
            Self::CycleEnd => "cycle_end",
            Self::Retry => "retry",
        })
    }
}

/// One recorded step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    /// 1-based cycle number
    pub attempt: usize,
    /// 1-based iteration within the cycle, if the step belongs to one
    pub iteration: Option<usize>,
    /// What happened
    pub stage: TraceStage,
    /// Short human-readable detail
    pub detail: String,
}

#[derive(Default)]
struct Recording {
    attempt: usize,
    events: Vec<TraceEvent>,
}

/// Observer that keeps every event in memory
#[derive(Default)]
pub struct TraceRecorder {
    recording: Mutex<Recording>,
}

impl TraceRecorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far
    pub fn events(&self) -> Vec<TraceEvent> {
        self.lock().events.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recording> {
        self.recording.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, attempt: Option<usize>, iteration: Option<usize>, stage: TraceStage, detail: String) {
        let mut recording = self.lock();
        if let Some(attempt) = attempt {
            recording.attempt = attempt;
        }
        let attempt = recording.attempt.max(1);
        recording.events.push(TraceEvent {
            attempt,
            iteration,
            stage,
            detail: truncate_chars(&detail.replace('\n', " "), DETAIL_CHARS),
        });
    }
}

#[async_trait]
impl ReflectionObserver for TraceRecorder {
    async fn on_rewrite(&self, attempt: usize, query: &Query) {
        self.push(
            Some(attempt),
            None,
            TraceStage::Rewrite,
            query.effective_text().to_string(),
        );
    }

    async fn on_candidate(&self, candidate: &CandidateCode) {
        self.push(
            None,
            Some(candidate.iteration),
            TraceStage::Candidate,
            format!("{:?}, {} lines", candidate.origin, candidate.source.lines().count()),
        );
    }

    async fn on_outcome(&self, iteration: usize, outcome: &ExecutionOutcome) {
        let detail = match outcome {
            ExecutionOutcome::Success { .. } => format!("ok: {}", outcome.preview(DETAIL_CHARS)),
            ExecutionOutcome::Failure { error_message } => format!("error: {error_message}"),
        };
        self.push(None, Some(iteration), TraceStage::Outcome, detail);
    }

    async fn on_duplicate(&self, iteration: usize) {
        self.push(
            None,
            Some(iteration),
            TraceStage::Duplicate,
            "outcome already seen in this cycle".to_string(),
        );
    }

    async fn on_verdict(&self, iteration: usize, verdict: &Verdict) {
        let detail = if verdict.is_pass {
            format!("pass: {}", verdict.thoughts)
        } else {
            format!("fail: {}", verdict.improvement_notes)
        };
        self.push(None, Some(iteration), TraceStage::Verdict, detail);
    }

    async fn on_cycle_end(&self, attempt: usize, terminal: &CycleTerminal) {
        self.push(
            Some(attempt),
            None,
            TraceStage::CycleEnd,
            terminal.label().to_string(),
        );
    }

    async fn on_retry(&self, attempt: usize) {
        self.push(Some(attempt), None, TraceStage::Retry, format!("starting cycle {attempt}"));
    }
}
