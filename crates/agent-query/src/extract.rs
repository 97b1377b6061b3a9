//! Candidate code and extraction from LLM responses

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

// An info string ends at the first newline; a one-line fence only drops a
// leading Python tag.
static FENCED_BLOCK: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:[^\s`]*[ \t]*\r?\n|(?i:python3?|py)[ \t]+)?(.*?)```").ok()
});

/// Which generator mode produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeOrigin {
    /// First candidate of a cycle
    Initial,
    /// Revision driven by judge feedback
    Reflection,
}

/// Snippet proposed by the generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCode {
    /// Executable source
    pub source: String,
    /// 1-based iteration within the cycle
    pub iteration: usize,
    /// Generator mode
    pub origin: CodeOrigin,
}

impl CandidateCode {
    /// Build a candidate from a raw LLM response
    pub fn from_response(response: &str, iteration: usize, origin: CodeOrigin) -> Self {
        Self {
            source: extract_code(response),
            iteration,
            origin,
        }
    }
}

/// Pull the first fenced code block out of a response
///
/// Any info string is accepted (```` ```python3 ````, ```` ```py ````, bare
/// fences), as are one-line fences. Without a fence the whole response is
/// taken as code.
pub fn extract_code(response: &str) -> String {
    FENCED_BLOCK
        .as_ref()
        .and_then(|re| re.captures(response))
        .and_then(|caps| caps.get(1))
        .map_or(response, |m| m.as_str())
        .trim()
        .to_string()
}
