//! Deterministic collaborators for unit tests

use crate::retrieval::MockRetriever;
use crate::sandbox::{CodeSandbox, Namespace, SandboxError};
use agent_llm::{
    CompletionRequest, CompletionResponse, LLMError, LLMProvider, Message, StopReason,
    TokenStream, TokenUsage,
};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use futures::stream;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Monday 2024-05-13 10:00:00
pub(crate) fn monday() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 13)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

/// Retriever returning the same titles and snippets for every query
pub(crate) fn static_retriever(titles: &[&str], snippets: &[&str]) -> MockRetriever {
    let titles: Vec<String> = titles.iter().map(ToString::to_string).collect();
    let snippets: Vec<String> = snippets.iter().map(ToString::to_string).collect();
    let mut retriever = MockRetriever::new();
    retriever
        .expect_titles()
        .returning(move || Ok(titles.clone()));
    retriever
        .expect_search()
        .returning(move |_| Ok(snippets.clone()));
    retriever
}

/// LLM that replays queued replies in order
///
/// Streaming splits a reply into three-character chunks. Running out of
/// replies is an error so tests notice unexpected calls.
#[derive(Default)]
pub(crate) struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub(crate) fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::default();
        for reply in replies {
            provider.push(reply);
        }
        provider
    }

    pub(crate) fn push(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
    }

    pub(crate) fn push_error(&self, message: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Err(message.into()));
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Last message of every request
    pub(crate) fn prompts(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|r| r.messages.last().map(|m| m.content.clone()))
            .collect()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }

    fn next(&self, request: CompletionRequest) -> agent_llm::Result<String> {
        self.requests.lock().unwrap().push(request);
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(LLMError::RequestFailed(message)),
            None => Err(LLMError::UnexpectedResponse(
                "scripted replies exhausted".to_string(),
            )),
        }
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> agent_llm::Result<CompletionResponse> {
        Ok(CompletionResponse {
            message: Message::assistant(self.next(request)?),
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
        })
    }

    async fn stream(&self, request: CompletionRequest) -> agent_llm::Result<TokenStream> {
        let reply = self.next(request)?;
        let chars: Vec<char> = reply.chars().collect();
        let chunks: Vec<agent_llm::Result<String>> = chars
            .chunks(3)
            .map(|chunk| Ok(chunk.iter().collect()))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Sandbox answering from a table keyed by exact source text
///
/// A source missing from the table raises a `NameError`.
#[derive(Default)]
pub(crate) struct ScriptedSandbox {
    results: HashMap<String, Result<Value, String>>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedSandbox {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn binds(mut self, source: &str, value: Value) -> Self {
        self.results.insert(source.to_string(), Ok(value));
        self
    }

    pub(crate) fn raises(mut self, source: &str, error: &str) -> Self {
        self.results
            .insert(source.to_string(), Err(error.to_string()));
        self
    }

    pub(crate) fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodeSandbox for ScriptedSandbox {
    async fn execute(&self, source: &str) -> Result<Namespace, SandboxError> {
        self.executed.lock().unwrap().push(source.to_string());
        match self.results.get(source) {
            Some(Ok(value)) => {
                let mut namespace = Namespace::new();
                namespace.insert("result".to_string(), value.clone());
                Ok(namespace)
            }
            Some(Err(error)) => Err(SandboxError::Execution(error.clone())),
            None => Err(SandboxError::Execution(format!(
                "NameError: unscripted source {source:?}"
            ))),
        }
    }
}

/// Wrap a snippet in a python fence, as a model would reply
pub(crate) fn fenced(source: &str) -> String {
    format!("```python\n{source}\n```")
}

/// Judge reply in the expected JSON shape
pub(crate) fn verdict_reply(is_pass: bool, thoughts: &str, code_improve: &str) -> String {
    serde_json::json!({
        "result": {
            "thoughts": thoughts,
            "is_pass": is_pass,
            "code_improve": code_improve,
        }
    })
    .to_string()
}
