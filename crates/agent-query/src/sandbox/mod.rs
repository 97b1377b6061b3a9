//! Execution of generated code
//!
//! A [`CodeSandbox`] runs one snippet in a fresh namespace and reports the
//! bindings it left behind. [`run_candidate`] turns that into an
//! [`ExecutionOutcome`]: anything the snippet raised becomes a failure value
//! for the judge, while a runner that cannot be used at all ends the call.

mod python;

pub use python::PythonSandbox;

use crate::error::{QueryError, Result};
use crate::extract::CandidateCode;
use crate::outcome::ExecutionOutcome;
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Name the snippet must bind its answer to
pub const RESULT_BINDING: &str = "result";

/// Top-level bindings left by a snippet
pub type Namespace = Map<String, Value>;

/// Sandbox errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SandboxError {
    /// The snippet failed to compile or raised while running
    #[error("{0}")]
    Execution(String),

    /// The runner could not be started or spoke an unknown protocol
    #[error("sandbox unavailable: {0}")]
    Unavailable(String),
}

/// Runs a snippet in a fresh, isolated namespace
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CodeSandbox: Send + Sync {
    /// Execute `source` and return its top-level bindings
    async fn execute(&self, source: &str) -> std::result::Result<Namespace, SandboxError>;
}

/// Execute a candidate and classify the result
///
/// A snippet that ran but never bound `result` is a success with a `null`
/// value.
pub async fn run_candidate(
    sandbox: &dyn CodeSandbox,
    candidate: &CandidateCode,
) -> Result<ExecutionOutcome> {
    match sandbox.execute(&candidate.source).await {
        Ok(mut namespace) => {
            let value = namespace.remove(RESULT_BINDING).unwrap_or(Value::Null);
            debug!(iteration = candidate.iteration, bound = !value.is_null(), "Candidate executed");
            Ok(ExecutionOutcome::success(value))
        }
        Err(SandboxError::Execution(message)) => {
            debug!(iteration = candidate.iteration, error = %message, "Candidate raised");
            Ok(ExecutionOutcome::failure(message))
        }
        Err(SandboxError::Unavailable(reason)) => {
            warn!(reason = %reason, "Sandbox unavailable");
            Err(QueryError::Sandbox(reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::CodeOrigin;
    use serde_json::json;

    fn candidate(source: &str) -> CandidateCode {
        CandidateCode {
            source: source.to_string(),
            iteration: 1,
            origin: CodeOrigin::Initial,
        }
    }

    #[tokio::test]
    async fn test_bound_result_becomes_success() {
        let mut sandbox = MockCodeSandbox::new();
        sandbox
            .expect_execute()
            .withf(|source| source == "result = [1, 2]")
            .times(1)
            .returning(|_| {
                let mut namespace = Namespace::new();
                namespace.insert("result".to_string(), json!([1, 2]));
                namespace.insert("helper".to_string(), json!("ignored"));
                Ok(namespace)
            });

        let outcome = run_candidate(&sandbox, &candidate("result = [1, 2]"))
            .await
            .unwrap();
        assert_eq!(outcome, ExecutionOutcome::success(json!([1, 2])));
    }

    #[tokio::test]
    async fn test_missing_binding_is_null_success() {
        let mut sandbox = MockCodeSandbox::new();
        sandbox.expect_execute().returning(|_| Ok(Namespace::new()));

        let outcome = run_candidate(&sandbox, &candidate("x = 1")).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::success(Value::Null));
    }

    #[tokio::test]
    async fn test_raised_error_becomes_failure() {
        let mut sandbox = MockCodeSandbox::new();
        sandbox.expect_execute().returning(|_| {
            Err(SandboxError::Execution(
                "ZeroDivisionError: division by zero".to_string(),
            ))
        });

        let outcome = run_candidate(&sandbox, &candidate("result = 1 / 0"))
            .await
            .unwrap();
        assert_eq!(
            outcome.error_message(),
            Some("ZeroDivisionError: division by zero")
        );
    }

    #[tokio::test]
    async fn test_unavailable_sandbox_propagates() {
        let mut sandbox = MockCodeSandbox::new();
        sandbox
            .expect_execute()
            .returning(|_| Err(SandboxError::Unavailable("python3 not found".to_string())));

        let err = run_candidate(&sandbox, &candidate("result = 1"))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Sandbox(reason) if reason == "python3 not found"));
    }
}
