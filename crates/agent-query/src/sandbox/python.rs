//! Python subprocess sandbox
//!
//! Each snippet runs in its own interpreter process. The source is fed on
//! stdin to a small runner which executes it in a fresh namespace, converts
//! `result` to JSON and writes one JSON object to stdout. Anything the
//! snippet prints goes to stderr so it cannot corrupt that object.

use super::{CodeSandbox, Namespace, RESULT_BINDING, SandboxError};
use crate::config::QueryConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

const RUNNER: &str = r#"
import datetime
import decimal
import json
import math
import sys
import traceback

source = sys.stdin.read()
channel = sys.stdout
sys.stdout = sys.stderr


def to_json(value, depth=0):
    if depth > 64:
        return repr(value)
    if value is None or isinstance(value, (bool, int, str)):
        return value
    if isinstance(value, float):
        return value if math.isfinite(value) else None
    if isinstance(value, decimal.Decimal):
        return to_json(float(value), depth + 1)
    if isinstance(value, (datetime.datetime, datetime.date, datetime.time)):
        return value.isoformat()
    if isinstance(value, dict):
        return {str(k): to_json(v, depth + 1) for k, v in value.items()}
    if isinstance(value, (list, tuple, set, frozenset)):
        return [to_json(v, depth + 1) for v in value]
    if hasattr(value, "columns") and callable(getattr(value, "to_dict", None)):
        return to_json(value.to_dict(orient="records"), depth + 1)
    if callable(getattr(value, "to_dict", None)):
        return to_json(value.to_dict(), depth + 1)
    if callable(getattr(value, "tolist", None)):
        return to_json(value.tolist(), depth + 1)
    if callable(getattr(value, "item", None)):
        try:
            return to_json(value.item(), depth + 1)
        except Exception:
            pass
    if callable(getattr(value, "isoformat", None)):
        return value.isoformat()
    return repr(value)


namespace = {"__name__": "__main__"}
try:
    exec(compile(source, "<candidate>", "exec"), namespace)
    bindings = {}
    if "result" in namespace:
        bindings["result"] = to_json(namespace["result"])
    payload = {"ok": True, "bindings": bindings}
except BaseException as exc:
    payload = {"ok": False, "error": "".join(traceback.format_exception_only(type(exc), exc)).strip()}

channel.write(json.dumps(payload, ensure_ascii=False))
channel.flush()
"#;

#[derive(Debug, Deserialize)]
struct RunnerReport {
    ok: bool,
    #[serde(default)]
    bindings: Namespace,
    #[serde(default)]
    error: String,
}

/// Sandbox that runs snippets with a local Python interpreter
#[derive(Debug, Clone)]
pub struct PythonSandbox {
    python: String,
    timeout: Duration,
    cwd: Option<PathBuf>,
}

impl PythonSandbox {
    /// Create a sandbox using `python` with a per-snippet timeout
    pub fn new(python: impl Into<String>, timeout: Duration) -> Self {
        Self {
            python: python.into(),
            timeout,
            cwd: None,
        }
    }

    /// Create from query configuration
    pub fn from_config(config: &QueryConfig) -> Self {
        Self::new(config.python.clone(), config.sandbox_timeout)
    }

    /// Run snippets in `dir`
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Interpreter command
    pub fn python(&self) -> &str {
        &self.python
    }
}

impl Default for PythonSandbox {
    fn default() -> Self {
        Self::from_config(&QueryConfig::default())
    }
}

#[async_trait]
impl CodeSandbox for PythonSandbox {
    async fn execute(&self, source: &str) -> Result<Namespace, SandboxError> {
        let mut command = Command::new(&self.python);
        command
            .arg("-c")
            .arg(RUNNER)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|e| {
            SandboxError::Unavailable(format!("failed to spawn '{}': {e}", self.python))
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SandboxError::Unavailable("failed to open stdin".to_string()))?;
        stdin
            .write_all(source.as_bytes())
            .await
            .map_err(|e| SandboxError::Unavailable(format!("failed to write source: {e}")))?;
        drop(stdin);

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output
                .map_err(|e| SandboxError::Unavailable(format!("failed to collect output: {e}")))?,
            Err(_) => {
                warn!(timeout = ?self.timeout, "Snippet timed out");
                return Err(SandboxError::Execution(format!(
                    "TimeoutError: execution exceeded {} seconds",
                    self.timeout.as_secs_f64()
                )));
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!(output = %stderr.trim(), "Snippet output");
        }

        let report: RunnerReport = match serde_json::from_slice(&output.stdout) {
            Ok(report) => report,
            Err(_) if !output.status.success() => {
                // The interpreter died before the runner could report.
                let tail = stderr.trim().lines().last().unwrap_or("").to_string();
                return Err(SandboxError::Execution(if tail.is_empty() {
                    format!("process exited with {}", output.status)
                } else {
                    tail
                }));
            }
            Err(e) => {
                return Err(SandboxError::Unavailable(format!(
                    "unreadable runner report: {e}"
                )));
            }
        };

        if report.ok {
            debug!(bound = report.bindings.contains_key(RESULT_BINDING), "Runner finished");
            Ok(report.bindings)
        } else {
            Err(SandboxError::Execution(report.error))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .is_ok_and(|out| out.status.success())
    }

    fn sandbox() -> PythonSandbox {
        PythonSandbox::new("python3", Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_binds_result() {
        if !python_available() {
            return;
        }
        let namespace = sandbox()
            .execute("rows = [{'close': 1.5}, {'close': 2}]\nresult = {'rows': rows, 'n': len(rows)}")
            .await
            .unwrap();

        assert_eq!(
            namespace.get("result"),
            Some(&json!({"rows": [{"close": 1.5}, {"close": 2}], "n": 2}))
        );
        assert!(!namespace.contains_key("rows"));
    }

    #[tokio::test]
    async fn test_printing_does_not_corrupt_report() {
        if !python_available() {
            return;
        }
        let namespace = sandbox()
            .execute("print('{not json')\nresult = 'ok'")
            .await
            .unwrap();
        assert_eq!(namespace.get("result"), Some(&Value::String("ok".to_string())));
    }

    #[tokio::test]
    async fn test_converts_dates_and_non_finite_floats() {
        if !python_available() {
            return;
        }
        let namespace = sandbox()
            .execute("import datetime\nresult = [datetime.date(2024, 5, 13), float('nan'), (1, 2)]")
            .await
            .unwrap();
        assert_eq!(namespace.get("result"), Some(&json!(["2024-05-13", null, [1, 2]])));
    }

    #[tokio::test]
    async fn test_unbound_result() {
        if !python_available() {
            return;
        }
        let namespace = sandbox().execute("x = 1").await.unwrap();
        assert!(namespace.is_empty());
    }

    #[tokio::test]
    async fn test_raised_error() {
        if !python_available() {
            return;
        }
        let err = sandbox().execute("result = 1 / 0").await.unwrap_err();
        assert_eq!(
            err,
            SandboxError::Execution("ZeroDivisionError: division by zero".to_string())
        );

        let err = sandbox().execute("result = (").await.unwrap_err();
        assert!(matches!(err, SandboxError::Execution(msg) if msg.contains("SyntaxError")));
    }

    #[tokio::test]
    async fn test_timeout_is_an_execution_error() {
        if !python_available() {
            return;
        }
        let err = PythonSandbox::new("python3", Duration::from_millis(300))
            .execute("import time\ntime.sleep(10)\nresult = 1")
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Execution(msg) if msg.starts_with("TimeoutError")));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_unavailable() {
        let err = PythonSandbox::new("definitely-not-a-python-binary", Duration::from_secs(1))
            .execute("result = 1")
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Unavailable(_)));
    }
}
