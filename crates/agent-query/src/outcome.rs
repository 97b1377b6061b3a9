//! Execution outcomes and how they are compared, previewed and ranked

use crate::prompts::Language;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Result of running one candidate snippet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The snippet ran; `value` is whatever it bound to `result`
    Success {
        /// Bound value, `null` when nothing was bound
        value: Value,
    },
    /// The snippet raised while compiling or running
    Failure {
        /// Error text reported by the sandbox
        error_message: String,
    },
}

impl ExecutionOutcome {
    /// Successful outcome
    pub fn success(value: Value) -> Self {
        Self::Success { value }
    }

    /// Failed outcome
    pub fn failure(error_message: impl Into<String>) -> Self {
        Self::Failure {
            error_message: error_message.into(),
        }
    }

    /// Whether the snippet ran without raising
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Bound value of a success
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Success { value } => Some(value),
            Self::Failure { .. } => None,
        }
    }

    /// Error text of a failure
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error_message } => Some(error_message),
        }
    }

    /// Form used for duplicate detection
    ///
    /// Compact JSON with object keys sorted at every level. A failure is
    /// rendered as `{"error": message}`, so it can never equal a success whose
    /// value is a plain string.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        match self {
            Self::Success { value } => write_canonical(value, &mut out),
            Self::Failure { error_message } => {
                write_canonical(&json!({ "error": error_message }), &mut out);
            }
        }
        out
    }

    /// Textual form shown to the LLM: strings unquoted, everything else as JSON
    pub fn text(&self) -> String {
        match self {
            Self::Success {
                value: Value::String(s),
            } => s.clone(),
            Self::Success { value } => value.to_string(),
            Self::Failure { error_message } => error_message.clone(),
        }
    }

    /// The first `limit` characters of [`text`](Self::text)
    pub fn preview(&self, limit: usize) -> String {
        truncate_chars(&self.text(), limit)
    }

    /// One-line description of the value's shape
    pub fn structure(&self, language: Language) -> String {
        match self {
            Self::Success { value } => describe_shape(value, language),
            Self::Failure { .. } => match language {
                Language::Chinese => "代码执行失败".to_string(),
                Language::English => "code execution failed".to_string(),
            },
        }
    }

    /// Ranking key for picking the best outcome of an exhausted cycle
    ///
    /// Non-null successes outrank failures. Among successes a collection
    /// outranks a scalar; collections compare by element count, scalars by
    /// serialized length. Failures compare by error length; a `null` success
    /// ranks with failures as if its text were empty.
    fn rank(&self) -> (u8, usize) {
        match self {
            Self::Success {
                value: Value::Array(items),
            } => (2, items.len()),
            Self::Success {
                value: Value::Object(fields),
            } => (2, fields.len()),
            Self::Success { value: Value::Null } => (0, 0),
            Self::Success { value } => (1, value.to_string().chars().count()),
            Self::Failure { error_message } => (0, error_message.chars().count()),
        }
    }
}

/// Pick the highest-ranked outcome; ties go to the earliest
pub fn select_best(history: &[ExecutionOutcome]) -> Option<&ExecutionOutcome> {
    let mut best: Option<(&ExecutionOutcome, (u8, usize))> = None;
    for outcome in history {
        let rank = outcome.rank();
        match best {
            Some((_, top)) if rank <= top => {}
            _ => best = Some((outcome, rank)),
        }
    }
    best.map(|(outcome, _)| outcome)
}

fn describe_shape(value: &Value, language: Language) -> String {
    let zh = language == Language::Chinese;
    match value {
        Value::Object(fields) => {
            let keys = join_keys(fields);
            if zh {
                format!("数据结构为字典，包含以下字段：{keys}")
            } else {
                format!("mapping with fields: {keys}")
            }
        }
        Value::Array(items) => match items.first() {
            None => {
                if zh {
                    "数据结构为空列表".to_string()
                } else {
                    "empty list".to_string()
                }
            }
            Some(Value::Object(fields)) => {
                let keys = join_keys(fields);
                if zh {
                    format!("数据结构为列表，每个元素为字典，包含以下字段：{keys}")
                } else {
                    format!("list of {} mappings with fields: {keys}", items.len())
                }
            }
            Some(sample) => {
                if zh {
                    format!("数据结构为列表，元素类型为：{}", type_name(sample))
                } else {
                    format!("list of {} {} values", items.len(), type_name(sample))
                }
            }
        },
        other => {
            if zh {
                format!("数据类型为：{}", type_name(other))
            } else {
                format!("value of type {}", type_name(other))
            }
        }
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(fields) => {
            let mut entries: Vec<_> = fields.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn join_keys(fields: &serde_json::Map<String, Value>) -> String {
    let mut keys: Vec<&str> = fields.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys.join(", ")
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Keep the first `limit` characters, never splitting a character
pub(crate) fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_form() {
        let a = ExecutionOutcome::success(json!({"b": 1, "a": [1, 2]}));
        let b = ExecutionOutcome::success(serde_json::from_str(r#"{"a":[1,2],"b":1}"#).unwrap());
        assert_eq!(a.canonical(), b.canonical());
        assert_eq!(a.canonical(), r#"{"a":[1,2],"b":1}"#);

        let failure = ExecutionOutcome::failure("boom");
        assert_eq!(failure.canonical(), r#"{"error":"boom"}"#);
        assert_ne!(
            failure.canonical(),
            ExecutionOutcome::success(json!("boom")).canonical()
        );
    }

    #[test]
    fn test_preview_counts_characters() {
        let outcome = ExecutionOutcome::success(json!("贵州茅台股价上涨"));
        assert_eq!(outcome.preview(4), "贵州茅台");
        assert_eq!(outcome.preview(100), "贵州茅台股价上涨");

        let failure = ExecutionOutcome::failure("NameError: name 'ak' is not defined");
        assert_eq!(failure.preview(9), "NameError");
    }

    #[test]
    fn test_structure_descriptions() {
        let mapping = ExecutionOutcome::success(json!({"price": 12.3, "code": "600519"}));
        assert_eq!(
            mapping.structure(Language::Chinese),
            "数据结构为字典，包含以下字段：code, price"
        );

        let rows = ExecutionOutcome::success(json!([{"date": "2024-05-13", "close": 1.0}]));
        assert_eq!(
            rows.structure(Language::English),
            "list of 1 mappings with fields: close, date"
        );

        assert_eq!(
            ExecutionOutcome::success(json!([])).structure(Language::Chinese),
            "数据结构为空列表"
        );
        assert_eq!(
            ExecutionOutcome::success(json!(3.5)).structure(Language::English),
            "value of type float"
        );
    }

    #[test]
    fn test_best_prefers_larger_collections() {
        let history = vec![
            ExecutionOutcome::failure("a much longer error message than anything else here"),
            ExecutionOutcome::success(json!([1, 2])),
            ExecutionOutcome::success(json!({"a": 1, "b": 2, "c": 3})),
            ExecutionOutcome::success(json!("scalar text that is long")),
        ];
        assert_eq!(select_best(&history), Some(&history[2]));
    }

    #[test]
    fn test_best_among_failures_is_longest_error() {
        let history = vec![
            ExecutionOutcome::failure("SyntaxError: invalid syntax"),
            ExecutionOutcome::failure("NameError: name 'pd' is not defined"),
        ];
        assert_eq!(select_best(&history), Some(&history[1]));
    }

    #[test]
    fn test_best_ties_go_to_first_seen() {
        let history = vec![
            ExecutionOutcome::failure("error one"),
            ExecutionOutcome::failure("error two"),
        ];
        assert_eq!(select_best(&history), Some(&history[0]));
        assert_eq!(select_best(&[]), None);
    }

    #[test]
    fn test_null_success_ranks_below_errors() {
        let history = vec![
            ExecutionOutcome::success(Value::Null),
            ExecutionOutcome::failure("KeyError: 'close'"),
        ];
        assert_eq!(select_best(&history), Some(&history[1]));
    }
}
