//! Judge verdicts and their parser
//!
//! Judges are asked for `{"result": {"thoughts", "is_pass", "code_improve"}}`.
//! Models routinely wrap that in fences, add prose around it, leave trailing
//! commas, put raw newlines in strings or write Python literals, so parsing
//! runs a small repair pass first. Anything still not matching the shape is
//! a [`VerdictParseError`]; field values are never guessed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Why a judge response could not be turned into a [`Verdict`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerdictParseError {
    /// No `{ ... }` span in the response
    #[error("no JSON object found in judge response")]
    NoJson,

    /// The object did not parse even after repair
    #[error("malformed JSON: {0}")]
    Malformed(String),

    /// A required field is absent
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A field has the wrong JSON type
    #[error("field `{field}` must be a {expected}")]
    WrongType {
        /// Field name
        field: &'static str,
        /// Expected JSON type
        expected: &'static str,
    },

    /// A failing verdict with neither thoughts nor improvement notes
    #[error("failing verdict carries no improvement notes")]
    EmptyFeedback,
}

/// Structured pass/fail decision of the judge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the outcome answers the question
    pub is_pass: bool,
    /// The judge's reasoning
    pub thoughts: String,
    /// Suggested code changes; never empty on a failing verdict
    pub improvement_notes: String,
}

impl Verdict {
    /// Parse a raw judge response
    pub fn parse(response: &str) -> Result<Self, VerdictParseError> {
        let span = object_span(response).ok_or(VerdictParseError::NoJson)?;

        let root: Value = match serde_json::from_str(span) {
            Ok(value) => value,
            Err(_) => serde_json::from_str(&repair(span))
                .map_err(|e| VerdictParseError::Malformed(e.to_string()))?,
        };

        let result = root
            .get("result")
            .ok_or(VerdictParseError::MissingField("result"))?
            .as_object()
            .ok_or(VerdictParseError::WrongType {
                field: "result",
                expected: "object",
            })?;

        let is_pass = match result.get("is_pass") {
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                return Err(VerdictParseError::WrongType {
                    field: "is_pass",
                    expected: "boolean",
                });
            }
            None => return Err(VerdictParseError::MissingField("is_pass")),
        };
        let thoughts = string_field(result, "thoughts")?;
        let code_improve = string_field(result, "code_improve")?;

        let improvement_notes = if is_pass || !code_improve.trim().is_empty() {
            code_improve
        } else if !thoughts.trim().is_empty() {
            thoughts.clone()
        } else {
            return Err(VerdictParseError::EmptyFeedback);
        };

        Ok(Self {
            is_pass,
            thoughts,
            improvement_notes,
        })
    }

    /// Thoughts and improvement notes combined for the next reflection prompt
    pub fn feedback(&self) -> String {
        let thoughts = self.thoughts.trim();
        let notes = self.improvement_notes.trim();
        if thoughts.is_empty() || thoughts == notes {
            notes.to_string()
        } else if notes.is_empty() {
            thoughts.to_string()
        } else {
            format!("{thoughts}\n{notes}")
        }
    }
}

fn string_field(object: &Map<String, Value>, field: &'static str) -> Result<String, VerdictParseError> {
    match object.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(VerdictParseError::WrongType {
            field,
            expected: "string",
        }),
        None => Err(VerdictParseError::MissingField(field)),
    }
}

/// From the first `{` to the last `}`, which also drops code fences
fn object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Best-effort fix-up of near-JSON
///
/// Escapes raw control characters inside strings, drops trailing commas and
/// maps Python's `True`/`False`/`None` outside strings.
fn repair(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
            } else {
                match c {
                    '\\' => {
                        escaped = true;
                        out.push(c);
                    }
                    '"' => {
                        in_string = false;
                        out.push(c);
                    }
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    other => out.push(other),
                }
            }
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
                i += 1;
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some('}' | ']')) {
                    out.push(c);
                }
                i += 1;
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                });
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clean_pass() {
        let verdict = Verdict::parse(
            r#"{"result": {"thoughts": "数据完整", "is_pass": true, "code_improve": ""}}"#,
        )
        .unwrap();

        assert!(verdict.is_pass);
        assert_eq!(verdict.thoughts, "数据完整");
        assert_eq!(verdict.improvement_notes, "");
    }

    #[test]
    fn test_parse_fenced_with_prose() {
        let response = "Here is my verdict:\n```json\n{\"result\": {\"thoughts\": \"wrong date\", \"is_pass\": false, \"code_improve\": \"use 20240513\"}}\n```";
        let verdict = Verdict::parse(response).unwrap();

        assert!(!verdict.is_pass);
        assert_eq!(verdict.improvement_notes, "use 20240513");
        assert_eq!(verdict.feedback(), "wrong date\nuse 20240513");
    }

    #[test]
    fn test_repairs_near_json() {
        let response = "{\"result\": {\n  \"thoughts\": \"line one\nline two\",\n  \"is_pass\": False,\n  \"code_improve\": \"drop the\tfilter\",\n}}";
        let verdict = Verdict::parse(response).unwrap();

        assert!(!verdict.is_pass);
        assert_eq!(verdict.thoughts, "line one\nline two");
        assert_eq!(verdict.improvement_notes, "drop the\tfilter");
    }

    #[test]
    fn test_repair_leaves_strings_alone() {
        let repaired = repair(r#"{"a": "True, ]", "b": None,}"#);
        assert_eq!(repaired, r#"{"a": "True, ]", "b": null}"#);
    }

    #[test]
    fn test_empty_notes_fall_back_to_thoughts() {
        let verdict = Verdict::parse(
            r#"{"result": {"thoughts": "no rows returned", "is_pass": false, "code_improve": "  "}}"#,
        )
        .unwrap();
        assert_eq!(verdict.improvement_notes, "no rows returned");
        assert_eq!(verdict.feedback(), "no rows returned");
    }

    #[test]
    fn test_failing_verdict_without_feedback_is_rejected() {
        let err = Verdict::parse(
            r#"{"result": {"thoughts": "", "is_pass": false, "code_improve": ""}}"#,
        )
        .unwrap_err();
        assert_eq!(err, VerdictParseError::EmptyFeedback);
    }

    #[test]
    fn test_strict_shape_errors() {
        assert_eq!(
            Verdict::parse("looks good to me").unwrap_err(),
            VerdictParseError::NoJson
        );
        assert_eq!(
            Verdict::parse(r#"{"thoughts": "x", "is_pass": true, "code_improve": ""}"#)
                .unwrap_err(),
            VerdictParseError::MissingField("result")
        );
        assert_eq!(
            Verdict::parse(r#"{"result": {"thoughts": "x", "is_pass": "yes", "code_improve": ""}}"#)
                .unwrap_err(),
            VerdictParseError::WrongType {
                field: "is_pass",
                expected: "boolean"
            }
        );
        assert_eq!(
            Verdict::parse(r#"{"result": {"thoughts": "x", "is_pass": true}}"#).unwrap_err(),
            VerdictParseError::MissingField("code_improve")
        );
        assert!(matches!(
            Verdict::parse(r#"{"result": {"thoughts": "x" "is_pass"}}"#).unwrap_err(),
            VerdictParseError::Malformed(_)
        ));
    }
}
