//! The question being resolved and the time it was asked

use crate::prompts::Language;
use chrono::{Datelike, Local, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Source of "now" for prompts
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Wall clock in local time
pub fn system_clock() -> Clock {
    Arc::new(|| Local::now().naive_local())
}

/// Clock frozen at `at`
pub fn fixed_clock(at: NaiveDateTime) -> Clock {
    Arc::new(move || at)
}

/// Timestamp plus weekday, e.g. `2024-05-13 10:00:00 星期一`
pub fn format_issued_at(at: NaiveDateTime, language: Language) -> String {
    let weekday = weekday_name(at.weekday(), language);
    format!("{} {}", at.format("%Y-%m-%d %H:%M:%S"), weekday)
}

fn weekday_name(day: Weekday, language: Language) -> &'static str {
    match language {
        Language::Chinese => match day {
            Weekday::Mon => "星期一",
            Weekday::Tue => "星期二",
            Weekday::Wed => "星期三",
            Weekday::Thu => "星期四",
            Weekday::Fri => "星期五",
            Weekday::Sat => "星期六",
            Weekday::Sun => "星期日",
        },
        Language::English => match day {
            Weekday::Mon => "Monday",
            Weekday::Tue => "Tuesday",
            Weekday::Wed => "Wednesday",
            Weekday::Thu => "Thursday",
            Weekday::Fri => "Friday",
            Weekday::Sat => "Saturday",
            Weekday::Sun => "Sunday",
        },
    }
}

/// A question for one resolution call
///
/// `rewritten_text` is replaced at the start of every cycle and reused by all
/// iterations of that cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// The question as asked
    pub raw_text: String,
    /// Normalized description from the latest rewrite
    pub rewritten_text: Option<String>,
    /// Timestamp-plus-weekday bounding temporal reasoning
    pub issued_at: String,
}

impl Query {
    /// Create a query stamped with `issued_at`
    pub fn new(raw_text: impl Into<String>, issued_at: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            rewritten_text: None,
            issued_at: issued_at.into(),
        }
    }

    /// Create a query stamped from a clock
    pub fn at(raw_text: impl Into<String>, clock: &Clock, language: Language) -> Self {
        Self::new(raw_text, format_issued_at(clock(), language))
    }

    /// Rewritten text, falling back to the raw question before any rewrite
    pub fn effective_text(&self) -> &str {
        self.rewritten_text.as_deref().unwrap_or(&self.raw_text)
    }
}
