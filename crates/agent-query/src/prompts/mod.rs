//! Prompt templates for every LLM call made by the query loop
//!
//! Templates are MiniJinja sources kept per language. A [`PromptLibrary`]
//! compiles the set for one language up front, so a malformed template fails
//! at construction instead of in the middle of a resolution call.

mod en;
mod zh;

use crate::{QueryError, Result};
use minijinja::{Environment, UndefinedBehavior};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Language used for prompts and notes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    /// English
    #[serde(rename = "en")]
    English,
    /// Chinese (Simplified)
    #[default]
    #[serde(rename = "zh")]
    Chinese,
}

impl Language {
    /// ISO 639-1 code
    pub fn code(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Chinese => "zh",
        }
    }

    /// Parse from ISO 639-1 code or common name
    pub fn from_code(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "en" | "english" => Some(Self::English),
            "zh" | "chinese" | "中文" | "zh-cn" | "zh-hans" => Some(Self::Chinese),
            _ => None,
        }
    }
}

impl FromStr for Language {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_code(s)
            .ok_or_else(|| QueryError::Config(format!("unsupported language '{s}'")))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Every template the crate renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    /// Normalize a raw question (vars: question, titles, current_time)
    Rewrite,
    /// First code generation of a cycle (vars: question, rewritten, docs, current_time)
    WriteCode,
    /// Revised code generation (vars: docs, history_code, current_result, feedback, current_time)
    ReflectCode,
    /// Result verification (vars: question, docs, structure, failed, current_result, current_code)
    Judge,
    /// System half of the needs-data classification
    NeedDataSystem,
    /// User half of the needs-data classification (vars: question)
    NeedDataUser,
    /// Temporary assistant note carrying resolved data (vars: result)
    DataNote,
    /// Temporary assistant note carrying a resolution error (vars: error)
    ErrorNote,
    /// Pinned system message for report-backed chat (vars: report)
    ReportChatSystem,
    /// Question scoped to one stock (vars: stock, question)
    ScopedQuestion,
    /// System prompt of the report writer
    ReportSystem,
    /// Report body (vars: stock, start, end, sections)
    StockReport,
    /// Section question (vars: stock)
    SectionCompanyProfile,
    /// Section question (vars: stock, start, end)
    SectionValuation,
    /// Section question (vars: stock, start, end)
    SectionPriceTrend,
    /// Section question (vars: stock, start, end)
    SectionNews,
    /// Section question (vars: start, end)
    SectionMarket,
}

impl PromptKind {
    /// All template kinds
    pub const ALL: [Self; 17] = [
        Self::Rewrite,
        Self::WriteCode,
        Self::ReflectCode,
        Self::Judge,
        Self::NeedDataSystem,
        Self::NeedDataUser,
        Self::DataNote,
        Self::ErrorNote,
        Self::ReportChatSystem,
        Self::ScopedQuestion,
        Self::ReportSystem,
        Self::StockReport,
        Self::SectionCompanyProfile,
        Self::SectionValuation,
        Self::SectionPriceTrend,
        Self::SectionNews,
        Self::SectionMarket,
    ];

    /// Template name
    pub fn name(self) -> &'static str {
        match self {
            Self::Rewrite => "rewrite",
            Self::WriteCode => "write_code",
            Self::ReflectCode => "reflect_code",
            Self::Judge => "judge",
            Self::NeedDataSystem => "need_data_system",
            Self::NeedDataUser => "need_data_user",
            Self::DataNote => "data_note",
            Self::ErrorNote => "error_note",
            Self::ReportChatSystem => "report_chat_system",
            Self::ScopedQuestion => "scoped_question",
            Self::ReportSystem => "report_system",
            Self::StockReport => "stock_report",
            Self::SectionCompanyProfile => "section_company_profile",
            Self::SectionValuation => "section_valuation",
            Self::SectionPriceTrend => "section_price_trend",
            Self::SectionNews => "section_news",
            Self::SectionMarket => "section_market",
        }
    }

    fn source(self, language: Language) -> &'static str {
        match language {
            Language::Chinese => match self {
                Self::Rewrite => zh::REWRITE,
                Self::WriteCode => zh::WRITE_CODE,
                Self::ReflectCode => zh::REFLECT_CODE,
                Self::Judge => zh::JUDGE,
                Self::NeedDataSystem => zh::NEED_DATA_SYSTEM,
                Self::NeedDataUser => zh::NEED_DATA_USER,
                Self::DataNote => zh::DATA_NOTE,
                Self::ErrorNote => zh::ERROR_NOTE,
                Self::ReportChatSystem => zh::REPORT_CHAT_SYSTEM,
                Self::ScopedQuestion => zh::SCOPED_QUESTION,
                Self::ReportSystem => zh::REPORT_SYSTEM,
                Self::StockReport => zh::STOCK_REPORT,
                Self::SectionCompanyProfile => zh::SECTION_COMPANY_PROFILE,
                Self::SectionValuation => zh::SECTION_VALUATION,
                Self::SectionPriceTrend => zh::SECTION_PRICE_TREND,
                Self::SectionNews => zh::SECTION_NEWS,
                Self::SectionMarket => zh::SECTION_MARKET,
            },
            Language::English => match self {
                Self::Rewrite => en::REWRITE,
                Self::WriteCode => en::WRITE_CODE,
                Self::ReflectCode => en::REFLECT_CODE,
                Self::Judge => en::JUDGE,
                Self::NeedDataSystem => en::NEED_DATA_SYSTEM,
                Self::NeedDataUser => en::NEED_DATA_USER,
                Self::DataNote => en::DATA_NOTE,
                Self::ErrorNote => en::ERROR_NOTE,
                Self::ReportChatSystem => en::REPORT_CHAT_SYSTEM,
                Self::ScopedQuestion => en::SCOPED_QUESTION,
                Self::ReportSystem => en::REPORT_SYSTEM,
                Self::StockReport => en::STOCK_REPORT,
                Self::SectionCompanyProfile => en::SECTION_COMPANY_PROFILE,
                Self::SectionValuation => en::SECTION_VALUATION,
                Self::SectionPriceTrend => en::SECTION_PRICE_TREND,
                Self::SectionNews => en::SECTION_NEWS,
                Self::SectionMarket => en::SECTION_MARKET,
            },
        }
    }
}

/// Compiled templates for one language
pub struct PromptLibrary {
    env: Environment<'static>,
    language: Language,
}

impl PromptLibrary {
    /// Compile every template for `language`
    pub fn new(language: Language) -> Result<Self> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        for kind in PromptKind::ALL {
            env.add_template(kind.name(), kind.source(language))?;
        }

        Ok(Self { env, language })
    }

    /// Language of the compiled templates
    pub fn language(&self) -> Language {
        self.language
    }

    /// Render a template; surrounding whitespace is trimmed
    pub fn render<S: Serialize>(&self, kind: PromptKind, ctx: S) -> Result<String> {
        let rendered = self.env.get_template(kind.name())?.render(ctx)?;
        Ok(rendered.trim().to_string())
    }
}

impl fmt::Debug for PromptLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptLibrary")
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}
