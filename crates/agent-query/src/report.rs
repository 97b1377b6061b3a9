//! Stock research reports built from resolved sections

use crate::error::Result;
use crate::prompts::{Language, PromptKind};
use crate::resolver::{QueryResolver, duplicate_abort_message};
use chrono::NaiveDate;
use futures::future::join_all;
use minijinja::context;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// The fixed questions a report is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    /// Company profile
    CompanyProfile,
    /// Valuation over the period
    Valuation,
    /// Share price trend over the period
    PriceTrend,
    /// News over the period
    News,
    /// Macro and market environment over the period
    Market,
}

impl SectionKind {
    /// Every section, in report order
    pub const ALL: [Self; 5] = [
        Self::CompanyProfile,
        Self::Valuation,
        Self::PriceTrend,
        Self::News,
        Self::Market,
    ];

    /// Heading of the section's data in the report prompt
    pub fn label(self, language: Language) -> &'static str {
        match language {
            Language::Chinese => match self {
                Self::CompanyProfile => "公司概况数据",
                Self::Valuation => "估值分析数据",
                Self::PriceTrend => "股票走势分析数据",
                Self::News => "新闻报告数据",
                Self::Market => "宏观市场环境数据",
            },
            Language::English => match self {
                Self::CompanyProfile => "Company profile data",
                Self::Valuation => "Valuation data",
                Self::PriceTrend => "Share price trend data",
                Self::News => "News data",
                Self::Market => "Macro market environment data",
            },
        }
    }

    fn prompt(self) -> PromptKind {
        match self {
            Self::CompanyProfile => PromptKind::SectionCompanyProfile,
            Self::Valuation => PromptKind::SectionValuation,
            Self::PriceTrend => PromptKind::SectionPriceTrend,
            Self::News => PromptKind::SectionNews,
            Self::Market => PromptKind::SectionMarket,
        }
    }
}

/// What resolving one section produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionData {
    /// Textual form of the resolved value
    Result(String),
    /// Why the section could not be resolved
    Error(String),
}

impl SectionData {
    /// Text placed in the report prompt
    pub fn text(&self) -> &str {
        match self {
            Self::Result(text) | Self::Error(text) => text,
        }
    }
}

/// One resolved section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionResult {
    /// Which question
    pub kind: SectionKind,
    /// The question as asked
    pub question: String,
    /// Result or error
    pub data: SectionData,
}

/// All sections of one stock over one period
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockAnalysis {
    /// Stock name as given by the user
    pub stock_name: String,
    /// First day of the period
    pub start_date: NaiveDate,
    /// Last day of the period
    pub end_date: NaiveDate,
    /// Sections in report order
    pub sections: Vec<SectionResult>,
}

#[derive(Serialize)]
struct SectionContext<'a> {
    label: &'a str,
    data: &'a str,
}

/// Resolves report sections and writes the report
pub struct StockAnalyzer {
    resolver: Arc<QueryResolver>,
}

impl StockAnalyzer {
    /// Create an analyzer over a shared resolver
    pub fn new(resolver: Arc<QueryResolver>) -> Self {
        Self { resolver }
    }

    /// Resolve every section for `stock_name` between `start_date` and `end_date`
    ///
    /// Sections resolve concurrently. A section that fails keeps its error
    /// text instead of failing the analysis.
    #[instrument(skip(self))]
    pub async fn analyze_stock(
        &self,
        stock_name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<StockAnalysis> {
        let start = start_date.format("%Y-%m-%d").to_string();
        let end = end_date.format("%Y-%m-%d").to_string();
        let prompts = self.resolver.prompts();

        let mut questions = Vec::with_capacity(SectionKind::ALL.len());
        for kind in SectionKind::ALL {
            let question = prompts.render(
                kind.prompt(),
                context! { stock => stock_name, start => &start, end => &end },
            )?;
            questions.push((kind, question));
        }

        let sections = join_all(
            questions
                .into_iter()
                .map(|(kind, question)| self.resolve_section(kind, question)),
        )
        .await;

        info!(
            failed = sections
                .iter()
                .filter(|s| matches!(s.data, SectionData::Error(_)))
                .count(),
            "Sections resolved"
        );

        Ok(StockAnalysis {
            stock_name: stock_name.to_string(),
            start_date,
            end_date,
            sections,
        })
    }

    async fn resolve_section(&self, kind: SectionKind, question: String) -> SectionResult {
        let limit = self.resolver.config().report_max_iterations;
        let data = match self.resolver.resolve_with_limit(&question, limit).await {
            Ok(resolution) => match resolution.outcome() {
                Some(outcome) => SectionData::Result(outcome.text()),
                None => SectionData::Error(
                    duplicate_abort_message(self.resolver.config().language).to_string(),
                ),
            },
            Err(err) => {
                warn!(section = ?kind, error = %err, "Section failed");
                SectionData::Error(err.to_string())
            }
        };
        SectionResult {
            kind,
            question,
            data,
        }
    }

    /// Ask the LLM for a markdown report over `analysis`
    #[instrument(skip_all, fields(stock = %analysis.stock_name))]
    pub async fn report(&self, analysis: &StockAnalysis) -> Result<String> {
        let prompts = self.resolver.prompts();
        let language = prompts.language();

        let sections: Vec<SectionContext<'_>> = analysis
            .sections
            .iter()
            .map(|s| SectionContext {
                label: s.kind.label(language),
                data: s.data.text(),
            })
            .collect();

        let system = prompts.render(PromptKind::ReportSystem, context! {})?;
        let body = prompts.render(
            PromptKind::StockReport,
            context! {
                stock => &analysis.stock_name,
                start => analysis.start_date.format("%Y-%m-%d").to_string(),
                end => analysis.end_date.format("%Y-%m-%d").to_string(),
                sections => sections,
            },
        )?;

        let settings = self.resolver.model_settings();
        let request = settings.request(vec![agent_llm::Message::user(body)], Some(system));
        let report = self.resolver.llm().complete(request).await?.into_text();
        info!(chars = report.chars().count(), "Report written");
        Ok(report)
    }
}
