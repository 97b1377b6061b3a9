//! Query rewriting

use crate::error::Result;
use crate::model::ModelSettings;
use crate::prompts::{PromptKind, PromptLibrary};
use crate::query::Query;
use agent_llm::LLMProvider;
use minijinja::context;
use std::sync::Arc;
use tracing::debug;

/// Normalizes a raw question into topics, subject and a bounded time range
///
/// One LLM call per cycle. The reply is taken as-is: there is no retry and
/// no validation, so a malformed reply simply flows into generation.
pub struct QueryRewriter {
    llm: Arc<dyn LLMProvider>,
    prompts: Arc<PromptLibrary>,
    settings: ModelSettings,
}

impl QueryRewriter {
    /// Create a rewriter
    pub fn new(llm: Arc<dyn LLMProvider>, prompts: Arc<PromptLibrary>, settings: ModelSettings) -> Self {
        Self {
            llm,
            prompts,
            settings,
        }
    }

    /// Rewrite `query` against the available topic `titles`
    pub async fn rewrite(&self, query: &Query, titles: &[String]) -> Result<String> {
        let prompt = self.prompts.render(
            PromptKind::Rewrite,
            context! {
                question => &query.raw_text,
                titles => titles,
                current_time => &query.issued_at,
            },
        )?;

        let rewritten = self.settings.ask(self.llm.as_ref(), prompt).await?;
        debug!(rewritten = %rewritten, "Rewrite reply");
        Ok(rewritten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryConfig;
    use crate::prompts::Language;
    use crate::testing::ScriptedProvider;

    fn rewriter(llm: Arc<ScriptedProvider>) -> QueryRewriter {
        QueryRewriter::new(
            llm,
            Arc::new(PromptLibrary::new(Language::Chinese).unwrap()),
            ModelSettings::from_config(&QueryConfig::default()),
        )
    }

    #[tokio::test]
    async fn test_rewrite_prompt_and_reply() {
        let llm = Arc::new(ScriptedProvider::new([
            "  需要用到的数据是：股票行情\n查询对象：贵州茅台（600519） ",
        ]));
        let query = Query::new("茅台最近怎么样", "2024-05-13 10:00:00 星期一");

        let rewritten = rewriter(llm.clone())
            .rewrite(&query, &["股票行情".to_string(), "个股信息".to_string()])
            .await
            .unwrap();

        assert_eq!(
            rewritten,
            "  需要用到的数据是：股票行情\n查询对象：贵州茅台（600519） "
        );
        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("茅台最近怎么样"));
        assert!(prompt.contains("股票行情、个股信息"));
        assert!(prompt.contains("2024-05-13 10:00:00 星期一"));
    }

    #[tokio::test]
    async fn test_empty_reply_passes_through() {
        let llm = Arc::new(ScriptedProvider::new([""]));
        let query = Query::new("q", "now");
        assert_eq!(rewriter(llm).rewrite(&query, &[]).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let llm = Arc::new(ScriptedProvider::default());
        llm.push_error("connection reset");
        let query = Query::new("q", "now");
        assert!(rewriter(llm).rewrite(&query, &[]).await.is_err());
    }
}
