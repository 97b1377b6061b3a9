//! Documentation retrieval
//!
//! Generation and judging are grounded on data-API documentation. A
//! [`Retriever`] ranks documents for a query and lists the topic titles the
//! rewriter may mention. Two indexes are provided: [`KeywordIndex`] works
//! offline, [`EmbeddingIndex`] ranks by embedding similarity.

mod embedding;
mod keyword;
mod loader;

pub use embedding::{EmbeddingIndex, MAX_EMBED_CHARS};
pub use keyword::KeywordIndex;
pub use loader::load_markdown_dir;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One documentation page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Path relative to the documentation root, `/`-separated
    pub path: String,
    /// First markdown heading, or the file stem
    pub title: String,
    /// Full page text
    pub text: String,
}

impl Document {
    /// Create a document
    pub fn new(path: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            title: title.into(),
            text: text.into(),
        }
    }
}

/// Ranked documentation search
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Snippets for `query`, best first
    async fn search(&self, query: &str) -> Result<Vec<String>>;

    /// Titles of every indexed topic
    async fn titles(&self) -> Result<Vec<String>>;
}

/// Documentation context gathered once per resolution call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grounding {
    /// Every topic title, for the rewriter
    pub titles: Vec<String>,
    /// Best-ranked snippets joined by newlines, for generation and judging
    pub docs: String,
}

impl Grounding {
    /// Search `retriever` for `question`, keeping at most `doc_limit` snippets
    pub async fn gather(retriever: &dyn Retriever, question: &str, doc_limit: usize) -> Result<Self> {
        let titles = retriever.titles().await?;
        let snippets = retriever.search(question).await?;
        debug!(titles = titles.len(), snippets = snippets.len(), doc_limit, "Gathered documentation");
        Ok(Self {
            titles,
            docs: snippets
                .into_iter()
                .take(doc_limit)
                .collect::<Vec<_>>()
                .join("\n"),
        })
    }
}

/// Titles of `documents` in order, without duplicates
pub(crate) fn unique_titles<'a>(documents: impl IntoIterator<Item = &'a Document>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    documents
        .into_iter()
        .filter(|doc| seen.insert(doc.title.as_str()))
        .map(|doc| doc.title.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::static_retriever;

    #[tokio::test]
    async fn test_grounding_keeps_doc_limit() {
        let retriever = static_retriever(&["股票行情"], &["one", "two", "three"]);
        let grounding = Grounding::gather(&retriever, "q", 2).await.unwrap();
        assert_eq!(grounding.titles, vec!["股票行情"]);
        assert_eq!(grounding.docs, "one\ntwo");
    }

    #[test]
    fn test_unique_titles_keep_order() {
        let docs = [
            Document::new("a.md", "股票行情", ""),
            Document::new("b.md", "个股信息", ""),
            Document::new("c.md", "股票行情", ""),
        ];
        assert_eq!(unique_titles(&docs), vec!["股票行情", "个股信息"]);
    }
}
