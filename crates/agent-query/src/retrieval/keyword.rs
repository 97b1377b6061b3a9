//! In-memory keyword index

use super::{Document, Retriever, unique_titles};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashSet;

const DEFAULT_TOP_K: usize = 10;

/// Term-overlap ranking over loaded documents
///
/// Latin text is split into lowercase words, CJK text into single
/// characters plus adjacent pairs. A query term found in a title scores 2,
/// found in the body scores 1. Documents scoring 0 are never returned.
#[derive(Debug, Clone)]
pub struct KeywordIndex {
    documents: Vec<Document>,
    title_terms: Vec<HashSet<String>>,
    body_terms: Vec<HashSet<String>>,
    top_k: usize,
}

impl KeywordIndex {
    /// Index `documents`
    pub fn new(documents: Vec<Document>) -> Self {
        let title_terms = documents.iter().map(|d| tokenize(&d.title)).collect();
        let body_terms = documents.iter().map(|d| tokenize(&d.text)).collect();
        Self {
            documents,
            title_terms,
            body_terms,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Cap the number of results per search
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Number of indexed documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the index holds no documents
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn rank(&self, query: &str) -> Vec<&Document> {
        let query_terms = tokenize(query);
        let mut scored: Vec<(usize, usize)> = self
            .documents
            .iter()
            .enumerate()
            .filter_map(|(i, _)| {
                let score: usize = query_terms
                    .iter()
                    .map(|term| {
                        2 * usize::from(self.title_terms[i].contains(term))
                            + usize::from(self.body_terms[i].contains(term))
                    })
                    .sum();
                (score > 0).then_some((i, score))
            })
            .collect();

        // Stable sort keeps document order among equal scores.
        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored
            .into_iter()
            .take(self.top_k)
            .map(|(i, _)| &self.documents[i])
            .collect()
    }
}

#[async_trait]
impl Retriever for KeywordIndex {
    async fn search(&self, query: &str) -> Result<Vec<String>> {
        Ok(self.rank(query).into_iter().map(|d| d.text.clone()).collect())
    }

    async fn titles(&self) -> Result<Vec<String>> {
        Ok(unique_titles(&self.documents))
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c, '\u{3400}'..='\u{4dbf}' | '\u{4e00}'..='\u{9fff}' | '\u{f900}'..='\u{faff}')
}

fn tokenize(text: &str) -> HashSet<String> {
    let mut terms = HashSet::new();
    let mut word = String::new();
    let mut previous_cjk: Option<char> = None;

    let flush = |word: &mut String, terms: &mut HashSet<String>| {
        if word.chars().count() >= 2 || (!word.is_empty() && word.chars().all(|c| c.is_ascii_digit())) {
            terms.insert(std::mem::take(word));
        } else {
            word.clear();
        }
    };

    for c in text.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            word.push(c.to_ascii_lowercase());
            previous_cjk = None;
        } else if is_cjk(c) {
            flush(&mut word, &mut terms);
            terms.insert(c.to_string());
            if let Some(prev) = previous_cjk {
                terms.insert([prev, c].iter().collect());
            }
            previous_cjk = Some(c);
        } else {
            flush(&mut word, &mut terms);
            previous_cjk = None;
        }
    }
    flush(&mut word, &mut terms);

    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> KeywordIndex {
        KeywordIndex::new(vec![
            Document::new("macro.md", "宏观经济", "国内生产总值 GDP 季度数据"),
            Document::new(
                "spot.md",
                "股票行情",
                "接口: stock_zh_a_hist\n描述: 个股历史行情",
            ),
            Document::new("info.md", "个股信息", "接口: stock_individual_info_em"),
        ])
    }

    #[test]
    fn test_tokenize_mixed_text() {
        let terms = tokenize("A股 stock_zh_a_hist 行情");
        assert!(terms.contains("stock_zh_a_hist"));
        assert!(terms.contains("行情"));
        assert!(terms.contains("行"));
        assert!(terms.contains("股"));
        assert!(!terms.contains("a"));
    }

    #[tokio::test]
    async fn test_title_matches_rank_first() {
        let results = index().search("贵州茅台的股票行情").await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].contains("stock_zh_a_hist"));
        assert!(results[1].contains("stock_individual_info_em"));
    }

    #[tokio::test]
    async fn test_no_overlap_no_results() {
        let results = index().search("weather tomorrow").await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_top_k_and_titles() {
        let index = index().with_top_k(1);
        assert_eq!(index.search("股票行情 个股").await.unwrap().len(), 1);
        assert_eq!(
            index.titles().await.unwrap(),
            vec!["宏观经济", "股票行情", "个股信息"]
        );
        assert_eq!(index.len(), 3);
    }
}
