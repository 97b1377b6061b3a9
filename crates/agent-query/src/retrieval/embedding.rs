//! Embedding similarity index
//!
//! Every document is embedded once through the LLM adapter and ranked
//! against the query embedding by cosine similarity. The index can be saved
//! as JSON; loading it back re-embeds only documents whose text changed.
//! A saved index from another embedding model is discarded.

use super::{Document, Retriever, unique_titles};
use crate::error::{QueryError, Result};
use crate::outcome::truncate_chars;
use agent_llm::EmbeddingProvider;
use async_trait::async_trait;
use cached::{Cached, TimedCache};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Characters of a document sent to the embedding endpoint
pub const MAX_EMBED_CHARS: usize = 5120;

const EMBED_BATCH: usize = 16;
const DEFAULT_TOP_K: usize = 10;
const DEFAULT_QUERY_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    #[serde(flatten)]
    document: Document,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct SavedIndexRef<'a> {
    model: &'a str,
    dimension: usize,
    entries: &'a [Entry],
}

#[derive(Deserialize)]
struct SavedIndex {
    #[serde(default)]
    model: String,
    #[serde(default)]
    dimension: usize,
    entries: Vec<Entry>,
}

impl SavedIndex {
    /// Entries whose vectors are comparable with `model`'s
    fn reusable(self, model: &str) -> Vec<Entry> {
        if self.model != model {
            warn!(saved = %self.model, current = %model, "Embedding model changed, discarding saved index");
            return Vec::new();
        }
        let dimension = self.dimension;
        self.entries
            .into_iter()
            .filter(|entry| entry.embedding.len() == dimension)
            .collect()
    }
}

/// Cosine-similarity ranking over embedded documents
pub struct EmbeddingIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    entries: Vec<Entry>,
    dimension: usize,
    top_k: usize,
    query_cache: Arc<RwLock<TimedCache<String, Vec<f32>>>>,
}

impl EmbeddingIndex {
    /// Embed `documents` and build the index
    pub async fn build(
        embedder: Arc<dyn EmbeddingProvider>,
        documents: Vec<Document>,
    ) -> Result<Self> {
        Self::refresh(embedder, documents, Vec::new()).await
    }

    /// Reuse the index saved at `path` where documents are unchanged, then
    /// save the refreshed index back
    pub async fn load_or_build(
        embedder: Arc<dyn EmbeddingProvider>,
        documents: Vec<Document>,
        path: impl AsRef<Path>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let saved = if tokio::fs::try_exists(path).await? {
            let bytes = tokio::fs::read(path).await?;
            serde_json::from_slice::<SavedIndex>(&bytes)?.reusable(embedder.embedding_model())
        } else {
            Vec::new()
        };

        let index = Self::refresh(embedder, documents, saved).await?;
        index.save(path).await?;
        Ok(index)
    }

    async fn refresh(
        embedder: Arc<dyn EmbeddingProvider>,
        documents: Vec<Document>,
        saved: Vec<Entry>,
    ) -> Result<Self> {
        let mut previous: HashMap<String, Entry> = saved
            .into_iter()
            .map(|entry| (entry.document.path.clone(), entry))
            .collect();

        let mut entries = Vec::with_capacity(documents.len());
        let mut stale = Vec::new();
        for document in documents {
            match previous.remove(&document.path) {
                Some(old) if old.document.text == document.text && !old.embedding.is_empty() => {
                    entries.push(Entry {
                        document,
                        embedding: old.embedding,
                    });
                }
                _ => {
                    stale.push(entries.len());
                    entries.push(Entry {
                        document,
                        embedding: Vec::new(),
                    });
                }
            }
        }

        for batch in stale.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch
                .iter()
                .map(|&i| truncate_chars(&entries[i].document.text, MAX_EMBED_CHARS))
                .collect();
            let vectors = embedder.embed(&texts).await?;
            if vectors.len() != texts.len() {
                return Err(QueryError::Retrieval(format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    vectors.len()
                )));
            }
            for (&i, vector) in batch.iter().zip(vectors) {
                entries[i].embedding = vector;
            }
        }

        let dimension = entries.first().map_or(0, |entry| entry.embedding.len());
        if let Some(odd) = entries.iter().find(|entry| entry.embedding.len() != dimension) {
            return Err(QueryError::Retrieval(format!(
                "embedding of {} has {} dimensions, expected {dimension}",
                odd.document.path,
                odd.embedding.len()
            )));
        }

        info!(
            model = embedder.embedding_model(),
            dimension,
            documents = entries.len(),
            embedded = stale.len(),
            reused = entries.len() - stale.len(),
            "Embedding index ready"
        );

        Ok(Self {
            embedder,
            entries,
            dimension,
            top_k: DEFAULT_TOP_K,
            query_cache: Arc::new(RwLock::new(TimedCache::with_lifespan(DEFAULT_QUERY_TTL))),
        })
    }

    /// Cap the number of results per search
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Keep query embeddings for `ttl`
    pub fn with_query_ttl(mut self, ttl: Duration) -> Self {
        self.query_cache = Arc::new(RwLock::new(TimedCache::with_lifespan(ttl)));
        self
    }

    /// Number of indexed documents
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no documents
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the index as JSON
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = serde_json::to_vec(&SavedIndexRef {
            model: self.embedder.embedding_model(),
            dimension: self.dimension,
            entries: &self.entries,
        })?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    async fn query_embedding(&self, query: &str) -> Result<Vec<f32>> {
        {
            let mut cache = self.query_cache.write().await;
            if let Some(vector) = cache.cache_get(query) {
                debug!("Query embedding cache hit");
                return Ok(vector.clone());
            }
        }

        let vector = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| QueryError::Retrieval("no embedding returned for query".to_string()))?;

        let mut cache = self.query_cache.write().await;
        let _ = cache.cache_set(query.to_string(), vector.clone());
        Ok(vector)
    }
}

#[async_trait]
impl Retriever for EmbeddingIndex {
    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let target = self.query_embedding(query).await?;
        if !self.entries.is_empty() && target.len() != self.dimension {
            return Err(QueryError::Retrieval(format!(
                "query embedding has {} dimensions, index has {}",
                target.len(),
                self.dimension
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine(&target, &entry.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(scored
            .into_iter()
            .take(self.top_k)
            .map(|(i, _)| self.entries[i].document.text.clone())
            .collect())
    }

    async fn titles(&self) -> Result<Vec<String>> {
        Ok(unique_titles(self.entries.iter().map(|e| &e.document)))
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
