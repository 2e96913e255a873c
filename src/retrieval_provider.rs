use std::time::Duration;

use async_trait::async_trait;

use crate::domain::retrieval::{content_hash, Provenance, RetrievalContext, Snippet};

/// Backend queried for semantically similar snippets (spec §4.2).
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> anyhow::Result<Vec<(String, f64)>>;
}

/// Backend queried for keyword/full-text matches (spec §4.2).
#[async_trait]
pub trait KeywordStore: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> anyhow::Result<Vec<(String, f64)>>;
}

/// Fans a question out to the vector and keyword backends in parallel and
/// merges the results by content hash (spec §4.2, C2).
///
/// Generalizes `squall::review::ReviewExecutor`'s fan-out-then-collect shape
/// down to exactly two backends. Partial failure is tolerated: if one
/// backend errors or times out, the other's hits are returned alone with a
/// warning attached; an empty `RetrievalContext` is never itself an error
/// (spec §4.2, "Non-goals").
pub struct RetrievalProvider {
    vector: Option<Box<dyn VectorStore>>,
    keyword: Option<Box<dyn KeywordStore>>,
    per_backend_timeout: Duration,
}

impl RetrievalProvider {
    pub fn new(
        vector: Option<Box<dyn VectorStore>>,
        keyword: Option<Box<dyn KeywordStore>>,
        per_backend_timeout: Duration,
    ) -> Self {
        Self {
            vector,
            keyword,
            per_backend_timeout,
        }
    }

    pub async fn retrieve(&self, query: &str, top_k: usize) -> RetrievalContext {
        let (vector_result, keyword_result) =
            tokio::join!(self.query_vector(query, top_k), self.query_keyword(query, top_k));

        let mut warnings = Vec::new();
        let vector_hits = match vector_result {
            Ok(hits) => hits,
            Err(msg) => {
                warnings.push(format!("vector backend unavailable: {msg}"));
                Vec::new()
            }
        };
        let keyword_hits = match keyword_result {
            Ok(hits) => hits,
            Err(msg) => {
                warnings.push(format!("keyword backend unavailable: {msg}"));
                Vec::new()
            }
        };

        RetrievalContext {
            vector_hits,
            keyword_hits,
            warning: if warnings.is_empty() {
                None
            } else {
                Some(warnings.join("; "))
            },
        }
    }

    async fn query_vector(&self, query: &str, top_k: usize) -> Result<Vec<Snippet>, String> {
        let Some(store) = &self.vector else {
            return Ok(Vec::new());
        };
        let result = tokio::time::timeout(self.per_backend_timeout, store.search(query, top_k))
            .await
            .map_err(|_| "timed out".to_string())?
            .map_err(|e| e.to_string())?;
        Ok(to_snippets(result, Provenance::Vector))
    }

    async fn query_keyword(&self, query: &str, top_k: usize) -> Result<Vec<Snippet>, String> {
        let Some(store) = &self.keyword else {
            return Ok(Vec::new());
        };
        let result = tokio::time::timeout(self.per_backend_timeout, store.search(query, top_k))
            .await
            .map_err(|_| "timed out".to_string())?
            .map_err(|e| e.to_string())?;
        Ok(to_snippets(result, Provenance::Keyword))
    }
}

fn to_snippets(hits: Vec<(String, f64)>, provenance: Provenance) -> Vec<Snippet> {
    hits.into_iter()
        .map(|(text, score)| {
            let content_hash = content_hash(&text);
            Snippet {
                text,
                score,
                provenance,
                content_hash,
            }
        })
        .collect()
}
