use serde::{Deserialize, Serialize};

/// Where a retrieval snippet came from (spec §3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Vector,
    Keyword,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
    pub text: String,
    pub score: f64,
    pub provenance: Provenance,
    /// Hash of `text`, used by the provider to de-dup across stores
    /// (spec §4.2: "merges by a content hash").
    pub content_hash: u64,
}

/// Two ranked snippet lists — one per backend (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalContext {
    pub vector_hits: Vec<Snippet>,
    pub keyword_hits: Vec<Snippet>,
    /// Set when one backend failed and the other's results were returned
    /// alone (spec §4.2: "Partial failure ... tolerated").
    pub warning: Option<String>,
}

impl RetrievalContext {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Merge the two lists by content hash (de-dup, vector hit wins ties),
    /// sorted by descending score, truncated to `top_k` (spec §4.2).
    pub fn merged_top_k(&self, top_k: usize) -> Vec<Snippet> {
        let mut seen = std::collections::HashSet::new();
        let mut merged: Vec<Snippet> = Vec::new();
        for s in self.vector_hits.iter().chain(self.keyword_hits.iter()) {
            if seen.insert(s.content_hash) {
                merged.push(s.clone());
            }
        }
        merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        merged.truncate(top_k);
        merged
    }
}

pub fn content_hash(text: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    text.trim().to_lowercase().hash(&mut hasher);
    hasher.finish()
}
