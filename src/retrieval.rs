//! Retrieval gateway.
//!
//! Given a free-text query, returns the most relevant snapshot records. The
//! trait is the seam for an external vector store; [`KeywordIndex`] is the
//! in-process default, ranking by token overlap.

use crate::llm::OracleError;
use crate::snapshot::SourceRecord;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Weight of a query token found in a record's path.
const PATH_HIT_WEIGHT: usize = 3;

/// Cap on how much a single token's content frequency can contribute.
const MAX_TERM_CONTRIBUTION: usize = 5;

/// Ranked retrieval over a project snapshot.
#[async_trait]
pub trait RetrievalGateway: Send + Sync {
    /// Return at most `top_k` records ranked by relevance to `query`.
    ///
    /// Ranking is not guaranteed stable across calls or backends.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SourceRecord>, OracleError>;
}

struct IndexedRecord {
    record: SourceRecord,
    path_tokens: HashSet<String>,
    term_counts: HashMap<String, usize>,
}

/// In-memory token-overlap index.
pub struct KeywordIndex {
    entries: Vec<IndexedRecord>,
}

impl KeywordIndex {
    /// Index a snapshot.
    pub fn build(records: Vec<SourceRecord>) -> Self {
        let entries = records
            .into_iter()
            .map(|record| {
                let path_tokens = tokenize(&record.path.to_string_lossy()).collect();
                let mut term_counts = HashMap::new();
                for token in tokenize(&record.content) {
                    *term_counts.entry(token).or_insert(0) += 1;
                }
                IndexedRecord {
                    record,
                    path_tokens,
                    term_counts,
                }
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn score(entry: &IndexedRecord, query: &HashSet<String>) -> usize {
        query
            .iter()
            .map(|token| {
                let path = if entry.path_tokens.contains(token) {
                    PATH_HIT_WEIGHT
                } else {
                    0
                };
                let content = entry
                    .term_counts
                    .get(token)
                    .copied()
                    .unwrap_or(0)
                    .min(MAX_TERM_CONTRIBUTION);
                path + content
            })
            .sum()
    }

    /// Synchronous ranking used by the async gateway impl.
    pub fn rank(&self, query: &str, top_k: usize) -> Vec<SourceRecord> {
        let query: HashSet<String> = tokenize(query).collect();
        let mut scored: Vec<(usize, &IndexedRecord)> = self
            .entries
            .iter()
            .map(|e| (Self::score(e, &query), e))
            .filter(|(score, _)| *score > 0)
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then_with(|| a.record.path.cmp(&b.record.path)));

        scored
            .into_iter()
            .take(top_k)
            .map(|(_, e)| e.record.clone())
            .collect()
    }
}

#[async_trait]
impl RetrievalGateway for KeywordIndex {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SourceRecord>, OracleError> {
        let hits = self.rank(query, top_k);
        debug!("Retrieved {} of {} records", hits.len(), self.entries.len());
        Ok(hits)
    }
}

/// Lowercased alphanumeric tokens of two or more characters.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(str::to_lowercase)
}
