use crate::index::{extract_keywords, IndexBundle};
use crate::models::{RetrievalResult, RetrieverKind, ScoredNode};
use crate::traits::{Embedder, Retriever};
use crate::SearchError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_VECTOR_TOP_K: usize = 2;

fn resolve_hits<'a>(
    index: &IndexBundle,
    kind: RetrieverKind,
    hits: impl IntoIterator<Item = (&'a str, f64)>,
) -> Result<RetrievalResult, SearchError> {
    hits.into_iter()
        .map(|(node_id, score)| {
            index
                .documents
                .get(node_id)
                .map(|node| ScoredNode::new(Arc::clone(node), score, kind))
                .ok_or_else(|| {
                    SearchError::retriever(kind.as_str(), format!("index references unknown node {node_id}"))
                })
        })
        .collect::<Result<Vec<_>, SearchError>>()
        .map(RetrievalResult::new)
}

/// Dense retriever: embeds the query and returns the `top_k` most similar
/// nodes.
pub struct VectorRetriever {
    index: Arc<IndexBundle>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl VectorRetriever {
    pub fn new(index: Arc<IndexBundle>, embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self {
            index,
            embedder,
            top_k,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    fn kind(&self) -> RetrieverKind {
        RetrieverKind::Vector
    }

    async fn retrieve(&self, query: &str) -> Result<RetrievalResult, SearchError> {
        let query_vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|error| SearchError::retriever("vector", error))?;

        let hits = self
            .index
            .vector
            .query(&query_vector, self.top_k)
            .map_err(|error| SearchError::retriever("vector", error))?;

        let result = resolve_hits(&self.index, RetrieverKind::Vector, hits)?;
        debug!(hits = result.len(), top_k = self.top_k, "vector retrieval");
        Ok(result)
    }
}

/// Sparse retriever over the keyword table. Returns every node sharing a
/// keyword with the query; there is no cap.
pub struct KeywordRetriever {
    index: Arc<IndexBundle>,
    max_keywords: usize,
}

impl KeywordRetriever {
    pub fn new(index: Arc<IndexBundle>, max_keywords: usize) -> Self {
        Self {
            index,
            max_keywords,
        }
    }
}

#[async_trait]
impl Retriever for KeywordRetriever {
    fn kind(&self) -> RetrieverKind {
        RetrieverKind::Keyword
    }

    async fn retrieve(&self, query: &str) -> Result<RetrievalResult, SearchError> {
        let keywords = extract_keywords(query, self.max_keywords);
        let hits = self
            .index
            .keyword
            .query(&keywords)
            .into_iter()
            .map(|(node_id, matched)| (node_id, matched as f64));

        let result = resolve_hits(&self.index, RetrieverKind::Keyword, hits)?;
        debug!(hits = result.len(), keywords = ?keywords, "keyword retrieval");
        Ok(result)
    }
}
