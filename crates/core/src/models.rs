use crate::SearchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    pub document_id: String,
    pub relative_path: String,
    pub source_url: Option<String>,
}

/// A readable file from a corpus folder, with its `URL:` header already
/// split off into `source_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub document_id: String,
    pub file_name: String,
    pub relative_path: String,
    pub source_url: Option<String>,
    pub checksum: String,
    pub loaded_at: DateTime<Utc>,
    pub text: String,
}

impl SourceDocument {
    pub fn reference(&self) -> DocumentRef {
        DocumentRef {
            document_id: self.document_id.clone(),
            relative_path: self.relative_path.clone(),
            source_url: self.source_url.clone(),
        }
    }
}

/// A chunk of indexed source text. Shared as `Arc<Node>` once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub node_id: String,
    pub text: String,
    pub document: DocumentRef,
    pub chunk_index: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RetrieverKind {
    Vector,
    Keyword,
}

impl RetrieverKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Keyword => "keyword",
        }
    }
}

impl fmt::Display for RetrieverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ScoredNode {
    pub node: Arc<Node>,
    pub score: f64,
    pub retriever: RetrieverKind,
}

impl ScoredNode {
    pub fn new(node: Arc<Node>, score: f64, retriever: RetrieverKind) -> Self {
        Self {
            node,
            score,
            retriever,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node.node_id
    }
}

/// Ordered hits from one retriever for one query. Scores are only
/// comparable within the same result.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredNode>,
}

impl RetrievalResult {
    pub fn new(hits: Vec<ScoredNode>) -> Self {
        Self { hits }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn node_ids(&self) -> BTreeSet<String> {
        self.hits
            .iter()
            .map(|hit| hit.node_id().to_string())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum FusionMode {
    /// Node must be returned by both retrievers.
    #[default]
    And,
    /// Node must be returned by at least one retriever.
    Or,
}

impl FromStr for FusionMode {
    type Err = SearchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("and") {
            Ok(Self::And)
        } else if trimmed.eq_ignore_ascii_case("or") {
            Ok(Self::Or)
        } else {
            Err(SearchError::InvalidMode(value.to_string()))
        }
    }
}

impl fmt::Display for FusionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => f.write_str("AND"),
            Self::Or => f.write_str("OR"),
        }
    }
}

/// One entry of a fused result. The node instance comes from the vector
/// result whenever the vector retriever returned it.
#[derive(Debug, Clone)]
pub struct FusedNode {
    pub node: Arc<Node>,
    pub vector_score: Option<f64>,
    pub keyword_score: Option<f64>,
}

impl FusedNode {
    pub fn node_id(&self) -> &str {
        &self.node.node_id
    }

    pub fn score(&self) -> Option<f64> {
        self.vector_score.or(self.keyword_score)
    }

    pub fn retrievers(&self) -> Vec<RetrieverKind> {
        let mut found = Vec::new();
        if self.vector_score.is_some() {
            found.push(RetrieverKind::Vector);
        }
        if self.keyword_score.is_some() {
            found.push(RetrieverKind::Keyword);
        }
        found
    }
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
    pub min_chunk_chars: usize,
    pub extensions: Vec<String>,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 1_200,
            chunk_overlap_chars: 120,
            min_chunk_chars: 20,
            extensions: vec!["txt".to_string(), "md".to_string(), "json".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeywordOptions {
    pub max_keywords_per_chunk: usize,
    pub max_keywords_per_query: usize,
}

impl Default for KeywordOptions {
    fn default() -> Self {
        Self {
            max_keywords_per_chunk: 10,
            max_keywords_per_query: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResponse {
    pub query: String,
    pub response: String,
    pub context: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fusion_mode_parses_case_insensitively() {
        assert_eq!("AND".parse::<FusionMode>().unwrap(), FusionMode::And);
        assert_eq!(" or ".parse::<FusionMode>().unwrap(), FusionMode::Or);
    }

    #[test]
    fn unknown_fusion_mode_is_rejected() {
        let error = "XOR".parse::<FusionMode>().unwrap_err();
        assert!(matches!(error, SearchError::InvalidMode(name) if name == "XOR"));
    }

    #[test]
    fn fused_node_prefers_vector_score() {
        let node = Arc::new(Node {
            node_id: "n1".to_string(),
            text: "beach".to_string(),
            document: DocumentRef {
                document_id: "doc".to_string(),
                relative_path: "a.txt".to_string(),
                source_url: None,
            },
            chunk_index: 0,
        });
        let fused = FusedNode {
            node,
            vector_score: Some(0.7),
            keyword_score: Some(3.0),
        };
        assert_eq!(fused.score(), Some(0.7));
        assert_eq!(
            fused.retrievers(),
            vec![RetrieverKind::Vector, RetrieverKind::Keyword]
        );
    }
}
