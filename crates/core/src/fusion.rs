use crate::models::{FusedNode, FusionMode, RetrievalResult};
use crate::traits::Retriever;
use crate::SearchError;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Combines a vector retriever and a keyword retriever into one
/// deduplicated node list. The mode is fixed at construction.
pub struct HybridRetriever<V, K>
where
    V: Retriever,
    K: Retriever,
{
    vector: V,
    keyword: K,
    mode: FusionMode,
}

impl<V, K> HybridRetriever<V, K>
where
    V: Retriever,
    K: Retriever,
{
    pub fn new(vector: V, keyword: K, mode: FusionMode) -> Self {
        Self {
            vector,
            keyword,
            mode,
        }
    }

    /// Fails with `SearchError::InvalidMode` for anything but AND/OR.
    pub fn with_mode_name(vector: V, keyword: K, mode: &str) -> Result<Self, SearchError> {
        let mode = mode.parse::<FusionMode>()?;
        Ok(Self::new(vector, keyword, mode))
    }

    pub fn mode(&self) -> FusionMode {
        self.mode
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<FusedNode>, SearchError> {
        let (vector_hits, keyword_hits) = tokio::try_join!(
            self.vector.retrieve(query),
            self.keyword.retrieve(query)
        )?;

        let fused = fuse(&vector_hits, &keyword_hits, self.mode);
        debug!(
            mode = %self.mode,
            vector = vector_hits.len(),
            keyword = keyword_hits.len(),
            fused = fused.len(),
            "hybrid retrieval"
        );
        Ok(fused)
    }
}

/// Selects ids per `mode` and merges both results.
///
/// For an id present in both results the vector hit supplies the node
/// instance; both scores are kept. Output is sorted by vector score, then
/// keyword score (both descending, missing scores last), then node id.
pub fn fuse(vector: &RetrievalResult, keyword: &RetrievalResult, mode: FusionMode) -> Vec<FusedNode> {
    let vector_ids = vector.node_ids();
    let keyword_ids = keyword.node_ids();

    let selected: BTreeSet<&str> = match mode {
        FusionMode::And => vector_ids
            .intersection(&keyword_ids)
            .map(String::as_str)
            .collect(),
        FusionMode::Or => vector_ids.union(&keyword_ids).map(String::as_str).collect(),
    };

    let mut merged: HashMap<&str, FusedNode> = HashMap::new();

    for hit in &keyword.hits {
        merged.entry(hit.node_id()).or_insert_with(|| FusedNode {
            node: hit.node.clone(),
            vector_score: None,
            keyword_score: Some(hit.score),
        });
    }

    // applied last: the vector node instance wins
    for hit in &vector.hits {
        let entry = merged.entry(hit.node_id()).or_insert_with(|| FusedNode {
            node: hit.node.clone(),
            vector_score: None,
            keyword_score: None,
        });
        if entry.vector_score.is_none() {
            entry.node = hit.node.clone();
            entry.vector_score = Some(hit.score);
        }
    }

    let mut fused = merged
        .into_iter()
        .filter(|(node_id, _)| selected.contains(node_id))
        .map(|(_, node)| node)
        .collect::<Vec<_>>();

    fused.sort_by(|left, right| {
        descending(left.vector_score, right.vector_score)
            .then_with(|| descending(left.keyword_score, right.keyword_score))
            .then_with(|| left.node_id().cmp(right.node_id()))
    });
    fused
}

fn descending(left: Option<f64>, right: Option<f64>) -> Ordering {
    match (left, right) {
        (Some(left), Some(right)) => right.total_cmp(&left),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentRef, Node, RetrieverKind, ScoredNode};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;

    fn node(id: &str, text: &str) -> Arc<Node> {
        Arc::new(Node {
            node_id: id.to_string(),
            text: text.to_string(),
            document: DocumentRef {
                document_id: "doc".to_string(),
                relative_path: "doc.txt".to_string(),
                source_url: None,
            },
            chunk_index: 0,
        })
    }

    fn result(kind: RetrieverKind, hits: &[(&str, f64)]) -> RetrievalResult {
        RetrievalResult::new(
            hits.iter()
                .map(|(id, score)| ScoredNode::new(node(id, &format!("{kind} {id}")), *score, kind))
                .collect(),
        )
    }

    fn ids(fused: &[FusedNode]) -> Vec<&str> {
        fused.iter().map(FusedNode::node_id).collect()
    }

    #[derive(Default)]
    struct FakeRetriever {
        kind: Option<RetrieverKind>,
        hits: Vec<(String, f64)>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeRetriever {
        fn new(kind: RetrieverKind, hits: &[(&str, f64)]) -> Self {
            Self {
                kind: Some(kind),
                hits: hits.iter().map(|(id, score)| (id.to_string(), *score)).collect(),
                ..Self::default()
            }
        }

        fn failing(kind: RetrieverKind) -> Self {
            Self {
                kind: Some(kind),
                fail: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Retriever for FakeRetriever {
        fn kind(&self) -> RetrieverKind {
            self.kind.unwrap_or(RetrieverKind::Vector)
        }

        async fn retrieve(&self, _query: &str) -> Result<RetrievalResult, SearchError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            if self.fail {
                return Err(SearchError::retriever(self.kind().as_str(), "backend unavailable"));
            }
            let hits = self
                .hits
                .iter()
                .map(|(id, score)| (id.as_str(), *score))
                .collect::<Vec<_>>();
            Ok(result(self.kind(), &hits))
        }
    }

    #[test]
    fn and_mode_intersects_ids() {
        let vector = result(RetrieverKind::Vector, &[("n1", 0.9), ("n2", 0.8)]);
        let keyword = result(RetrieverKind::Keyword, &[("n2", 1.0), ("n3", 1.0)]);

        assert_eq!(ids(&fuse(&vector, &keyword, FusionMode::And)), vec!["n2"]);
    }

    #[test]
    fn or_mode_unions_ids() {
        let vector = result(RetrieverKind::Vector, &[("n1", 0.9), ("n2", 0.8)]);
        let keyword = result(RetrieverKind::Keyword, &[("n2", 1.0), ("n3", 1.0)]);

        assert_eq!(ids(&fuse(&vector, &keyword, FusionMode::Or)), vec!["n1", "n2", "n3"]);
    }

    #[test]
    fn empty_vector_result_per_mode() {
        let vector = RetrievalResult::default();
        let keyword = result(RetrieverKind::Keyword, &[("n5", 1.0)]);

        assert!(fuse(&vector, &keyword, FusionMode::And).is_empty());
        assert_eq!(ids(&fuse(&vector, &keyword, FusionMode::Or)), vec!["n5"]);
    }

    #[test]
    fn empty_keyword_result_or_mode_equals_vector_result() {
        let vector = result(RetrieverKind::Vector, &[("n1", 0.4), ("n2", 0.9)]);
        let keyword = RetrievalResult::default();

        let fused = fuse(&vector, &keyword, FusionMode::Or);
        let fused_ids = fused.iter().map(|hit| hit.node_id().to_string()).collect::<BTreeSet<_>>();
        assert_eq!(fused_ids, vector.node_ids());
        assert_eq!(ids(&fused), vec!["n2", "n1"]);
    }

    #[test]
    fn and_result_is_subset_of_or_result() {
        let vector = result(RetrieverKind::Vector, &[("a", 0.3), ("b", 0.2), ("c", 0.1)]);
        let keyword = result(RetrieverKind::Keyword, &[("c", 2.0), ("d", 1.0), ("a", 1.0)]);

        let and = fuse(&vector, &keyword, FusionMode::And);
        let or = fuse(&vector, &keyword, FusionMode::Or);
        let or_ids = ids(&or);

        assert!(ids(&and).iter().all(|id| or_ids.contains(id)));
        assert_eq!(ids(&and), vec!["a", "c"]);
    }

    #[test]
    fn duplicate_id_surfaces_vector_node_and_keeps_both_scores() {
        let vector = result(RetrieverKind::Vector, &[("n2", 0.8)]);
        let keyword = result(RetrieverKind::Keyword, &[("n2", 3.0)]);

        let fused = fuse(&vector, &keyword, FusionMode::And);

        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].node.text, "vector n2");
        assert_eq!(fused[0].vector_score, Some(0.8));
        assert_eq!(fused[0].keyword_score, Some(3.0));
    }

    #[test]
    fn ordering_prefers_vector_then_keyword_then_id() {
        let vector = result(RetrieverKind::Vector, &[("v", 0.5)]);
        let keyword = result(RetrieverKind::Keyword, &[("k2", 1.0), ("k1", 1.0), ("k0", 2.0)]);

        let fused = fuse(&vector, &keyword, FusionMode::Or);
        assert_eq!(ids(&fused), vec!["v", "k0", "k1", "k2"]);
    }

    #[test]
    fn fusion_is_idempotent() {
        let vector = result(RetrieverKind::Vector, &[("n1", 0.9), ("n2", 0.8)]);
        let keyword = result(RetrieverKind::Keyword, &[("n2", 1.0), ("n3", 1.0)]);

        for mode in [FusionMode::And, FusionMode::Or] {
            let first = fuse(&vector, &keyword, mode);
            let second = fuse(&vector, &keyword, mode);
            assert_eq!(ids(&first), ids(&second));
        }
    }

    #[tokio::test]
    async fn hybrid_retriever_invokes_both_retrievers() {
        let hybrid = HybridRetriever::new(
            FakeRetriever::new(RetrieverKind::Vector, &[("n1", 0.9), ("n2", 0.8)]),
            FakeRetriever::new(RetrieverKind::Keyword, &[("n2", 1.0), ("n3", 1.0)]),
            FusionMode::Or,
        );

        let fused = hybrid.retrieve("where to eat").await.expect("retrieval should work");

        assert_eq!(ids(&fused), vec!["n1", "n2", "n3"]);
        assert_eq!(hybrid.vector.calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(hybrid.keyword.calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retriever_failure_propagates() {
        let hybrid = HybridRetriever::new(
            FakeRetriever::new(RetrieverKind::Vector, &[("n1", 0.9)]),
            FakeRetriever::failing(RetrieverKind::Keyword),
            FusionMode::Or,
        );

        let error = hybrid.retrieve("museums").await.unwrap_err();
        assert!(matches!(error, SearchError::Retriever { retriever, .. } if retriever == "keyword"));
    }

    #[test]
    fn invalid_mode_fails_before_retrieval() {
        let vector = FakeRetriever::new(RetrieverKind::Vector, &[("n1", 0.9)]);
        let keyword = FakeRetriever::new(RetrieverKind::Keyword, &[("n1", 1.0)]);

        let error = HybridRetriever::with_mode_name(vector, keyword, "XOR")
            .err()
            .expect("XOR should be rejected");
        assert!(matches!(error, SearchError::InvalidMode(_)));
    }

    #[test]
    fn mode_name_is_accepted() {
        let hybrid = HybridRetriever::with_mode_name(
            FakeRetriever::new(RetrieverKind::Vector, &[]),
            FakeRetriever::new(RetrieverKind::Keyword, &[]),
            "OR",
        )
        .expect("OR is valid");
        assert_eq!(hybrid.mode(), FusionMode::Or);
    }
}
