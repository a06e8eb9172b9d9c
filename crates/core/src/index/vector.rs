use crate::index::DocumentStore;
use crate::traits::Embedder;
use crate::IngestError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorEntry {
    node_id: String,
    vector: Vec<f32>,
}

/// Dense embedding index with exhaustive cosine scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    embedder: String,
    dimensions: usize,
    entries: Vec<VectorEntry>,
}

impl VectorIndex {
    pub async fn build(store: &DocumentStore, embedder: &dyn Embedder) -> Result<Self, IngestError> {
        let texts = store.iter().map(|node| node.text.clone()).collect::<Vec<_>>();
        let vectors = embedder.embed_batch(&texts).await?;

        if vectors.len() != texts.len() {
            return Err(IngestError::Embedding(format!(
                "embedding count {} doesn't match node count {}",
                vectors.len(),
                texts.len()
            )));
        }

        let dimensions = embedder.dimensions();
        let entries = store
            .iter()
            .zip(vectors)
            .map(|(node, vector)| {
                if vector.len() != dimensions {
                    return Err(IngestError::DimensionMismatch {
                        expected: dimensions,
                        actual: vector.len(),
                    });
                }
                Ok(VectorEntry {
                    node_id: node.node_id.clone(),
                    vector,
                })
            })
            .collect::<Result<Vec<_>, IngestError>>()?;

        Ok(Self {
            embedder: embedder.name(),
            dimensions,
            entries,
        })
    }

    pub fn embedder(&self) -> &str {
        &self.embedder
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top `top_k` node ids by descending similarity, ties broken by id.
    pub fn query(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<(&str, f64)>, IngestError> {
        if query_vector.len() != self.dimensions {
            return Err(IngestError::DimensionMismatch {
                expected: self.dimensions,
                actual: query_vector.len(),
            });
        }

        let mut scored = self
            .entries
            .iter()
            .map(|entry| {
                (
                    entry.node_id.as_str(),
                    cosine_similarity(query_vector, &entry.vector),
                )
            })
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| right.1.total_cmp(&left.1).then_with(|| left.0.cmp(right.0)));
        scored.truncate(top_k);
        Ok(scored)
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    let mut dot = 0f64;
    let mut left_norm = 0f64;
    let mut right_norm = 0f64;

    for (a, b) in left.iter().zip(right) {
        let (a, b) = (*a as f64, *b as f64);
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }

    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm.sqrt() * right_norm.sqrt())
}
