use crate::chunking::build_nodes;
use crate::models::{IngestionOptions, Node, SourceDocument};
use crate::IngestError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Owns every node of one corpus, addressable by node id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Arc<Node>>", into = "Vec<Arc<Node>>")]
pub struct DocumentStore {
    nodes: Vec<Arc<Node>>,
    positions: HashMap<String, usize>,
}

impl DocumentStore {
    pub fn from_documents(
        documents: &[SourceDocument],
        options: &IngestionOptions,
    ) -> Result<Self, IngestError> {
        let mut nodes = Vec::new();
        for document in documents {
            nodes.extend(build_nodes(document, options)?.into_iter().map(Arc::new));
        }
        Ok(Self::from(nodes))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, node_id: &str) -> Option<&Arc<Node>> {
        self.positions
            .get(node_id)
            .and_then(|position| self.nodes.get(*position))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Node>> {
        self.nodes.iter()
    }
}

impl From<Vec<Arc<Node>>> for DocumentStore {
    fn from(nodes: Vec<Arc<Node>>) -> Self {
        let mut unique = Vec::with_capacity(nodes.len());
        let mut positions = HashMap::with_capacity(nodes.len());

        for node in nodes {
            if positions.contains_key(&node.node_id) {
                continue;
            }
            positions.insert(node.node_id.clone(), unique.len());
            unique.push(node);
        }

        Self {
            nodes: unique,
            positions,
        }
    }
}

impl From<DocumentStore> for Vec<Arc<Node>> {
    fn from(store: DocumentStore) -> Self {
        store.nodes
    }
}
