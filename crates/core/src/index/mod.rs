pub mod docstore;
pub mod keyword;
pub mod vector;

pub use docstore::DocumentStore;
pub use keyword::{extract_keywords, KeywordTable};
pub use vector::{cosine_similarity, VectorIndex};

use crate::models::{IngestionOptions, KeywordOptions, SourceDocument};
use crate::traits::Embedder;
use crate::IngestError;
use serde::{Deserialize, Serialize};

/// The node store plus both indices built from it. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexBundle {
    pub documents: DocumentStore,
    pub vector: VectorIndex,
    pub keyword: KeywordTable,
}

impl IndexBundle {
    pub async fn build(
        documents: &[SourceDocument],
        ingestion: &IngestionOptions,
        keywords: KeywordOptions,
        embedder: &dyn Embedder,
    ) -> Result<Self, IngestError> {
        let store = DocumentStore::from_documents(documents, ingestion)?;
        if store.is_empty() {
            return Err(IngestError::EmptyCorpus(
                "documents produced no text nodes".to_string(),
            ));
        }

        let vector = VectorIndex::build(&store, embedder).await?;
        let keyword = KeywordTable::build(&store, keywords);

        Ok(Self {
            documents: store,
            vector,
            keyword,
        })
    }
}
