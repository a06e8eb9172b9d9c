use crate::models::{FusedNode, RetrievalResult, RetrieverKind, SourceDocument};
use crate::synthesis::Synthesis;
use crate::web_search::WebSearchResult;
use crate::{IngestError, SearchError};
use async_trait::async_trait;
use std::path::Path;

/// Produces the readable documents of a corpus folder.
pub trait DocumentSource: Send + Sync {
    fn load(&self, folder: &Path) -> Result<Vec<SourceDocument>, IngestError>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> String;

    fn dimensions(&self) -> usize;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, IngestError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| IngestError::Embedding("embedder returned no vector".to_string()))
    }
}

/// Maps a query string to a ranked set of nodes.
#[async_trait]
pub trait Retriever: Send + Sync {
    fn kind(&self) -> RetrieverKind;

    async fn retrieve(&self, query: &str) -> Result<RetrievalResult, SearchError>;
}

#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    async fn synthesize(&self, query: &str, nodes: &[FusedNode]) -> Result<Synthesis, SearchError>;
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// `Ok(None)` when the page was reachable but carried no extractable text.
    async fn fetch_text(&self, url: &str) -> Result<Option<String>, IngestError>;
}

/// Finds candidate pages for a subject before they are scraped.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, subject: &str, max_results: usize) -> Result<Vec<WebSearchResult>, SearchError>;
}
