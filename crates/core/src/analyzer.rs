use crate::cache::IndexCache;
use crate::fusion::HybridRetriever;
use crate::models::{AnalysisResponse, FusedNode, FusionMode, KeywordOptions};
use crate::retrievers::{KeywordRetriever, VectorRetriever, DEFAULT_VECTOR_TOP_K};
use crate::traits::AnswerSynthesizer;
use crate::SearchError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy)]
pub struct AnalyzerOptions {
    pub fusion_mode: FusionMode,
    pub vector_top_k: usize,
    pub keywords: KeywordOptions,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            fusion_mode: FusionMode::And,
            vector_top_k: DEFAULT_VECTOR_TOP_K,
            keywords: KeywordOptions::default(),
        }
    }
}

type FolderRetriever = HybridRetriever<VectorRetriever, KeywordRetriever>;

/// Question answering over one corpus folder: `load_and_index` wires the
/// retrievers, `query` retrieves and synthesizes.
pub struct FolderAnalyzer {
    folder: PathBuf,
    cache: Arc<IndexCache>,
    synthesizer: Arc<dyn AnswerSynthesizer>,
    options: AnalyzerOptions,
    retriever: Option<FolderRetriever>,
}

impl FolderAnalyzer {
    pub fn new(
        folder: impl Into<PathBuf>,
        cache: Arc<IndexCache>,
        synthesizer: Arc<dyn AnswerSynthesizer>,
        options: AnalyzerOptions,
    ) -> Self {
        Self {
            folder: folder.into(),
            cache,
            synthesizer,
            options,
            retriever: None,
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn is_initialized(&self) -> bool {
        self.retriever.is_some()
    }

    pub async fn load_and_index(&mut self) -> Result<(), SearchError> {
        let index = self.cache.load_or_build(&self.folder).await?;

        let vector = VectorRetriever::new(
            Arc::clone(&index),
            self.cache.embedder(),
            self.options.vector_top_k,
        );
        let keyword = KeywordRetriever::new(index, self.options.keywords.max_keywords_per_query);

        self.retriever = Some(HybridRetriever::new(
            vector,
            keyword,
            self.options.fusion_mode,
        ));
        Ok(())
    }

    fn retriever(&self) -> Result<&FolderRetriever, SearchError> {
        self.retriever.as_ref().ok_or_else(|| {
            SearchError::NotInitialized(format!(
                "call load_and_index before querying {}",
                self.folder.display()
            ))
        })
    }

    pub async fn retrieve(&self, query_text: &str) -> Result<Vec<FusedNode>, SearchError> {
        self.retriever()?.retrieve(query_text).await
    }

    pub async fn query(&self, query_text: &str) -> Result<AnalysisResponse, SearchError> {
        let retriever = self.retriever()?;
        if query_text.trim().is_empty() {
            return Err(SearchError::Request("query is empty".to_string()));
        }

        let nodes = retriever.retrieve(query_text).await?;
        let synthesis = self.synthesizer.synthesize(query_text, &nodes).await?;

        info!(
            folder = %self.folder.display(),
            mode = %retriever.mode(),
            nodes = nodes.len(),
            "query answered"
        );

        Ok(AnalysisResponse {
            query: query_text.to_string(),
            response: synthesis.answer.render(),
            context: synthesis.cited,
        })
    }
}
