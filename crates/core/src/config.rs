use crate::analyzer::AnalyzerOptions;
use crate::cache::CacheOptions;
use crate::corpus::LOCATION_FILE_NAME;
use crate::embeddings::{HashingEmbedder, OpenAiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
use crate::ingest::FolderSource;
use crate::models::{FusionMode, IngestionOptions, KeywordOptions};
use crate::retrievers::DEFAULT_VECTOR_TOP_K;
use crate::synthesis::{ChatCompletionSynthesizer, ExtractiveSynthesizer};
use crate::traits::{AnswerSynthesizer, Embedder};
use crate::IngestError;
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_CACHE_FILE_NAME: &str = "index_cache.json";
pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Credentials and endpoint for OpenAI-compatible backends. Passed in
/// explicitly; the library never reads the process environment.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: Option<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_OPENAI_API_BASE.to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum EmbeddingBackend {
    Hashing { dimensions: usize },
    OpenAi { model: String, dimensions: usize },
}

#[derive(Debug, Clone)]
pub enum SynthesisBackend {
    Extractive { max_chars: usize },
    ChatCompletion { model: String },
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub data_root: PathBuf,
    pub cache_file_name: String,
    pub fusion_mode: FusionMode,
    pub vector_top_k: usize,
    pub ingestion: IngestionOptions,
    pub keywords: KeywordOptions,
    pub openai: OpenAiConfig,
    pub embedding: EmbeddingBackend,
    pub synthesis: SynthesisBackend,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            cache_file_name: DEFAULT_CACHE_FILE_NAME.to_string(),
            fusion_mode: FusionMode::And,
            vector_top_k: DEFAULT_VECTOR_TOP_K,
            ingestion: IngestionOptions::default(),
            keywords: KeywordOptions::default(),
            openai: OpenAiConfig::default(),
            embedding: EmbeddingBackend::Hashing {
                dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            },
            synthesis: SynthesisBackend::Extractive { max_chars: 2_000 },
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.vector_top_k == 0 {
            return Err(IngestError::InvalidArgument(
                "vector_top_k must be at least 1".to_string(),
            ));
        }

        let name = self.cache_file_name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(IngestError::InvalidArgument(format!(
                "cache file name must be a plain file name, got {:?}",
                self.cache_file_name
            )));
        }

        if self.keywords.max_keywords_per_chunk == 0 || self.keywords.max_keywords_per_query == 0 {
            return Err(IngestError::InvalidArgument(
                "keyword limits must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn build_embedder(&self) -> Arc<dyn Embedder> {
        match &self.embedding {
            EmbeddingBackend::Hashing { dimensions } => Arc::new(HashingEmbedder {
                dimensions: *dimensions,
            }),
            EmbeddingBackend::OpenAi { model, dimensions } => Arc::new(OpenAiEmbedder::new(
                self.openai.clone(),
                model.clone(),
                *dimensions,
            )),
        }
    }

    pub fn build_synthesizer(&self) -> Arc<dyn AnswerSynthesizer> {
        match &self.synthesis {
            SynthesisBackend::Extractive { max_chars } => {
                Arc::new(ExtractiveSynthesizer::new(*max_chars))
            }
            SynthesisBackend::ChatCompletion { model } => Arc::new(ChatCompletionSynthesizer::new(
                self.openai.clone(),
                model.clone(),
            )),
        }
    }

    /// Folder reader that skips the cache artifact and location metadata.
    pub fn document_source(&self) -> FolderSource {
        FolderSource::new(self.ingestion.clone())
            .excluding(self.cache_file_name.clone())
            .excluding(LOCATION_FILE_NAME)
    }

    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            cache_file_name: self.cache_file_name.clone(),
            ingestion: self.ingestion.clone(),
            keywords: self.keywords,
        }
    }

    pub fn analyzer_options(&self) -> AnalyzerOptions {
        AnalyzerOptions {
            fusion_mode: self.fusion_mode,
            vector_top_k: self.vector_top_k,
            keywords: self.keywords,
        }
    }
}
