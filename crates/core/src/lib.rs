pub mod analyzer;
pub mod cache;
pub mod chunking;
pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod error;
pub mod fusion;
pub mod index;
pub mod ingest;
pub mod models;
pub mod retrievers;
pub mod synthesis;
pub mod traits;
pub mod web_search;

pub use analyzer::{AnalyzerOptions, FolderAnalyzer};
pub use cache::{CacheOptions, IndexCache};
pub use chunking::{build_nodes, chunk_by_paragraph, normalize_whitespace, ChunkingConfig};
pub use config::{
    EmbeddingBackend, EngineConfig, OpenAiConfig, SynthesisBackend, DEFAULT_CACHE_FILE_NAME,
    DEFAULT_OPENAI_API_BASE,
};
pub use corpus::{
    create_location_folder, resolve_folder, save_scraped_pages, HttpPageFetcher, LocationData,
    ScrapeOutcome, ScrapeStatus, LOCATION_FILE_NAME,
};
pub use embeddings::{HashingEmbedder, OpenAiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IngestError, SearchError};
pub use fusion::{fuse, HybridRetriever};
pub use index::{DocumentStore, IndexBundle, KeywordTable, VectorIndex};
pub use ingest::{
    discover_documents, load_documents_best_effort, DiscoveredFiles, FolderSource,
    IngestionReport, SkippedDocument,
};
pub use models::{
    AnalysisResponse, DocumentRef, FusedNode, FusionMode, IngestionOptions, KeywordOptions, Node,
    RetrievalResult, RetrieverKind, ScoredNode, SourceDocument,
};
pub use retrievers::{KeywordRetriever, VectorRetriever, DEFAULT_VECTOR_TOP_K};
pub use synthesis::{
    Answer, ChatCompletionSynthesizer, ExtractiveSynthesizer, Synthesis, EMPTY_RESPONSE,
};
pub use traits::{
    AnswerSynthesizer, DocumentSource, Embedder, PageFetcher, Retriever, SearchProvider,
};
pub use web_search::{
    DuckDuckGoSearch, WebSearchResult, DEFAULT_MAX_SEARCH_RESULTS, DUCKDUCKGO_HTML_ENDPOINT,
};
