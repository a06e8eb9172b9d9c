use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("folder not found: {0}")]
    FolderNotFound(String),

    #[error("no readable documents found in {0}")]
    EmptyCorpus(String),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("page fetch failed: {0}")]
    FetchFailed(String),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid fusion mode {0:?}, expected AND or OR")]
    InvalidMode(String),

    #[error("{retriever} retriever failed: {details}")]
    Retriever { retriever: String, details: String },

    #[error("index build failed: {0}")]
    IndexBuild(#[from] IngestError),

    #[error("index not initialized: {0}")]
    NotInitialized(String),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("search request failed: {0}")]
    Request(String),
}

impl SearchError {
    pub fn retriever(retriever: impl Into<String>, details: impl ToString) -> Self {
        Self::Retriever {
            retriever: retriever.into(),
            details: details.to_string(),
        }
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
