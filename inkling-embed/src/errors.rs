#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("invalid rebuild request: at least one content type must be selected")]
    InvalidRequest,
    #[error("no embedding model configured")]
    NoEmbeddingModel,
    #[error("item not found: {0}")]
    NotFound(String),
    #[error("nothing to embed for item: {0}")]
    EmptyContent(String),
    #[error("embedding error: {0}")]
    Embedding(String),
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimMismatch { expected: usize, actual: usize },
    #[error("missing data directory")]
    MissingDataDir,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(String),
    #[error("sqlite-vec initialization error: {0}")]
    SqliteVec(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type EmbedResult<T> = Result<T, EmbedError>;
