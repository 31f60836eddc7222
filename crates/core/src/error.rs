use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("index codec error: {0}")]
    IndexCodec(#[from] bincode::Error),

    #[error("index dimension {expected} does not match embedding dimension {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("embedding failed: {0}")]
    Embed(#[from] EmbedError),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
