#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("invalid splitter config: {0}")]
    InvalidConfig(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] crate::embedding::EmbedError),

    #[error("index error: {0}")]
    Index(#[from] crate::vector_index::IndexError),
}
