use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Where the text came from, usually a path relative to the corpus root.
    pub source: String,
    pub content_type: String,
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    #[must_use]
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: DocumentMetadata {
                source: source.into(),
                content_type: "text/plain".into(),
                extra: HashMap::new(),
            },
        }
    }
}

/// A contiguous slice of a [`Document`].
///
/// `start`/`end` are char offsets into the document; `content` is exactly
/// `document.content` between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub content: String,
    pub metadata: DocumentMetadata,
    pub chunk_index: usize,
    pub start: usize,
    pub end: usize,
}

impl Chunk {
    /// Deterministic id: the same source and span always map to the same id.
    #[must_use]
    pub fn derive_id(source: &str, start: usize, end: usize) -> Uuid {
        Uuid::new_v5(
            &Uuid::NAMESPACE_URL,
            format!("{source}#{start}-{end}").as_bytes(),
        )
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.metadata.source
    }
}
