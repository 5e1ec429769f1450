//! Corpus chunking, embedding, vector retrieval and conversation memory.

pub mod conversation;
pub mod document;
pub mod embedding;
pub mod vector_index;

pub use conversation::{ConversationMemory, ConversationTurn, SummaryError};
pub use embedding::{EmbedError, EmbeddingClient};
pub use vector_index::{IndexEntry, IndexError, ScoredChunk, SearchMode, VectorIndex};

/// Estimate token count using chars/4 heuristic.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}
