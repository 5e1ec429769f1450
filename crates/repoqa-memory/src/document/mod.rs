pub mod error;
pub mod pipeline;
pub mod splitter;
pub mod types;

pub use error::DocumentError;
pub use pipeline::{IngestReport, IngestionPipeline};
pub use splitter::{Chunks, SplitterConfig, TextSplitter};
pub use types::{Chunk, Document, DocumentMetadata};
