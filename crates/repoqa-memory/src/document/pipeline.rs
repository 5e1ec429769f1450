use std::sync::Arc;
use std::time::Instant;

use repoqa_llm::LlmProvider;

use super::{Chunk, Document, DocumentError, TextSplitter};
use crate::embedding::EmbeddingClient;
use crate::vector_index::{IndexEntry, VectorIndex};

const INGEST_WINDOW: usize = 50;

/// Summary of an ingestion run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub duration_ms: u64,
}

pub struct IngestionPipeline<P: LlmProvider> {
    splitter: TextSplitter,
    embedder: EmbeddingClient<P>,
    index: Arc<VectorIndex>,
}

impl<P: LlmProvider> IngestionPipeline<P> {
    #[must_use]
    pub fn new(splitter: TextSplitter, embedder: EmbeddingClient<P>, index: Arc<VectorIndex>) -> Self {
        Self {
            splitter,
            embedder,
            index,
        }
    }

    #[must_use]
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Split, embed and store one document. Returns the chunk count.
    ///
    /// All chunks of the document are added in a single batch, so a failure
    /// leaves no partial document in the index.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding fails or the index rejects the vectors.
    pub async fn ingest(&self, document: &Document) -> Result<usize, DocumentError> {
        let chunks: Vec<_> = self.splitter.split(document).collect();
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let vectors = self.embedder.embed_many(&texts).await?;
        self.store(document, chunks, vectors)
    }

    fn store(
        &self,
        document: &Document,
        chunks: Vec<Chunk>,
        vectors: impl IntoIterator<Item = Vec<f32>>,
    ) -> Result<usize, DocumentError> {
        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect();
        let count = entries.len();
        if count > 0 {
            self.index.add(entries)?;
        }

        tracing::debug!(source = %document.metadata.source, chunks = count, "document ingested");
        Ok(count)
    }

    /// Ingest every document in order, stopping at the first failure.
    ///
    /// Documents are embedded in windows of `INGEST_WINDOW`, so the embedding
    /// parallelism spans files. Each document is still stored as one batch;
    /// when a window fails, none of its documents reach the index.
    ///
    /// # Errors
    ///
    /// Returns the first embedding or index error encountered.
    pub async fn ingest_all(&self, documents: &[Document]) -> Result<IngestReport, DocumentError> {
        let started = Instant::now();
        let mut report = IngestReport::default();
        tracing::info!(documents = documents.len(), "ingestion started");

        for window in documents.chunks(INGEST_WINDOW) {
            let split: Vec<Vec<Chunk>> = window
                .iter()
                .map(|document| self.splitter.split(document).collect())
                .collect();
            let texts: Vec<&str> = split
                .iter()
                .flatten()
                .map(|c| c.content.as_str())
                .collect();
            let mut vectors = self.embedder.embed_many(&texts).await?.into_iter();

            for (document, chunks) in window.iter().zip(split) {
                let take = chunks.len();
                report.chunks += self.store(document, chunks, vectors.by_ref().take(take))?;
                report.documents += 1;
            }
            if report.documents % INGEST_WINDOW == 0 {
                tracing::info!(
                    progress = format_args!("{}/{}", report.documents, documents.len()),
                    chunks = report.chunks,
                );
            }
        }

        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            documents = report.documents,
            chunks = report.chunks,
            duration_ms = report.duration_ms,
            "ingestion complete"
        );
        Ok(report)
    }
}
