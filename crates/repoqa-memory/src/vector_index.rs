//! Append-only in-memory vector index with similarity and MMR retrieval.

use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use serde::{Deserialize, Serialize};

use crate::document::Chunk;

pub const DEFAULT_MMR_LAMBDA: f32 = 0.5;
pub const DEFAULT_FETCH_K: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("dimension mismatch: index holds {expected}-d vectors, got {actual}-d")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("empty embedding vector")]
    EmptyVector,

    #[error("index lock poisoned: {0}")]
    Poisoned(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A chunk together with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchMode {
    /// Plain nearest neighbours by cosine similarity.
    Similarity,
    /// Maximal marginal relevance over the `fetch_k` nearest candidates.
    Diverse { lambda: f32, fetch_k: usize },
}

impl SearchMode {
    #[must_use]
    pub fn diverse(lambda: f32) -> Self {
        Self::Diverse {
            lambda,
            fetch_k: DEFAULT_FETCH_K,
        }
    }
}

impl Default for SearchMode {
    fn default() -> Self {
        Self::diverse(DEFAULT_MMR_LAMBDA)
    }
}

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
    dimension: Option<usize>,
    entries: Vec<IndexEntry>,
}

#[derive(Default)]
struct Inner {
    dimension: Option<usize>,
    entries: Vec<IndexEntry>,
}

pub struct VectorIndex {
    inner: RwLock<Inner>,
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("len", &self.len())
            .field("dimension", &self.dimension())
            .finish_non_exhaustive()
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl VectorIndex {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Read access for the infallible accessors. Writers validate a batch
    /// before touching `Inner`, so the data behind a poisoned lock is whole.
    fn read_recovered(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| {
            tracing::warn!("vector index lock poisoned, reading recovered state");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Vector length fixed by the first stored entry.
    #[must_use]
    pub fn dimension(&self) -> Option<usize> {
        self.read_recovered().dimension
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read_recovered().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a batch of entries.
    ///
    /// The whole batch is validated before anything is stored, so a rejected
    /// batch leaves the index untouched.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::DimensionMismatch` if any vector length differs
    /// from the index dimension (or from the first vector of the batch when
    /// the index is empty), and `IndexError::EmptyVector` for zero-length vectors.
    pub fn add(&self, entries: Vec<IndexEntry>) -> Result<(), IndexError> {
        let Some(first) = entries.first() else {
            return Ok(());
        };
        let mut inner = self
            .inner
            .write()
            .map_err(|e| IndexError::Poisoned(e.to_string()))?;

        let expected = inner.dimension.unwrap_or(first.vector.len());
        if expected == 0 {
            return Err(IndexError::EmptyVector);
        }
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != expected) {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: bad.vector.len(),
            });
        }

        inner.dimension = Some(expected);
        inner.entries.extend(entries);
        Ok(())
    }

    /// Return up to `k` chunks for `vector`.
    ///
    /// When `k` exceeds the number of candidates every candidate is returned.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::DimensionMismatch` if the query vector length
    /// differs from the index dimension.
    pub fn query(
        &self,
        vector: &[f32],
        k: usize,
        mode: SearchMode,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| IndexError::Poisoned(e.to_string()))?;

        let Some(expected) = inner.dimension else {
            return Ok(Vec::new());
        };
        if vector.len() != expected {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut ranked: Vec<(usize, f32)> = inner
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(vector, &e.vector)))
            .collect();
        // Stable sort keeps insertion order among equal scores.
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let picked = match mode {
            SearchMode::Similarity => {
                ranked.truncate(k);
                ranked
            }
            SearchMode::Diverse { lambda, fetch_k } => {
                ranked.truncate(fetch_k.max(k));
                mmr_select(ranked, &inner.entries, k, lambda)
            }
        };

        Ok(picked
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: inner.entries[i].chunk.clone(),
                score,
            })
            .collect())
    }

    /// Copy of every stored entry in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<IndexEntry> {
        self.read_recovered().entries.clone()
    }

    /// Write the index to `path` as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| IndexError::Poisoned(e.to_string()))?;
        let snapshot = SnapshotRef {
            dimension: inner.dimension,
            entries: &inner.entries,
        };
        let file = std::fs::File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), &snapshot)?;
        tracing::info!(path = %path.display(), entries = inner.entries.len(), "index snapshot saved");
        Ok(())
    }

    /// Read an index previously written by [`VectorIndex::save`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the stored
    /// vectors disagree with the stored dimension.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let file = std::fs::File::open(path)?;
        let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))?;
        if let (Some(expected), Some(first)) = (snapshot.dimension, snapshot.entries.first())
            && first.vector.len() != expected
        {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: first.vector.len(),
            });
        }
        let index = Self::new();
        index.add(snapshot.entries)?;
        tracing::info!(path = %path.display(), entries = index.len(), "index snapshot loaded");
        Ok(index)
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    dimension: Option<usize>,
    entries: &'a [IndexEntry],
}

/// Maximal marginal relevance over `candidates`, which must be sorted by
/// descending similarity. The top candidate is always picked first; ties pick
/// the earlier candidate.
fn mmr_select(
    mut candidates: Vec<(usize, f32)>,
    entries: &[IndexEntry],
    k: usize,
    lambda: f32,
) -> Vec<(usize, f32)> {
    let mut selected: Vec<(usize, f32)> = Vec::with_capacity(k.min(candidates.len()));
    if candidates.is_empty() {
        return selected;
    }
    selected.push(candidates.remove(0));

    while selected.len() < k && !candidates.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (pos, &(idx, sim)) in candidates.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&(s, _)| cosine_similarity(&entries[idx].vector, &entries[s].vector))
                .fold(f32::NEG_INFINITY, f32::max);
            let score = lambda * sim - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_pos = pos;
                best_score = score;
            }
        }
        selected.push(candidates.remove(best_pos));
    }
    selected
}
