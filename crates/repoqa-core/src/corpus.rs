//! Document sources for ingestion.

use std::path::{Path, PathBuf};

use repoqa_memory::document::Document;

use crate::config::CorpusConfig;
use crate::error::QaError;

/// Something that can enumerate the documents to index.
pub trait CorpusSource {
    /// # Errors
    ///
    /// Returns `QaError::Corpus` if the source cannot be enumerated at all.
    fn list_documents(&self) -> Result<Vec<Document>, QaError>;
}

impl CorpusSource for Vec<Document> {
    fn list_documents(&self) -> Result<Vec<Document>, QaError> {
        Ok(self.clone())
    }
}

/// Files under a checked-out repository, filtered by extension.
///
/// `.gitignore` rules and hidden files are honoured. Files that are not valid
/// UTF-8 or exceed `max_file_bytes` are skipped with a warning.
#[derive(Debug, Clone)]
pub struct DirectoryCorpus {
    root: PathBuf,
    extensions: Vec<String>,
    max_file_bytes: u64,
}

impl DirectoryCorpus {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, config: &CorpusConfig) -> Self {
        Self {
            root: root.into(),
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            max_file_bytes: config.max_file_bytes,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn wants(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            })
    }

    fn read(&self, path: &Path, rel: &str) -> Option<Document> {
        let len = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::warn!(file = %rel, "skipping unreadable file: {e}");
                return None;
            }
        };
        if len > self.max_file_bytes {
            tracing::warn!(file = %rel, bytes = len, "skipping oversized file");
            return None;
        }
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(file = %rel, "skipping unreadable file: {e}");
                return None;
            }
        };
        let Ok(content) = String::from_utf8(bytes) else {
            tracing::warn!(file = %rel, "skipping non-UTF-8 file");
            return None;
        };

        let mut doc = Document::new(rel, content);
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            doc.metadata.content_type = content_type_for(&ext.to_ascii_lowercase()).into();
        }
        Some(doc)
    }
}

fn content_type_for(ext: &str) -> &'static str {
    match ext {
        "py" => "text/x-python",
        "rs" => "text/x-rust",
        "md" => "text/markdown",
        _ => "text/plain",
    }
}

impl CorpusSource for DirectoryCorpus {
    fn list_documents(&self) -> Result<Vec<Document>, QaError> {
        if !self.root.is_dir() {
            return Err(QaError::Corpus(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }

        let mut documents: Vec<Document> = ignore::WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .require_git(false)
            .build()
            .flatten()
            .filter(|e| e.file_type().is_some_and(|ft| ft.is_file()) && self.wants(e.path()))
            .filter_map(|entry| {
                let rel = entry
                    .path()
                    .strip_prefix(&self.root)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .replace('\\', "/");
                self.read(entry.path(), &rel)
            })
            .collect();

        documents.sort_by(|a, b| a.metadata.source.cmp(&b.metadata.source));
        tracing::info!(
            root = %self.root.display(),
            documents = documents.len(),
            "corpus loaded"
        );
        Ok(documents)
    }
}
