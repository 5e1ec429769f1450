use super::error::DocumentError;
use super::types::{Chunk, Document};

/// Natural cut points, most preferred first.
///
/// `keep_prefix` is how many bytes of the separator stay with the preceding
/// chunk: all of it for whitespace separators, only the newline for
/// `class`/`def` so the keyword opens the next chunk.
const SEPARATORS: &[(&str, usize)] = &[
    ("\nclass ", 1),
    ("\ndef ", 1),
    ("\n\tdef ", 1),
    ("\n\n", 2),
    ("\n", 1),
    (". ", 2),
    (" ", 1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitterConfig {
    /// Maximum chunk length in chars.
    pub chunk_size: usize,
    /// Chars shared between consecutive chunks. Must be below `chunk_size`.
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            chunk_overlap: 200,
        }
    }
}

impl SplitterConfig {
    /// # Errors
    ///
    /// Returns `DocumentError::InvalidConfig` if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`.
    pub fn validate(&self) -> Result<(), DocumentError> {
        if self.chunk_size == 0 {
            return Err(DocumentError::InvalidConfig(
                "chunk_size must be positive".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(DocumentError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    /// Boundary cuts closer than this (in chars) to the chunk start are ignored.
    fn min_boundary_chars(&self) -> usize {
        (self.chunk_overlap + 1).max(self.chunk_size / 2)
    }
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: SplitterConfig,
}

impl TextSplitter {
    /// # Errors
    ///
    /// Returns `DocumentError::InvalidConfig` for an invalid size/overlap pair.
    pub fn new(config: SplitterConfig) -> Result<Self, DocumentError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Lazily split `document` into overlapping chunks in document order.
    ///
    /// Each call returns a fresh iterator, so the sequence can be restarted.
    #[must_use]
    pub fn split<'a>(&self, document: &'a Document) -> Chunks<'a> {
        Chunks {
            document,
            config: self.config,
            byte_pos: 0,
            char_pos: 0,
            index: 0,
            done: document.content.is_empty(),
        }
    }
}

/// Iterator returned by [`TextSplitter::split`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    document: &'a Document,
    config: SplitterConfig,
    byte_pos: usize,
    char_pos: usize,
    index: usize,
    done: bool,
}

impl Chunks<'_> {
    fn emit(&mut self, end_byte: usize, end_char: usize) -> Chunk {
        let doc = self.document;
        let chunk = Chunk {
            id: Chunk::derive_id(&doc.metadata.source, self.char_pos, end_char),
            content: doc.content[self.byte_pos..end_byte].to_owned(),
            metadata: doc.metadata.clone(),
            chunk_index: self.index,
            start: self.char_pos,
            end: end_char,
        };
        self.index += 1;
        chunk
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }
        let text = self.document.content.as_str();
        let rest = &text[self.byte_pos..];

        let Some((window_len, _)) = rest.char_indices().nth(self.config.chunk_size) else {
            self.done = true;
            let end_char = self.char_pos + rest.chars().count();
            return Some(self.emit(text.len(), end_char));
        };

        let window = &rest[..window_len];
        let cut = find_boundary(window, self.config.min_boundary_chars()).unwrap_or(window_len);
        let cut_chars = window[..cut].chars().count();

        let end_byte = self.byte_pos + cut;
        let end_char = self.char_pos + cut_chars;
        let chunk = self.emit(end_byte, end_char);

        // Step back `chunk_overlap` chars from the cut for the next start.
        let overlap = self.config.chunk_overlap;
        let next_byte = if overlap == 0 {
            end_byte
        } else {
            text[..end_byte]
                .char_indices()
                .rev()
                .nth(overlap - 1)
                .map_or(0, |(i, _)| i)
        };
        self.byte_pos = next_byte;
        self.char_pos = end_char - overlap;

        Some(chunk)
    }
}

/// Byte offset of the most preferred boundary in `window` that keeps at least
/// `min_chars` chars in the chunk.
fn find_boundary(window: &str, min_chars: usize) -> Option<usize> {
    SEPARATORS.iter().find_map(|&(sep, keep_prefix)| {
        let cut = window.rfind(sep)? + keep_prefix;
        (window[..cut].chars().count() >= min_chars).then_some(cut)
    })
}
