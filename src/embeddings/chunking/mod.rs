#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::loader::Document;

/// A window of document text ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The window text
    pub text: String,
    /// File name of the source document
    pub source: String,
    /// Position of this chunk within its document
    pub chunk_index: usize,
    /// Offset of the first character of the window, counted in chars
    pub char_offset: usize,
}

/// Configuration for content chunking, sizes are counted in characters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum length of a chunk
    pub chunk_size: usize,
    /// Number of characters shared by consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkingConfig {
    /// Distance between the starts of consecutive windows
    #[inline]
    pub const fn stride(&self) -> usize {
        let stride = self.chunk_size.saturating_sub(self.chunk_overlap);
        if stride == 0 { 1 } else { stride }
    }

    /// Number of chunks a text of `char_count` characters produces
    #[inline]
    pub const fn expected_chunk_count(&self, char_count: usize) -> usize {
        if char_count == 0 || self.chunk_size == 0 {
            return 0;
        }
        if char_count <= self.chunk_size {
            return 1;
        }
        (char_count - self.chunk_size).div_ceil(self.stride()) + 1
    }
}

/// Lazy iterator over the chunks of one document.
///
/// Cloning the iterator, or calling [`chunk_document`] again, restarts the
/// sequence from the beginning of the document.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    document: &'a Document,
    config: ChunkingConfig,
    next_start: Option<usize>,
    char_offset: usize,
    chunk_index: usize,
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next_start?;
        let text = self.document.text.as_str();
        let rest = text.get(start..)?;

        let end = rest
            .char_indices()
            .nth(self.config.chunk_size)
            .map_or(text.len(), |(i, _)| start + i);
        let window = text.get(start..end)?;

        let chunk = Chunk {
            text: window.to_string(),
            source: self.document.source.clone(),
            chunk_index: self.chunk_index,
            char_offset: self.char_offset,
        };

        self.next_start = if end == text.len() {
            None
        } else {
            let stride = self.config.stride();
            self.char_offset += stride;
            rest.char_indices().nth(stride).map(|(i, _)| start + i)
        };
        self.chunk_index += 1;

        Some(chunk)
    }
}

/// Split a document into overlapping fixed-size windows
#[inline]
pub fn chunk_document<'a>(document: &'a Document, config: &ChunkingConfig) -> Chunks<'a> {
    let next_start = (!document.text.is_empty() && config.chunk_size > 0).then_some(0);
    Chunks {
        document,
        config: *config,
        next_start,
        char_offset: 0,
        chunk_index: 0,
    }
}

/// Chunk every document of an upload batch, in document order
#[inline]
pub fn chunk_documents(documents: &[Document], config: &ChunkingConfig) -> Vec<Chunk> {
    let chunks: Vec<Chunk> = documents
        .iter()
        .flat_map(|document| chunk_document(document, config))
        .collect();

    debug!(
        "Chunked {} documents into {} chunks (size {}, overlap {})",
        documents.len(),
        chunks.len(),
        config.chunk_size,
        config.chunk_overlap
    );

    chunks
}

/// Rebuild the text of one document from its chunks by dropping the overlap
#[inline]
pub fn reassemble(chunks: &[Chunk], config: &ChunkingConfig) -> String {
    let overlap = config.chunk_size.saturating_sub(config.stride());
    let mut text = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            text.push_str(&chunk.text);
        } else {
            text.extend(chunk.text.chars().skip(overlap));
        }
    }
    text
}
