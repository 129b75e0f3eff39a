//! Splits document text into overlapping windows.
//!
//! Windows are measured in characters. Each window after the first starts
//! `chunk_overlap` characters before the previous one ended, so dropping that
//! prefix from every later chunk and concatenating gives back the input.

use serde::{Deserialize, Serialize};

use super::document::Document;
use crate::core::config::ChunkingSettings;
use crate::core::errors::RagError;

/// Preferred cut points, strongest first.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// A text chunk with its position in the source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    /// The text content
    pub text: String,
    /// Chunk index within the document
    pub chunk_index: usize,
    /// Character offset in the document text
    pub start_offset: usize,
    /// Characters shared with the previous chunk
    pub overlap: usize,
    /// 1-based page on which the chunk starts
    pub page: usize,
}

impl TextChunk {
    /// The part of the chunk not already covered by its predecessor.
    pub fn fresh_text(&self) -> &str {
        match self.text.char_indices().nth(self.overlap) {
            Some((byte, _)) => &self.text[byte..],
            None => "",
        }
    }
}

pub struct Chunker {
    config: ChunkingSettings,
}

impl Chunker {
    pub fn new(config: ChunkingSettings) -> Self {
        Self { config }
    }

    /// Chunks a loaded document, attaching page numbers.
    pub fn chunk_document(&self, document: &Document) -> Result<Vec<TextChunk>, RagError> {
        if document.is_blank() {
            return Err(RagError::DocumentEmpty(document.source.display().to_string()));
        }

        let offsets = document.page_offsets();
        let mut chunks = self.split_text(&document.text())?;
        for chunk in &mut chunks {
            chunk.page = page_for_offset(&offsets, chunk.start_offset);
        }
        Ok(chunks)
    }

    /// Splits raw text into overlapping chunks.
    pub fn split_text(&self, text: &str) -> Result<Vec<TextChunk>, RagError> {
        if text.trim().is_empty() {
            return Err(RagError::DocumentEmpty("text is blank".to_string()));
        }

        let chunk_size = self.config.chunk_size.max(1);
        let overlap = self.config.chunk_overlap.min(chunk_size - 1);

        let chars: Vec<char> = text.chars().collect();
        let total_chars = chars.len();

        let mut chunks = Vec::new();
        let mut start = 0;
        let mut overlap_with_previous = 0;

        loop {
            let mut end = (start + chunk_size).min(total_chars);
            if end < total_chars {
                // Cut must leave the next window starting past this one's start.
                end = find_boundary(&chars, start + overlap + 1, end).unwrap_or(end);
            }

            chunks.push(TextChunk {
                text: chars[start..end].iter().collect(),
                chunk_index: chunks.len(),
                start_offset: start,
                overlap: overlap_with_previous,
                page: 1,
            });

            if end >= total_chars {
                break;
            }
            start = end - overlap;
            overlap_with_previous = overlap;
        }

        tracing::debug!(
            "Split {} characters into {} chunks (size {}, overlap {})",
            total_chars,
            chunks.len(),
            chunk_size,
            overlap
        );
        Ok(chunks)
    }
}

/// Latest cut position in `lo..=hi` that falls right after a separator,
/// trying stronger separators first.
fn find_boundary(chars: &[char], lo: usize, hi: usize) -> Option<usize> {
    if lo > hi {
        return None;
    }

    for separator in SEPARATORS {
        let sep: Vec<char> = separator.chars().collect();
        let found = (lo..=hi)
            .rev()
            .find(|&cut| cut >= sep.len() && chars[cut - sep.len()..cut] == sep[..]);
        if found.is_some() {
            return found;
        }
    }

    None
}

fn page_for_offset(page_offsets: &[usize], offset: usize) -> usize {
    page_offsets
        .iter()
        .rposition(|&page_start| page_start <= offset)
        .map(|idx| idx + 1)
        .unwrap_or(1)
}

/// Inverse of chunking: joins chunks with their overlaps removed.
pub fn reassemble(chunks: &[TextChunk]) -> String {
    chunks.iter().map(TextChunk::fresh_text).collect()
}
