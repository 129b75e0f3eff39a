use std::path::Path;

use serde::Serialize;

use super::chunker::TextChunk;
use super::sqlite;
use crate::core::errors::RagError;
use crate::vector_math::rank_descending_by_cosine;

/// One chunk together with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub embedding: Vec<f32>,
    pub chunk: TextChunk,
    /// Display name of the document the chunk came from.
    pub source: String,
}

/// A retrieval hit, most similar first.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk: TextChunk,
    pub source: String,
    pub score: f32,
}

/// What an index was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexManifest {
    pub embedding_model: String,
    pub dimension: usize,
    pub entry_count: usize,
    pub document_path: String,
    pub document_sha256: Option<String>,
    pub built_at: String,
}

/// Chunk embeddings held in memory, persisted to a single SQLite file.
#[derive(Debug)]
pub struct VectorIndex {
    manifest: IndexManifest,
    chunks: Vec<(TextChunk, String)>,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// Persists `entries` at `location`, replacing any previous index there.
    ///
    /// `dimension` and `entry_count` in the manifest are filled from the
    /// entries themselves.
    pub async fn build(
        location: &Path,
        entries: Vec<IndexEntry>,
        mut manifest: IndexManifest,
    ) -> Result<Self, RagError> {
        let Some(first) = entries.first() else {
            return Err(RagError::IndexBuild("no entries to index".to_string()));
        };

        let dimension = first.embedding.len();
        if dimension == 0 {
            return Err(RagError::IndexBuild("embeddings are empty".to_string()));
        }
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dimension) {
            return Err(RagError::IndexBuild(format!(
                "chunk {} has dimension {}, expected {}",
                bad.chunk.chunk_index,
                bad.embedding.len(),
                dimension
            )));
        }

        manifest.dimension = dimension;
        manifest.entry_count = entries.len();
        if manifest.built_at.is_empty() {
            manifest.built_at = chrono::Utc::now().to_rfc3339();
        }

        sqlite::write_index(location, &entries, &manifest).await?;
        tracing::info!(
            "Built vector index at {} ({} entries, dimension {})",
            location.display(),
            entries.len(),
            dimension
        );

        Ok(Self::from_parts(manifest, entries))
    }

    pub async fn load(location: &Path) -> Result<Self, RagError> {
        let (mut manifest, entries) = sqlite::read_index(location).await?;
        if entries.is_empty() {
            return Err(RagError::IndexStorage(format!(
                "{} contains no entries",
                location.display()
            )));
        }

        if manifest.dimension == 0 {
            manifest.dimension = entries[0].embedding.len();
        }
        if let Some(bad) = entries
            .iter()
            .find(|e| e.embedding.len() != manifest.dimension)
        {
            return Err(RagError::IndexStorage(format!(
                "chunk {} has dimension {}, expected {}",
                bad.chunk.chunk_index,
                bad.embedding.len(),
                manifest.dimension
            )));
        }
        manifest.entry_count = entries.len();

        tracing::info!(
            "Loaded vector index from {} ({} entries)",
            location.display(),
            entries.len()
        );
        Ok(Self::from_parts(manifest, entries))
    }

    fn from_parts(manifest: IndexManifest, entries: Vec<IndexEntry>) -> Self {
        let (vectors, chunks) = entries
            .into_iter()
            .map(|e| (e.embedding, (e.chunk, e.source)))
            .unzip();
        Self {
            manifest,
            chunks,
            vectors,
        }
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Up to `k` chunks ranked by cosine similarity to `query`.
    ///
    /// `k` below 1 is treated as 1. Equal scores keep index order.
    pub fn retrieve(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, RagError> {
        if self.is_empty() {
            return Err(RagError::IndexEmpty);
        }
        if query.len() != self.manifest.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.manifest.dimension,
                actual: query.len(),
            });
        }

        let ranked = rank_descending_by_cosine(query, &self.vectors)?;
        Ok(ranked
            .into_iter()
            .take(k.max(1))
            .map(|(position, score)| {
                let (chunk, source) = &self.chunks[position];
                RetrievedChunk {
                    chunk: chunk.clone(),
                    source: source.clone(),
                    score,
                }
            })
            .collect())
    }
}
