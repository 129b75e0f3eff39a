//! Retrieval-augmented question answering over a single document.
//!
//! - `chunker`: overlapping character windows over the document text
//! - `embedder` / `generator`: thin adapters over an [`crate::llm::LlmProvider`]
//! - `index`: cosine top-k search, persisted through `sqlite`
//! - `pipeline`: build-or-load initialization and the per-query flow

pub mod chunker;
pub mod document;
pub mod embedder;
pub mod generator;
pub mod index;
pub mod pipeline;
pub mod prompt;
mod sqlite;
pub mod status;


pub use chunker::{Chunker, TextChunk};
pub use document::{load_document, Document};
pub use embedder::Embedder;
pub use generator::{AnswerStream, Generator};
pub use index::{IndexEntry, IndexManifest, RetrievedChunk, VectorIndex};
pub use pipeline::{ProviderConnector, RagPipeline};
pub use prompt::{compose_prompt, REFUSAL_MESSAGE};
pub use status::{InitSnapshot, InitState, InitStatus};
