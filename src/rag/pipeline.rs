//! Initialization and per-query flow.
//!
//! `initialize` loads the persisted index (or builds it from the document)
//! and connects both providers. Query operations check readiness first and
//! never touch the index or the state.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use futures_util::FutureExt;

use super::chunker::Chunker;
use super::document::{file_sha256, load_document};
use super::embedder::Embedder;
use super::generator::{AnswerStream, Generator};
use super::index::{IndexEntry, IndexManifest, RetrievedChunk, VectorIndex};
use super::prompt::compose_prompt;
use super::status::{InitSnapshot, InitState, InitStatus};
use crate::core::config::{ProviderSettings, RagSettings};
use crate::core::errors::RagError;
use crate::llm::{self, LlmProvider};

/// Turns provider settings into a client.
pub type ProviderConnector =
    Box<dyn Fn(&ProviderSettings) -> Result<Arc<dyn LlmProvider>, RagError> + Send + Sync>;

struct ReadyComponents {
    index: VectorIndex,
    embedder: Embedder,
    generator: Generator,
}

pub struct RagPipeline {
    settings: RagSettings,
    connector: ProviderConnector,
    state: InitState,
    components: OnceLock<ReadyComponents>,
}

impl RagPipeline {
    pub fn new(settings: RagSettings) -> Self {
        Self::with_connector(settings, |provider: &ProviderSettings| {
            llm::connect(provider).map_err(|e| RagError::Configuration(e.to_string()))
        })
    }

    /// Same as [`RagPipeline::new`] but with a custom way of reaching the
    /// embedding and generation providers.
    pub fn with_connector<F>(settings: RagSettings, connector: F) -> Self
    where
        F: Fn(&ProviderSettings) -> Result<Arc<dyn LlmProvider>, RagError> + Send + Sync + 'static,
    {
        Self {
            settings,
            connector: Box::new(connector),
            state: InitState::new(),
            components: OnceLock::new(),
        }
    }

    pub fn settings(&self) -> &RagSettings {
        &self.settings
    }

    pub fn state(&self) -> InitSnapshot {
        self.state.snapshot()
    }

    /// Manifest of the loaded index, once ready.
    pub fn index_manifest(&self) -> Option<&IndexManifest> {
        self.components.get().map(|c| c.index.manifest())
    }

    /// Runs initialization at most once. Later calls report the outcome of
    /// the first attempt without redoing any work.
    pub async fn initialize(&self) -> Result<(), RagError> {
        if !self.state.begin("Loading RAG engine...") {
            let snapshot = self.state.snapshot();
            return match snapshot.status {
                InitStatus::Failed => Err(RagError::NotReady(snapshot.message)),
                _ => Ok(()),
            };
        }

        tracing::info!("Initializing RAG pipeline");
        // A panic must not leave the state stuck at `initializing`.
        let outcome = AssertUnwindSafe(self.build_components())
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(RagError::Configuration(format!(
                    "initialization panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });

        match outcome {
            Ok(components) => {
                let chunks = components.index.len();
                // Publish before flipping the state so readers never see Ready
                // without components.
                let _ = self.components.set(components);
                self.state.mark_ready("System is ready to answer questions.");
                tracing::info!("RAG pipeline ready ({} indexed chunks)", chunks);
                Ok(())
            }
            Err(err) => {
                tracing::error!("RAG initialization failed: {}", err);
                self.state
                    .mark_failed(&format!("Fatal error during initialization: {}", err));
                Err(err)
            }
        }
    }

    async fn build_components(&self) -> Result<ReadyComponents, RagError> {
        let embedding = &self.settings.embedding;
        let embedder = Embedder::new(
            (self.connector)(embedding)?,
            embedding.model.clone(),
            embedding.batch_size,
        );

        let index = self.load_or_build_index(&embedder).await?;

        let generation = &self.settings.generation;
        let generator = Generator::new((self.connector)(&generation.connection())?, generation);

        Ok(ReadyComponents {
            index,
            embedder,
            generator,
        })
    }

    async fn load_or_build_index(&self, embedder: &Embedder) -> Result<VectorIndex, RagError> {
        let location = &self.settings.index.path;
        self.state.set_message("Loading vector index...");

        match VectorIndex::load(location).await {
            Ok(index) if index.manifest().embedding_model == embedder.model() => {
                self.warn_if_document_changed(index.manifest());
                return Ok(index);
            }
            Ok(index) => {
                tracing::warn!(
                    "Index at {} was built with embedding model '{}', configured model is '{}'; rebuilding",
                    location.display(),
                    index.manifest().embedding_model,
                    embedder.model()
                );
            }
            Err(RagError::IndexNotFound(_)) => {
                tracing::info!("No index at {}; creating a new one", location.display());
            }
            Err(err) => return Err(err),
        }

        self.build_index(embedder).await
    }

    async fn build_index(&self, embedder: &Embedder) -> Result<VectorIndex, RagError> {
        let path = self.settings.document.path.clone();
        self.state.set_message("Loading document...");

        let document_path = path.clone();
        let document = tokio::task::spawn_blocking(move || load_document(&document_path))
            .await
            .map_err(|e| RagError::DocumentLoad(e.to_string()))??;

        let chunks = Chunker::new(self.settings.chunking).chunk_document(&document)?;
        self.state.set_message(&format!(
            "Creating embeddings for {} chunks... This may take a moment.",
            chunks.len()
        ));

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = embedder.embed_documents(&texts).await?;

        let source = source_name(&path);
        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, embedding)| IndexEntry {
                embedding,
                chunk,
                source: source.clone(),
            })
            .collect();

        let manifest = IndexManifest {
            embedding_model: embedder.model().to_string(),
            document_path: path.display().to_string(),
            document_sha256: file_sha256(&path),
            ..IndexManifest::default()
        };

        self.state.set_message("Writing vector index...");
        VectorIndex::build(&self.settings.index.path, entries, manifest).await
    }

    /// The index cache is keyed by its path only; a changed document is
    /// reported but the existing index is still served.
    fn warn_if_document_changed(&self, manifest: &IndexManifest) {
        let Some(recorded) = manifest.document_sha256.as_deref() else {
            return;
        };
        let document = &self.settings.document.path;
        match file_sha256(document) {
            Some(current) if current != recorded => tracing::warn!(
                "{} changed since the index was built; delete {} to rebuild it",
                document.display(),
                self.settings.index.path.display()
            ),
            _ => {}
        }
    }

    fn ready(&self) -> Result<&ReadyComponents, RagError> {
        let snapshot = self.state.snapshot();
        match (snapshot.status, self.components.get()) {
            (InitStatus::Ready, Some(components)) => Ok(components),
            _ => Err(RagError::NotReady(snapshot.message)),
        }
    }

    async fn relevant_chunks(
        &self,
        components: &ReadyComponents,
        question: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, RagError> {
        let query = components.embedder.embed_query(question).await?;
        let hits = components.index.retrieve(&query, k)?;
        tracing::debug!(
            "Retrieved {} chunks (best score {:.3})",
            hits.len(),
            hits.first().map(|hit| hit.score).unwrap_or_default()
        );
        Ok(hits)
    }

    async fn prompt_for(
        &self,
        components: &ReadyComponents,
        question: &str,
    ) -> Result<String, RagError> {
        let hits = self
            .relevant_chunks(components, question, self.settings.retrieval.top_k)
            .await?;
        let texts: Vec<&str> = hits.iter().map(|hit| hit.chunk.text.as_str()).collect();
        Ok(compose_prompt(&self.settings.document.title, &texts, question))
    }

    pub async fn answer(&self, question: &str) -> Result<String, RagError> {
        let components = self.ready()?;
        let question = validate_question(question)?;

        let prompt = self.prompt_for(components, question).await?;
        components.generator.generate(&prompt).await
    }

    pub async fn answer_streaming(&self, question: &str) -> Result<AnswerStream, RagError> {
        let components = self.ready()?;
        let question = validate_question(question)?;

        let prompt = self.prompt_for(components, question).await?;
        components.generator.generate_streaming(&prompt).await
    }

    /// The `k` chunks most relevant to `question`, with their metadata.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<RetrievedChunk>, RagError> {
        let components = self.ready()?;
        let question = validate_question(question)?;

        self.relevant_chunks(components, question, k).await
    }
}

fn validate_question(question: &str) -> Result<&str, RagError> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(RagError::InvalidQuery(
            "question must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
