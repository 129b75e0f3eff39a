use std::sync::Arc;

use crate::core::config::{AppPaths, ConfigService, RagSettings};
use crate::rag::RagPipeline;

pub mod error;

use error::InitializationError;

/// Shared state handed to every route.
///
/// The pipeline starts `uninitialized`; [`AppState::spawn_initialization`]
/// moves it forward in the background while routes already answer.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub settings: Arc<RagSettings>,
    pub pipeline: Arc<RagPipeline>,
}

impl AppState {
    /// Discovers paths, loads `config.yml` (plus secrets and environment
    /// overrides) and prepares an uninitialized pipeline.
    pub fn initialize() -> Result<Arc<Self>, InitializationError> {
        let paths = Arc::new(AppPaths::new());
        let config = ConfigService::new(paths.clone());
        let settings = config
            .load_settings()
            .map_err(|e| InitializationError::Config(e.into()))?;

        let pipeline = Arc::new(RagPipeline::new(settings));
        Ok(Self::from_parts(paths, pipeline))
    }

    pub fn from_parts(paths: Arc<AppPaths>, pipeline: Arc<RagPipeline>) -> Arc<Self> {
        let settings = Arc::new(pipeline.settings().clone());
        Arc::new(AppState {
            paths,
            settings,
            pipeline,
        })
    }

    /// Runs pipeline initialization on a background task. Failures end up in
    /// the pipeline state; nothing is propagated here.
    pub fn spawn_initialization(&self) -> tokio::task::JoinHandle<()> {
        let pipeline = self.pipeline.clone();
        tokio::spawn(async move {
            if let Err(err) = pipeline.initialize().await {
                tracing::warn!("RAG pipeline unavailable: {}", err);
            }
        })
    }
}
