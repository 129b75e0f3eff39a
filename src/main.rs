use anyhow::Context;
use tokio::net::TcpListener;

use legal_rag::core::config::{ProviderKind, RagSettings};
use legal_rag::core::logging;
use legal_rag::server;
use legal_rag::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let state = AppState::initialize().context("Failed to initialize application state")?;
    logging::init(&state.paths);

    report_startup_problems(&state.settings);
    state.spawn_initialization();

    let bind_addr = format!(
        "{}:{}",
        state.settings.server.host, state.settings.server.port
    );
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    tracing::info!("Starting Legal RAG service");
    tracing::info!("Access the application at: http://{}", addr);

    let app = server::router(state.clone());
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Problems that will make initialization fail later, reported up front.
fn report_startup_problems(settings: &RagSettings) {
    if !settings.document.path.exists() && !settings.index.path.exists() {
        tracing::error!(
            "Document not found at {} and no index at {}; the service will not be able to answer",
            settings.document.path.display(),
            settings.index.path.display()
        );
    }

    let needs_key = |provider: ProviderKind, key: &Option<String>| {
        provider == ProviderKind::Gemini && key.as_deref().map_or(true, |k| k.trim().is_empty())
    };
    if needs_key(settings.embedding.provider, &settings.embedding.api_key)
        || needs_key(settings.generation.provider, &settings.generation.api_key)
    {
        tracing::warn!(
            "No Gemini API key configured. Set GOOGLE_API_KEY or add it to secrets.yaml"
        );
    }
}
