pub mod gemini;
pub mod openai;
pub mod provider;
pub mod sse;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

use std::sync::Arc;
use std::time::Duration;

use crate::core::config::{ProviderKind, ProviderSettings};

pub use gemini::GeminiProvider;
pub use openai::OpenAiCompatProvider;
pub use provider::LlmProvider;
pub use types::{ChatMessage, ChatRequest, EmbedTask, ProviderError};

/// Builds the provider client described by `settings`.
pub fn connect(settings: &ProviderSettings) -> Result<Arc<dyn LlmProvider>, ProviderError> {
    let timeout = Duration::from_secs(settings.timeout_secs);
    let base_url = settings.base_url();

    let provider: Arc<dyn LlmProvider> = match settings.provider {
        ProviderKind::Gemini => {
            let key = settings.api_key.as_deref().unwrap_or_default();
            Arc::new(GeminiProvider::new(base_url, key, timeout)?)
        }
        ProviderKind::OpenAiCompatible => Arc::new(OpenAiCompatProvider::new(
            base_url,
            settings.api_key.as_deref(),
            timeout,
        )?),
    };

    tracing::debug!(
        "Connected {} provider for model {}",
        provider.name(),
        settings.model
    );
    Ok(provider)
}
