use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::{ChatRequest, EmbedTask, ProviderError};

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "gemini", "openai_compatible")
    fn name(&self) -> &str;

    /// chat completion (non-streaming)
    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, ProviderError>;

    /// chat completion (streaming); dropping the receiver cancels the request
    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<mpsc::Receiver<Result<String, ProviderError>>, ProviderError>;

    /// generate embeddings, one per input and in input order
    async fn embed(
        &self,
        inputs: &[String],
        task: EmbedTask,
        model_id: &str,
    ) -> Result<Vec<Vec<f32>>, ProviderError>;
}
