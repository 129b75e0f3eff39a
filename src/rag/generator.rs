use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;

use crate::core::config::GenerationSettings;
use crate::core::errors::RagError;
use crate::llm::{ChatRequest, LlmProvider, ProviderError};

/// Answer fragments in emission order.
///
/// The stream ends when the model signals completion. Dropping it closes the
/// channel, which stops the reader task and releases the connection.
pub struct AnswerStream {
    rx: mpsc::Receiver<Result<String, ProviderError>>,
}

impl AnswerStream {
    pub(crate) fn new(rx: mpsc::Receiver<Result<String, ProviderError>>) -> Self {
        Self { rx }
    }

    /// Next fragment, or `None` once the answer is complete.
    pub async fn next(&mut self) -> Option<Result<String, RagError>> {
        self.rx.recv().await.map(map_fragment)
    }

    /// Drains the stream into one string.
    pub async fn collect_text(mut self) -> Result<String, RagError> {
        let mut answer = String::new();
        while let Some(fragment) = self.next().await {
            answer.push_str(&fragment?);
        }
        Ok(answer)
    }
}

impl Stream for AnswerStream {
    type Item = Result<String, RagError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|item| item.map(map_fragment))
    }
}

fn map_fragment(fragment: Result<String, ProviderError>) -> Result<String, RagError> {
    fragment.map_err(|e| RagError::GenerationService(e.to_string()))
}

/// Sends composed prompts to the generation model.
#[derive(Clone)]
pub struct Generator {
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: f64,
    max_output_tokens: Option<u32>,
}

impl Generator {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: &GenerationSettings) -> Self {
        Self {
            provider,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
        }
    }

    fn request(&self, prompt: &str) -> ChatRequest {
        ChatRequest::from_prompt(prompt)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_output_tokens)
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        self.provider
            .chat(self.request(prompt), &self.model)
            .await
            .map_err(|e| RagError::GenerationService(e.to_string()))
    }

    /// Starts a new model call; every invocation is independent.
    pub async fn generate_streaming(&self, prompt: &str) -> Result<AnswerStream, RagError> {
        let rx = self
            .provider
            .stream_chat(self.request(prompt), &self.model)
            .await
            .map_err(|e| RagError::GenerationService(e.to_string()))?;
        Ok(AnswerStream::new(rx))
    }
}
