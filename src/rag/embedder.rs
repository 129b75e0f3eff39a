use std::sync::Arc;

use crate::core::errors::RagError;
use crate::llm::{EmbedTask, LlmProvider};

/// Thin adapter that turns chunk texts into vectors through a provider.
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn LlmProvider>,
    model: String,
    batch_size: usize,
}

impl Embedder {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>, batch_size: usize) -> Self {
        Self {
            provider,
            model: model.into(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One vector per input, in input order. Batches are sent sequentially.
    pub async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for (batch_no, batch) in texts.chunks(self.batch_size).enumerate() {
            tracing::debug!(
                "Embedding batch {} ({} texts) with {}",
                batch_no + 1,
                batch.len(),
                self.model
            );
            let embedded = self
                .provider
                .embed(batch, EmbedTask::Document, &self.model)
                .await
                .map_err(|e| RagError::EmbeddingService(e.to_string()))?;

            if embedded.len() != batch.len() {
                return Err(RagError::EmbeddingService(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embedded.len()
                )));
            }
            vectors.extend(embedded);
        }

        Ok(vectors)
    }

    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RagError> {
        let mut embedded = self
            .provider
            .embed(&[query.to_string()], EmbedTask::Query, &self.model)
            .await
            .map_err(|e| RagError::EmbeddingService(e.to_string()))?;

        match embedded.pop() {
            Some(vector) if embedded.is_empty() && !vector.is_empty() => Ok(vector),
            _ => Err(RagError::EmbeddingService(
                "provider returned no embedding for the query".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::fake::{keyword_embedding, FakeProvider};

    #[tokio::test]
    async fn preserves_order_across_batches() {
        let provider = Arc::new(FakeProvider::new(""));
        let embedder = Embedder::new(provider.clone(), "fake-embed", 2);

        let texts: Vec<String> = [
            "penalty",
            "signature signature",
            "tribunal",
            "computer hacking",
            "weather",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let vectors = embedder.embed_documents(&texts).await.unwrap();
        assert_eq!(vectors.len(), texts.len());
        for (text, vector) in texts.iter().zip(&vectors) {
            assert_eq!(vector, &keyword_embedding(text));
        }
        assert_eq!(provider.embed_calls(), 3);
    }

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let provider = Arc::new(FakeProvider::new(""));
        let embedder = Embedder::new(provider.clone(), "fake-embed", 10);

        assert!(embedder.embed_documents(&[]).await.unwrap().is_empty());
        assert_eq!(provider.embed_calls(), 0);
    }

    #[tokio::test]
    async fn provider_failures_become_embedding_service_errors() {
        let provider = Arc::new(FakeProvider::new("").failing_embeddings());
        let embedder = Embedder::new(provider, "fake-embed", 10);

        let err = embedder.embed_query("penalty").await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingService(msg) if msg.contains("401")));
    }
}
