use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::LlmProvider;
use super::sse::{self, SseEvent};
use super::types::{ChatRequest, EmbedTask, ProviderError};

/// Any server speaking the OpenAI chat-completions and embeddings API
/// (OpenAI itself, LM Studio, Ollama's `/v1`, vLLM).
#[derive(Clone)]
pub struct OpenAiCompatProvider {
    base_url: String,
    client: Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        base_url: String,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.map(str::trim).filter(|key| !key.is_empty()) {
            let auth = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|_| ProviderError::Decode("invalid OpenAI API key".to_string()))?;
            headers.insert(AUTHORIZATION, auth);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/{}", self.base_url, path);
        let res = self.client.post(&url).json(body).send().await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let text = res.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: "openai_compatible".to_string(),
                status,
                body: text,
            });
        }

        Ok(res)
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

fn chat_body(request: &ChatRequest, model_id: &str, stream: bool) -> Value {
    let mut body = json!({
        "model": model_id,
        "messages": request.messages,
        "stream": stream,
    });

    if let Some(obj) = body.as_object_mut() {
        if let Some(temperature) = request.temperature {
            obj.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            obj.insert("max_tokens".to_string(), json!(max_tokens));
        }
    }
    body
}

fn decode_stream_event(data: &str) -> SseEvent {
    if data == "[DONE]" {
        return SseEvent::Done;
    }
    let Ok(payload) = serde_json::from_str::<Value>(data) else {
        return SseEvent::Skip;
    };
    if let Some(message) = sse::error_message(&payload) {
        return SseEvent::Failed(ProviderError::Decode(message));
    }
    match payload["choices"][0]["delta"]["content"].as_str() {
        Some(content) => SseEvent::Fragment(content.to_string()),
        None => SseEvent::Skip,
    }
}

fn order_embeddings(
    mut response: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    response.data.sort_by_key(|entry| entry.index);
    if response.data.len() != expected {
        return Err(ProviderError::Decode(format!(
            "provider returned {} embeddings for {} inputs",
            response.data.len(),
            expected
        )));
    }
    Ok(response.data.into_iter().map(|entry| entry.embedding).collect())
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai_compatible"
    }

    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, ProviderError> {
        let res = self
            .post("chat/completions", &chat_body(&request, model_id, false))
            .await?;
        let payload: Value = res.json().await?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Decode("response had no choices".to_string()))
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<mpsc::Receiver<Result<String, ProviderError>>, ProviderError> {
        let res = self
            .post("chat/completions", &chat_body(&request, model_id, true))
            .await?;
        Ok(sse::spawn_reader(res, decode_stream_event))
    }

    async fn embed(
        &self,
        inputs: &[String],
        _task: EmbedTask,
        model_id: &str,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": model_id,
            "input": inputs,
        });
        let res = self.post("embeddings", &body).await?;
        let parsed: EmbeddingResponse = res.json().await?;
        order_embeddings(parsed, inputs.len())
    }
}
