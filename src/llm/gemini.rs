//! Google Gemini (Generative Language API) provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::LlmProvider;
use super::sse::{self, SseEvent};
use super::types::{ChatRequest, EmbedTask, ProviderError};

#[derive(Clone)]
pub struct GeminiProvider {
    base_url: String,
    client: Client,
}

impl GeminiProvider {
    pub fn new(base_url: String, api_key: &str, timeout: Duration) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::MissingApiKey(
                "gemini (set GOOGLE_API_KEY)".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key.trim())
            .map_err(|_| ProviderError::Decode("invalid Gemini API key".to_string()))?;
        headers.insert("x-goog-api-key", key);
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

    fn model_url(&self, model_id: &str, method: &str) -> String {
        format!("{}/{}:{}", self.base_url, model_path(model_id), method)
    }

    async fn post(&self, url: &str, body: &Value) -> Result<reqwest::Response, ProviderError> {
        let res = self.client.post(url).json(body).send().await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let text = res.text().await.unwrap_or_default();
            let body = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|payload| sse::error_message(&payload))
                .unwrap_or(text);
            return Err(ProviderError::Status {
                provider: "gemini".to_string(),
                status,
                body,
            });
        }

        Ok(res)
    }
}

/// Gemini addresses models as `models/<id>`; accept either spelling.
fn model_path(model_id: &str) -> String {
    if model_id.starts_with("models/") || model_id.starts_with("tunedModels/") {
        model_id.to_string()
    } else {
        format!("models/{}", model_id)
    }
}

fn task_type(task: EmbedTask) -> &'static str {
    match task {
        EmbedTask::Document => "RETRIEVAL_DOCUMENT",
        EmbedTask::Query => "RETRIEVAL_QUERY",
    }
}

fn generate_body(request: &ChatRequest) -> Value {
    let contents: Vec<Value> = request
        .messages
        .iter()
        .map(|message| {
            let role = if message.role == "assistant" { "model" } else { "user" };
            json!({ "role": role, "parts": [{ "text": message.content }] })
        })
        .collect();

    let mut generation_config = serde_json::Map::new();
    if let Some(t) = request.temperature {
        generation_config.insert("temperature".to_string(), json!(t));
    }
    if let Some(t) = request.max_tokens {
        generation_config.insert("maxOutputTokens".to_string(), json!(t));
    }

    json!({
        "contents": contents,
        "generationConfig": generation_config,
    })
}

/// Concatenates the text parts of the first candidate.
fn candidate_text(payload: &Value) -> Option<String> {
    let parts = payload["candidates"][0]["content"]["parts"].as_array()?;
    Some(
        parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect::<String>(),
    )
}

/// Finish reasons that mean the answer was withheld rather than completed.
const BLOCKING_FINISH_REASONS: [&str; 5] = [
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
];

fn blocked_reason(payload: &Value) -> Option<String> {
    if let Some(reason) = payload["promptFeedback"]["blockReason"].as_str() {
        return Some(format!("prompt blocked by Gemini: {}", reason));
    }
    payload["candidates"][0]["finishReason"]
        .as_str()
        .filter(|reason| BLOCKING_FINISH_REASONS.contains(reason))
        .map(|reason| format!("answer stopped by Gemini: {}", reason))
}

fn decode_stream_event(data: &str) -> SseEvent {
    let payload: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(_) => return SseEvent::Skip,
    };

    if let Some(message) = sse::error_message(&payload) {
        return SseEvent::Failed(ProviderError::Decode(message));
    }
    if let Some(reason) = blocked_reason(&payload) {
        return SseEvent::Failed(ProviderError::Decode(reason));
    }

    match candidate_text(&payload) {
        Some(text) => SseEvent::Fragment(text),
        None => SseEvent::Skip,
    }
}

fn parse_embeddings(payload: &Value, expected: usize) -> Result<Vec<Vec<f32>>, ProviderError> {
    let items = payload["embeddings"]
        .as_array()
        .ok_or_else(|| ProviderError::Decode("missing 'embeddings' in response".to_string()))?;

    let embeddings: Vec<Vec<f32>> = items
        .iter()
        .map(|item| {
            item["values"]
                .as_array()
                .map(|vals| {
                    vals.iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect();

    if embeddings.len() != expected {
        return Err(ProviderError::Decode(format!(
            "Gemini returned {} embeddings for {} inputs",
            embeddings.len(),
            expected
        )));
    }
    Ok(embeddings)
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, ProviderError> {
        let url = self.model_url(model_id, "generateContent");
        let res = self.post(&url, &generate_body(&request)).await?;
        let payload: Value = res.json().await?;

        if let Some(reason) = blocked_reason(&payload) {
            return Err(ProviderError::Decode(reason));
        }
        candidate_text(&payload)
            .ok_or_else(|| ProviderError::Decode("Gemini response had no candidates".to_string()))
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<mpsc::Receiver<Result<String, ProviderError>>, ProviderError> {
        let url = format!(
            "{}?alt=sse",
            self.model_url(model_id, "streamGenerateContent")
        );
        let res = self.post(&url, &generate_body(&request)).await?;
        Ok(sse::spawn_reader(res, decode_stream_event))
    }

    async fn embed(
        &self,
        inputs: &[String],
        task: EmbedTask,
        model_id: &str,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let model = model_path(model_id);
        let requests: Vec<Value> = inputs
            .iter()
            .map(|text| {
                json!({
                    "model": model,
                    "content": { "parts": [{ "text": text }] },
                    "taskType": task_type(task),
                })
            })
            .collect();

        let url = self.model_url(model_id, "batchEmbedContents");
        let res = self.post(&url, &json!({ "requests": requests })).await?;
        let payload: Value = res.json().await?;
        parse_embeddings(&payload, inputs.len())
    }
}
