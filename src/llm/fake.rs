//! Deterministic in-process provider for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::provider::LlmProvider;
use super::types::{ChatRequest, EmbedTask, ProviderError};

/// Word stems that get their own embedding dimension. Anything else only
/// contributes to the trailing bias dimension.
const VOCABULARY: [&str; 12] = [
    "penalt",
    "contraven",
    "liable",
    "signature",
    "certif",
    "record",
    "adjudicat",
    "tribunal",
    "hacking",
    "computer",
    "cricket",
    "weather",
];

pub fn keyword_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; VOCABULARY.len() + 1];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        match VOCABULARY.iter().position(|stem| word.starts_with(stem)) {
            Some(idx) => vector[idx] += 1.0,
            None => vector[VOCABULARY.len()] += 0.01,
        }
    }
    vector
}

pub struct FakeProvider {
    answer: String,
    pub embed_calls: AtomicUsize,
    pub embedded_inputs: AtomicUsize,
    pub chat_calls: AtomicUsize,
    pub last_prompt: Mutex<Option<String>>,
    fail_embeddings: AtomicBool,
    fail_generation: AtomicBool,
    fragment_delay: Option<Duration>,
    open_streams: Arc<AtomicUsize>,
    fragments_sent: Arc<AtomicUsize>,
}

impl FakeProvider {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            embed_calls: AtomicUsize::new(0),
            embedded_inputs: AtomicUsize::new(0),
            chat_calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
            fail_embeddings: AtomicBool::new(false),
            fail_generation: AtomicBool::new(false),
            fragment_delay: None,
            open_streams: Arc::new(AtomicUsize::new(0)),
            fragments_sent: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Pauses between streamed fragments, like a slow model.
    pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = Some(delay);
        self
    }

    pub fn failing_embeddings(self) -> Self {
        self.fail_embeddings.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_generation(self) -> Self {
        self.fail_generation.store(true, Ordering::SeqCst);
        self
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    /// Streaming tasks that have not exited yet.
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    pub fn fragments_sent(&self) -> usize {
        self.fragments_sent.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }

    fn record_prompt(&self, request: &ChatRequest) {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        let prompt = request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        *self.last_prompt.lock().unwrap() = Some(prompt);
    }

    fn generation_error(&self) -> Option<ProviderError> {
        self.fail_generation
            .load(Ordering::SeqCst)
            .then(|| ProviderError::Decode("generation quota exhausted".to_string()))
    }
}

#[async_trait]
impl LlmProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn chat(&self, request: ChatRequest, _model_id: &str) -> Result<String, ProviderError> {
        self.record_prompt(&request);
        if let Some(err) = self.generation_error() {
            return Err(err);
        }
        Ok(self.answer.clone())
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        _model_id: &str,
    ) -> Result<mpsc::Receiver<Result<String, ProviderError>>, ProviderError> {
        self.record_prompt(&request);
        if let Some(err) = self.generation_error() {
            return Err(err);
        }

        let fragments: Vec<String> = self
            .answer
            .split_inclusive(' ')
            .map(str::to_string)
            .collect();
        let delay = self.fragment_delay;
        let open_streams = self.open_streams.clone();
        let fragments_sent = self.fragments_sent.clone();
        open_streams.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            for (position, fragment) in fragments.into_iter().enumerate() {
                if let Some(delay) = delay.filter(|_| position > 0) {
                    tokio::select! {
                        _ = tx.closed() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                if tx.send(Ok(fragment)).await.is_err() {
                    break;
                }
                fragments_sent.fetch_add(1, Ordering::SeqCst);
            }
            open_streams.fetch_sub(1, Ordering::SeqCst);
        });
        Ok(rx)
    }

    async fn embed(
        &self,
        inputs: &[String],
        _task: EmbedTask,
        _model_id: &str,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        self.embedded_inputs.fetch_add(inputs.len(), Ordering::SeqCst);
        if self.fail_embeddings.load(Ordering::SeqCst) {
            return Err(ProviderError::Status {
                provider: "fake".to_string(),
                status: 401,
                body: "API key not valid".to_string(),
            });
        }
        Ok(inputs.iter().map(|text| keyword_embedding(text)).collect())
    }
}
