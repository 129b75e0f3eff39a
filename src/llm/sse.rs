//! Incremental reader for `text/event-stream` completion responses.

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;

use super::types::ProviderError;

const STREAM_BUFFER: usize = 32;

/// Splits a byte stream into `data:` payloads, tolerating lines and UTF-8
/// sequences that straddle network chunks.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes and returns every complete `data:` payload.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(data) = data_payload(&line) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flushes a trailing payload that arrived without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.pending);
        data_payload(&line)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    let data = text.strip_prefix("data:")?;
    Some(data.trim_start().to_string())
}

/// Outcome of decoding one event payload.
pub enum SseEvent {
    Fragment(String),
    Skip,
    Done,
    Failed(ProviderError),
}

/// Reads a streaming response on a background task, forwarding decoded
/// fragments. The task ends when the model finishes, on the first error, or as
/// soon as the receiver is dropped (which also releases the connection).
pub fn spawn_reader<F>(
    response: reqwest::Response,
    decode: F,
) -> mpsc::Receiver<Result<String, ProviderError>>
where
    F: Fn(&str) -> SseEvent + Send + 'static,
{
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let mut stream = response.bytes_stream();

    tokio::spawn(async move {
        let mut buffer = SseLineBuffer::new();
        loop {
            // A slow upstream must not keep the connection open after the
            // receiver is gone.
            let item = tokio::select! {
                _ = tx.closed() => return,
                item = stream.next() => item,
            };
            let Some(item) = item else {
                break;
            };
            let bytes = match item {
                Ok(bytes) => bytes,
                Err(e) => {
                    let _ = tx.send(Err(ProviderError::Http(e))).await;
                    return;
                }
            };

            for payload in buffer.push(&bytes) {
                if !forward(&tx, decode(&payload)).await {
                    return;
                }
            }
        }

        if let Some(payload) = buffer.finish() {
            forward(&tx, decode(&payload)).await;
        }
    });

    rx
}

// false once the stream should stop
async fn forward(
    tx: &mpsc::Sender<Result<String, ProviderError>>,
    event: SseEvent,
) -> bool {
    match event {
        SseEvent::Fragment(text) => {
            if text.is_empty() {
                return true;
            }
            tx.send(Ok(text)).await.is_ok()
        }
        SseEvent::Skip => true,
        SseEvent::Done => false,
        SseEvent::Failed(err) => {
            let _ = tx.send(Err(err)).await;
            false
        }
    }
}

/// Pulls an `error.message` out of a provider error payload, if present.
pub fn error_message(payload: &Value) -> Option<String> {
    let error = payload.get("error")?;
    Some(
        error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn payloads_split_across_chunks_are_reassembled() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.push(b"data: {\"a\":").is_empty());
        let out = buffer.push(b"1}\r\n\r\ndata: [DONE]\n");
        assert_eq!(out, vec!["{\"a\":1}".to_string(), "[DONE]".to_string()]);
    }

    #[test]
    fn comments_and_event_lines_are_ignored() {
        let mut buffer = SseLineBuffer::new();
        let out = buffer.push(b": keep-alive\nevent: message\ndata:x\n\n");
        assert_eq!(out, vec!["x".to_string()]);
    }

    #[test]
    fn multibyte_characters_survive_chunk_boundaries() {
        let line = "data: \u{00a7} 43A\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xc2).unwrap() + 1;

        let mut buffer = SseLineBuffer::new();
        assert!(buffer.push(&line[..split]).is_empty());
        assert_eq!(buffer.push(&line[split..]), vec!["\u{00a7} 43A".to_string()]);
    }

    #[test]
    fn trailing_payload_without_newline_is_flushed() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.push(b"data: tail").is_empty());
        assert_eq!(buffer.finish().as_deref(), Some("tail"));
        assert!(buffer.finish().is_none());
    }

    #[test]
    fn error_message_prefers_nested_message() {
        let payload = json!({ "error": { "code": 429, "message": "quota exceeded" } });
        assert_eq!(error_message(&payload).as_deref(), Some("quota exceeded"));
        assert!(error_message(&json!({ "ok": true })).is_none());
    }

    #[tokio::test]
    async fn dropping_the_receiver_releases_a_stalled_response() {
        let (body_tx, body_rx) = mpsc::channel::<Result<String, std::io::Error>>(4);
        let body = stream::unfold(body_rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        });
        let response = reqwest::Response::from(axum::http::Response::new(
            reqwest::Body::wrap_stream(body),
        ));

        let mut rx = spawn_reader(response, |data| SseEvent::Fragment(data.to_string()));
        body_tx
            .send(Ok("data: Section 43\n\n".to_string()))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap(), "Section 43");

        // The upstream stays open without sending anything else.
        drop(rx);
        tokio::time::timeout(Duration::from_secs(5), body_tx.closed())
            .await
            .expect("reader kept the response body alive");
    }
}
