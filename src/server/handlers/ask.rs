use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::errors::{ApiError, RagError};
use crate::rag::{AnswerStream, InitStatus};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct QuestionParams {
    pub question: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SourcesParams {
    pub question: Option<String>,
    pub k: Option<usize>,
}

fn ensure_ready(state: &AppState) -> Result<(), ApiError> {
    let snapshot = state.pipeline.state();
    if snapshot.status != InitStatus::Ready {
        return Err(ApiError::ServiceUnavailable("System not ready".to_string()));
    }
    Ok(())
}

fn required_question(question: Option<&str>) -> Result<&str, ApiError> {
    match question.map(str::trim) {
        Some(question) if !question.is_empty() => Ok(question),
        _ => Err(ApiError::BadRequest(
            "Question parameter is missing".to_string(),
        )),
    }
}

pub async fn ask(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_ready(&state)?;
    let question = required_question(Some(payload.question.as_str()))?;

    let answer = state.pipeline.answer(question).await?;
    Ok(Json(json!({ "answer": answer })))
}

/// Streams the answer as server-sent events carrying JSON payloads:
/// `start`, then one `chunk` per fragment, then `end` or a single `error`.
pub async fn ask_stream(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QuestionParams>,
) -> Result<Response, ApiError> {
    ensure_ready(&state)?;
    let question = required_question(params.question.as_deref())?.to_string();

    tracing::debug!("Streaming answer for question ({} chars)", question.len());
    let answer = state.pipeline.answer_streaming(&question).await;

    Ok(Sse::new(answer_events(question, answer))
        .keep_alive(KeepAlive::default())
        .into_response())
}

enum StreamPhase {
    Start {
        question: String,
        answer: Result<AnswerStream, RagError>,
    },
    Streaming(AnswerStream),
    Failed(String),
    Done,
}

fn payload_event(payload: Value) -> Result<Event, Infallible> {
    Ok(Event::default().data(payload.to_string()))
}

fn error_event(message: &str) -> Result<Event, Infallible> {
    payload_event(json!({ "type": "error", "error": message }))
}

fn answer_events(
    question: String,
    answer: Result<AnswerStream, RagError>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(
        StreamPhase::Start { question, answer },
        |phase| async move {
            match phase {
                StreamPhase::Start { question, answer } => {
                    let next = match answer {
                        Ok(stream) => StreamPhase::Streaming(stream),
                        Err(err) => StreamPhase::Failed(err.to_string()),
                    };
                    let start = payload_event(json!({ "type": "start", "question": question }));
                    Some((start, next))
                }
                StreamPhase::Streaming(mut answer) => match answer.next().await {
                    Some(Ok(fragment)) => Some((
                        payload_event(json!({ "type": "chunk", "content": fragment })),
                        StreamPhase::Streaming(answer),
                    )),
                    Some(Err(err)) => {
                        tracing::warn!("Error during stream generation: {}", err);
                        Some((error_event(&err.to_string()), StreamPhase::Done))
                    }
                    None => Some((payload_event(json!({ "type": "end" })), StreamPhase::Done)),
                },
                StreamPhase::Failed(message) => {
                    tracing::warn!("Error during stream generation: {}", message);
                    Some((error_event(&message), StreamPhase::Done))
                }
                StreamPhase::Done => None,
            }
        },
    )
}

pub async fn sources(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SourcesParams>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_ready(&state)?;
    let question = required_question(params.question.as_deref())?;
    let k = params.k.unwrap_or(state.settings.retrieval.sources_k);

    let hits = state.pipeline.retrieve(question, k).await?;
    let sources: Vec<Value> = hits
        .into_iter()
        .map(|hit| {
            json!({
                "content": hit.chunk.text,
                "score": hit.score,
                "metadata": {
                    "source": hit.source,
                    "page": hit.chunk.page,
                    "chunk_index": hit.chunk.chunk_index,
                    "start_offset": hit.chunk.start_offset
                }
            })
        })
        .collect();

    Ok(Json(json!({ "question": question, "sources": sources })))
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn blank_questions_are_missing() {
        assert!(required_question(None).is_err());
        assert!(required_question(Some("  ")).is_err());
        assert_eq!(required_question(Some(" Section 43? ")).unwrap(), "Section 43?");
    }

    #[tokio::test]
    async fn failed_answers_still_emit_start_then_error() {
        let answer = Err(RagError::EmbeddingService("quota exceeded".to_string()));
        let events: Vec<_> = answer_events("q".to_string(), answer).collect().await;
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn successful_answers_end_with_an_end_event() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok("one ".to_string())).await.unwrap();
        tx.send(Ok("two".to_string())).await.unwrap();
        drop(tx);

        let events: Vec<_> = answer_events("q".to_string(), Ok(AnswerStream::new(rx)))
            .collect()
            .await;
        // start, two chunks, end
        assert_eq!(events.len(), 4);
    }
}
