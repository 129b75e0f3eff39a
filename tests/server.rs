use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use legal_rag::core::config::{AppPaths, ChunkingSettings, RagSettings};
use legal_rag::llm::{ChatRequest, EmbedTask, LlmProvider, ProviderError};
use legal_rag::rag::RagPipeline;
use legal_rag::server;
use legal_rag::state::AppState;

const ANSWER: &str = "Section 45 provides a residuary penalty.";

struct StubProvider;

fn embed_text(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    vec![
        lower.matches("penalt").count() as f32,
        lower.matches("contraven").count() as f32,
        lower.matches("signature").count() as f32,
        0.01,
    ]
}

#[async_trait]
impl LlmProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn chat(&self, _request: ChatRequest, _model_id: &str) -> Result<String, ProviderError> {
        Ok(ANSWER.to_string())
    }

    async fn stream_chat(
        &self,
        _request: ChatRequest,
        _model_id: &str,
    ) -> Result<mpsc::Receiver<Result<String, ProviderError>>, ProviderError> {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            for fragment in ANSWER.split_inclusive(' ') {
                if tx.send(Ok(fragment.to_string())).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }

    async fn embed(
        &self,
        inputs: &[String],
        _task: EmbedTask,
        _model_id: &str,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(inputs.iter().map(|text| embed_text(text)).collect())
    }
}

fn settings(dir: &Path) -> RagSettings {
    std::fs::write(
        dir.join("act.txt"),
        "3. Authentication of electronic records by affixing a digital signature.\n\n\
         45. Residuary penalty. Any person who contravenes any provision of this Act \
         shall be liable to a penalty.\n\n\
         66. Hacking with computer system.",
    )
    .unwrap();

    let mut settings = RagSettings::default();
    settings.document.path = dir.join("act.txt");
    settings.index.path = dir.join("db").join("index.db");
    settings.chunking = ChunkingSettings {
        chunk_size: 200,
        chunk_overlap: 20,
    };
    settings
}

async fn spawn_server(state: Arc<AppState>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server::router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn sse_payloads(body: &str) -> Vec<Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}

#[tokio::test]
async fn serves_questions_once_the_pipeline_is_ready() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = Arc::new(AppPaths::with_dirs(
        tmp.path().to_path_buf(),
        tmp.path().to_path_buf(),
    ));
    let pipeline = Arc::new(RagPipeline::with_connector(
        settings(tmp.path()),
        |_| Ok(Arc::new(StubProvider) as Arc<dyn LlmProvider>),
    ));
    let state = AppState::from_parts(paths, pipeline.clone());
    let base = spawn_server(state).await;
    let client = reqwest::Client::new();

    // Before initialization only status routes work.
    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["rag_status"], "uninitialized");

    let not_ready = client
        .get(format!("{}/ask_stream", base))
        .query(&[("question", "What is the penalty?")])
        .send()
        .await
        .unwrap();
    assert_eq!(not_ready.status(), 503);
    let body: Value = not_ready.json().await.unwrap();
    assert_eq!(body["error"], "System not ready");

    pipeline.initialize().await.unwrap();

    let status: Value = client
        .get(format!("{}/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "ready");
    assert!(status["index"]["entry_count"].as_u64().unwrap() >= 1);

    let missing = client
        .get(format!("{}/ask_stream", base))
        .query(&[("question", "   ")])
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 400);

    let answer: Value = client
        .post(format!("{}/ask", base))
        .json(&json!({ "question": "What is the penalty for contravention?" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(answer["answer"], ANSWER);

    let stream = client
        .get(format!("{}/ask_stream", base))
        .query(&[("question", "What is the penalty for contravention?")])
        .send()
        .await
        .unwrap();
    assert_eq!(stream.status(), 200);
    assert!(stream
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let events = sse_payloads(&stream.text().await.unwrap());
    assert_eq!(events.first().unwrap()["type"], "start");
    assert_eq!(
        events.first().unwrap()["question"],
        "What is the penalty for contravention?"
    );
    assert_eq!(events.last().unwrap()["type"], "end");
    let streamed: String = events
        .iter()
        .filter(|event| event["type"] == "chunk")
        .map(|event| event["content"].as_str().unwrap())
        .collect();
    assert_eq!(streamed, ANSWER);

    let sources: Value = client
        .get(format!("{}/sources", base))
        .query(&[("question", "penalty for contravention"), ("k", "1")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let sources = sources["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 1);
    assert!(sources[0]["content"]
        .as_str()
        .unwrap()
        .contains("Any person who contravenes"));
    assert_eq!(sources[0]["metadata"]["source"], "act.txt");
}
