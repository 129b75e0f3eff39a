pub const DEFAULT_DOCUMENT_PATH: &str = "data/it_act_2000_updated.pdf";
pub const DEFAULT_DOCUMENT_TITLE: &str = "India's Information Technology Act, 2000";
pub const DEFAULT_INDEX_PATH: &str = "db/rag_index.db";

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_SOURCES_K: usize = 3;

pub const DEFAULT_EMBEDDING_MODEL: &str = "models/embedding-001";
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-1.5-flash-latest";
pub const DEFAULT_TEMPERATURE: f64 = 0.3;
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 100;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;

pub fn default_local_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:3000".to_string(),
        "http://localhost:5000".to_string(),
        "http://localhost:5173".to_string(),
        "http://127.0.0.1".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://127.0.0.1:5000".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}
