//! SQLite persistence for the vector index.
//!
//! One file holds every entry (chunk text, metadata, little-endian f32
//! embedding blob) plus a small key/value manifest. Builds write a sibling
//! temp file and rename it over the target, so readers never see a
//! half-written index.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::chunker::TextChunk;
use super::index::{IndexEntry, IndexManifest};
use crate::core::errors::RagError;

const MANIFEST_KEYS: [&str; 6] = [
    "embedding_model",
    "dimension",
    "entry_count",
    "document_path",
    "document_sha256",
    "built_at",
];

pub async fn write_index(
    location: &Path,
    entries: &[IndexEntry],
    manifest: &IndexManifest,
) -> Result<(), RagError> {
    if let Some(parent) = location.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| RagError::IndexBuild(format!("{}: {}", parent.display(), e)))?;
    }

    let tmp_path = temp_path_for(location);
    let result = write_to(&tmp_path, entries, manifest).await;
    if let Err(err) = result {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(err);
    }

    tokio::fs::rename(&tmp_path, location)
        .await
        .map_err(|e| RagError::IndexBuild(format!("{}: {}", location.display(), e)))?;
    Ok(())
}

pub async fn read_index(location: &Path) -> Result<(IndexManifest, Vec<IndexEntry>), RagError> {
    if !location.is_file() {
        return Err(RagError::IndexNotFound(location.display().to_string()));
    }

    let options = SqliteConnectOptions::new()
        .filename(location)
        .create_if_missing(false)
        .read_only(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(RagError::storage)?;

    let result = read_from(&pool).await;
    pool.close().await;
    result
}

fn temp_path_for(location: &Path) -> PathBuf {
    let file_name = location
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "index.db".to_string());
    location.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()))
}

async fn write_to(
    path: &Path,
    entries: &[IndexEntry],
    manifest: &IndexManifest,
) -> Result<(), RagError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete)
        .synchronous(SqliteSynchronous::Full);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(build_error)?;

    let result = write_entries(&pool, entries, manifest).await;
    pool.close().await;
    result
}

async fn write_entries(
    pool: &SqlitePool,
    entries: &[IndexEntry],
    manifest: &IndexManifest,
) -> Result<(), RagError> {
    sqlx::query(
        "CREATE TABLE index_entries (
            position INTEGER PRIMARY KEY,
            chunk_index INTEGER NOT NULL,
            content TEXT NOT NULL,
            source TEXT NOT NULL DEFAULT '',
            metadata TEXT NOT NULL DEFAULT '{}',
            embedding BLOB NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(build_error)?;

    sqlx::query(
        "CREATE TABLE index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(build_error)?;

    let mut tx = pool.begin().await.map_err(build_error)?;

    for (position, entry) in entries.iter().enumerate() {
        let metadata = json!({
            "page": entry.chunk.page,
            "start_offset": entry.chunk.start_offset,
            "overlap": entry.chunk.overlap,
        });

        sqlx::query(
            "INSERT INTO index_entries (position, chunk_index, content, source, metadata, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(position as i64)
        .bind(entry.chunk.chunk_index as i64)
        .bind(&entry.chunk.text)
        .bind(&entry.source)
        .bind(metadata.to_string())
        .bind(serialize_embedding(&entry.embedding))
        .execute(&mut *tx)
        .await
        .map_err(build_error)?;
    }

    for (key, value) in manifest_pairs(manifest) {
        sqlx::query("INSERT INTO index_meta (key, value) VALUES (?1, ?2)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(build_error)?;
    }

    tx.commit().await.map_err(build_error)?;
    Ok(())
}

async fn read_from(pool: &SqlitePool) -> Result<(IndexManifest, Vec<IndexEntry>), RagError> {
    let meta_rows = sqlx::query("SELECT key, value FROM index_meta")
        .fetch_all(pool)
        .await
        .map_err(RagError::storage)?;
    let meta = meta_rows
        .iter()
        .map(|row| -> Result<(String, String), sqlx::Error> {
            Ok((row.try_get("key")?, row.try_get("value")?))
        })
        .collect::<Result<HashMap<_, _>, _>>()
        .map_err(RagError::storage)?;

    let rows = sqlx::query(
        "SELECT chunk_index, content, source, metadata, embedding
         FROM index_entries
         ORDER BY position",
    )
    .fetch_all(pool)
    .await
    .map_err(RagError::storage)?;

    let entries = rows
        .iter()
        .map(row_to_entry)
        .collect::<Result<Vec<_>, _>>()
        .map_err(RagError::storage)?;
    Ok((manifest_from_pairs(&meta), entries))
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<IndexEntry, sqlx::Error> {
    let metadata_str: String = row.try_get("metadata")?;
    let metadata = serde_json::from_str::<Value>(&metadata_str).unwrap_or(Value::Null);
    let field = |key: &str| metadata.get(key).and_then(Value::as_u64).unwrap_or(0) as usize;

    let chunk_index: i64 = row.try_get("chunk_index")?;
    let embedding_bytes: Vec<u8> = row.try_get("embedding")?;

    Ok(IndexEntry {
        embedding: deserialize_embedding(&embedding_bytes),
        chunk: TextChunk {
            text: row.try_get("content")?,
            chunk_index: chunk_index as usize,
            start_offset: field("start_offset"),
            overlap: field("overlap"),
            page: field("page").max(1),
        },
        source: row.try_get("source")?,
    })
}

fn manifest_pairs(manifest: &IndexManifest) -> Vec<(&'static str, String)> {
    let values = [
        manifest.embedding_model.clone(),
        manifest.dimension.to_string(),
        manifest.entry_count.to_string(),
        manifest.document_path.clone(),
        manifest.document_sha256.clone().unwrap_or_default(),
        manifest.built_at.clone(),
    ];
    MANIFEST_KEYS.into_iter().zip(values).collect()
}

fn manifest_from_pairs(meta: &HashMap<String, String>) -> IndexManifest {
    let text = |key: &str| meta.get(key).cloned().unwrap_or_default();
    let number = |key: &str| meta.get(key).and_then(|v| v.parse().ok()).unwrap_or(0);

    IndexManifest {
        embedding_model: text("embedding_model"),
        dimension: number("dimension"),
        entry_count: number("entry_count"),
        document_path: text("document_path"),
        document_sha256: meta
            .get("document_sha256")
            .filter(|hash| !hash.is_empty())
            .cloned(),
        built_at: text("built_at"),
    }
}

fn build_error(err: sqlx::Error) -> RagError {
    RagError::IndexBuild(err.to_string())
}

fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
