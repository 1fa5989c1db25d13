//! Document lookup by path.
//!
//! Returns a stored document together with its chunks in order, which is
//! what a caller needs to show the full text behind a search hit.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::Row;
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::models::{Chunk, Document};

#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    pub document: Document,
    pub chunks: Vec<Chunk>,
}

impl DocumentResponse {
    /// Chunk contents joined back together. Overlapping chunks repeat
    /// their shared text.
    pub fn text(&self) -> String {
        self.chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Fetch a document and its chunks. `path` may be relative; it is resolved
/// the same way ingest resolves paths before lookup.
pub async fn get_document(config: &Config, path: &Path) -> Result<DocumentResponse> {
    let key = std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .to_string();

    let pool = db::connect(config).await?;

    let doc_row = sqlx::query(
        "SELECT id, path, mtime, size_bytes, ingested_at FROM documents WHERE path = ?",
    )
    .bind(&key)
    .fetch_optional(&pool)
    .await?;

    let doc_row = match doc_row {
        Some(row) => row,
        None => {
            pool.close().await;
            bail!("document not found: {}", key);
        }
    };

    let document = Document {
        id: doc_row.get("id"),
        path: doc_row.get("path"),
        mtime: doc_row.get("mtime"),
        size_bytes: doc_row.get("size_bytes"),
        ingested_at: doc_row.get("ingested_at"),
    };

    let chunk_rows = sqlx::query(
        "SELECT id, doc_id, chunk_index, content FROM chunks WHERE doc_id = ? ORDER BY chunk_index ASC",
    )
    .bind(document.id)
    .fetch_all(&pool)
    .await?;

    let chunks = chunk_rows
        .iter()
        .map(|row| Chunk {
            id: row.get("id"),
            doc_id: row.get("doc_id"),
            chunk_index: row.get("chunk_index"),
            content: row.get("content"),
        })
        .collect();

    pool.close().await;

    Ok(DocumentResponse { document, chunks })
}
