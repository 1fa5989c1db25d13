//! Embedding backfill for chunks ingested without vectors.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::ingest::store_embedding;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmbedReport {
    /// Chunks that had no vector at the requested dim.
    pub pending: usize,
    pub embedded: usize,
}

/// Embed every chunk that has no stored vector at `dim`.
///
/// Chunks that already have a vector at `dim` are left alone, so running
/// this twice does no work the second time.
pub async fn embed_pending(config: &Config, dim: usize) -> Result<EmbedReport> {
    let pool = db::connect(config).await?;
    let result = embed_missing(&pool, dim).await;
    pool.close().await;

    let report = result?;
    info!(
        dim,
        pending = report.pending,
        embedded = report.embedded,
        "embed pending complete"
    );
    Ok(report)
}

pub(crate) async fn embed_missing(pool: &SqlitePool, dim: usize) -> Result<EmbedReport> {
    embed_missing_in(pool, dim, None).await
}

/// Embed chunks with no vector at `dim`, limited to the document at `path`
/// when one is given.
pub(crate) async fn embed_missing_in(
    pool: &SqlitePool,
    dim: usize,
    path: Option<&str>,
) -> Result<EmbedReport> {
    let rows = sqlx::query(
        r#"
        SELECT c.id AS id, c.content AS content
        FROM chunks c
        JOIN documents d ON d.id = c.doc_id
        LEFT JOIN embeddings e ON e.chunk_id = c.id AND e.dim = ?
        WHERE e.chunk_id IS NULL AND (? IS NULL OR d.path = ?)
        ORDER BY c.id ASC
        "#,
    )
    .bind(dim as i64)
    .bind(path)
    .bind(path)
    .fetch_all(pool)
    .await?;

    let mut report = EmbedReport {
        pending: rows.len(),
        embedded: 0,
    };
    if rows.is_empty() {
        return Ok(report);
    }

    let mut tx = pool.begin().await?;
    for row in &rows {
        let chunk_id: i64 = row.get("id");
        let content: String = row.get("content");
        store_embedding(&mut *tx, chunk_id, dim, &content).await?;
        report.embedded += 1;
    }
    tx.commit().await?;

    Ok(report)
}

/// `(dim, document path)` for every document with at least one stored
/// vector at that dim.
pub(crate) async fn embedded_documents(pool: &SqlitePool) -> Result<Vec<(usize, String)>> {
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT e.dim AS dim, d.path AS path
        FROM embeddings e
        JOIN chunks c ON c.id = e.chunk_id
        JOIN documents d ON d.id = c.doc_id
        ORDER BY e.dim ASC, d.path ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get::<i64, _>("dim") as usize, row.get("path")))
        .collect())
}
