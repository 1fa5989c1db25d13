//! Index statistics.
//!
//! [`stats`] gathers counts, sizes, and embedding coverage in one pass;
//! the returned [`StoreStats`] renders a readable summary via `Display`.

use anyhow::Result;
use serde::Serialize;
use sqlx::Row;
use std::fmt;

use crate::config::Config;
use crate::db;

/// Size and chunk count of one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocSize {
    pub path: String,
    pub size_bytes: i64,
    pub chunks: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    pub db_path: String,
    pub doc_count: i64,
    pub chunk_count: i64,
    pub total_bytes: i64,
    pub avg_bytes: f64,
    /// Largest documents by size, biggest first.
    pub largest: Vec<DocSize>,
    /// `(dim, vector count)` pairs in ascending dim order.
    pub embeddings_by_dim: Vec<(usize, i64)>,
    pub db_size_bytes: u64,
    pub last_ingested_at: Option<i64>,
}

pub async fn stats(config: &Config, top_n: usize) -> Result<StoreStats> {
    let pool = db::connect(config).await?;

    let totals = sqlx::query(
        r#"
        SELECT COUNT(*) AS doc_count,
               COALESCE(SUM(size_bytes), 0) AS total_bytes,
               MAX(ingested_at) AS last_ingested_at
        FROM documents
        "#,
    )
    .fetch_one(&pool)
    .await?;

    let doc_count: i64 = totals.get("doc_count");
    let total_bytes: i64 = totals.get("total_bytes");
    let last_ingested_at: Option<i64> = totals.get("last_ingested_at");

    let chunk_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await?;

    let largest_rows = sqlx::query(
        r#"
        SELECT d.path AS path, d.size_bytes AS size_bytes, COUNT(c.id) AS chunks
        FROM documents d
        LEFT JOIN chunks c ON c.doc_id = d.id
        GROUP BY d.id
        ORDER BY d.size_bytes DESC, d.path ASC
        LIMIT ?
        "#,
    )
    .bind(top_n as i64)
    .fetch_all(&pool)
    .await?;

    let largest = largest_rows
        .iter()
        .map(|row| DocSize {
            path: row.get("path"),
            size_bytes: row.get("size_bytes"),
            chunks: row.get("chunks"),
        })
        .collect();

    let dim_rows = sqlx::query(
        "SELECT dim, COUNT(*) AS n FROM embeddings GROUP BY dim ORDER BY dim ASC",
    )
    .fetch_all(&pool)
    .await?;

    let embeddings_by_dim = dim_rows
        .iter()
        .map(|row| (row.get::<i64, _>("dim") as usize, row.get::<i64, _>("n")))
        .collect();

    pool.close().await;

    let db_size_bytes = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    let avg_bytes = if doc_count > 0 {
        total_bytes as f64 / doc_count as f64
    } else {
        0.0
    };

    Ok(StoreStats {
        db_path: config.db.path.display().to_string(),
        doc_count,
        chunk_count,
        total_bytes,
        avg_bytes,
        largest,
        embeddings_by_dim,
        db_size_bytes,
        last_ingested_at,
    })
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Index Stats")?;
        writeln!(f, "===========")?;
        writeln!(f)?;
        writeln!(f, "  Database:    {}", self.db_path)?;
        writeln!(f, "  Size:        {}", format_bytes(self.db_size_bytes))?;
        writeln!(f)?;
        writeln!(f, "  Documents:   {}", self.doc_count)?;
        writeln!(f, "  Chunks:      {}", self.chunk_count)?;
        writeln!(
            f,
            "  Text:        {} (avg {})",
            format_bytes(self.total_bytes.max(0) as u64),
            format_bytes(self.avg_bytes as u64)
        )?;
        let last = match self.last_ingested_at {
            Some(ts) => format_ts_iso(ts),
            None => "never".to_string(),
        };
        writeln!(f, "  Last ingest: {}", last)?;

        if !self.embeddings_by_dim.is_empty() {
            writeln!(f)?;
            writeln!(f, "  Embeddings:")?;
            for (dim, count) in &self.embeddings_by_dim {
                writeln!(
                    f,
                    "    dim {:<6} {} / {} ({}%)",
                    dim,
                    count,
                    self.chunk_count,
                    if self.chunk_count > 0 {
                        (count * 100) / self.chunk_count
                    } else {
                        0
                    }
                )?;
            }
        }

        if !self.largest.is_empty() {
            writeln!(f)?;
            writeln!(f, "  Largest documents:")?;
            writeln!(f, "  {:>10} {:>7}   PATH", "SIZE", "CHUNKS")?;
            writeln!(f, "  {}", "-".repeat(60))?;
            for doc in &self.largest {
                writeln!(
                    f,
                    "  {:>10} {:>7}   {}",
                    format_bytes(doc.size_bytes.max(0) as u64),
                    doc.chunks,
                    doc.path
                )?;
            }
        }

        Ok(())
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}
