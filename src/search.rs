//! Lexical, vector, and hybrid retrieval over the index.
//!
//! # Ranking
//!
//! | Mode | Source | `score` | Order |
//! |------|--------|---------|-------|
//! | lexical | FTS5 `MATCH` + `bm25()` | BM25 rank | ascending |
//! | vector | stored embeddings at `dim` | `1 - similarity` | ascending |
//! | hybrid | both, fused | RRF sum | descending |
//!
//! # Hybrid Fusion
//!
//! 1. Fetch `max(k, candidate_k_keyword)` lexical hits.
//! 2. Fetch `max(k, candidate_k_vector)` vector hits.
//! 3. Every hit accrues `1 / (rrf_k + rank + 1)` for each list it is in.
//! 4. `hybrid_score = α × norm_bm25 + (1 − α) × similarity` is reported
//!    alongside, with `norm_bm25 = 1 − rank / (len_lexical + 1)`.
//! 5. Sort by RRF score descending; ties keep first-seen order.
//! 6. Truncate to `k`.
//!
//! With no stored embeddings the vector list is empty and hybrid search
//! reduces to the lexical ranking.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::config::{Config, RetrievalConfig};
use crate::db;
use crate::embedding;
use crate::error::SearchError;
use crate::models::SearchResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Lexical,
    Vector,
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Lexical => "lexical",
            SearchMode::Vector => "vector",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lexical" | "keyword" => Ok(SearchMode::Lexical),
            "vector" | "semantic" | "embed" => Ok(SearchMode::Vector),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(SearchError::UnknownMode(other.to_string())),
        }
    }
}

/// Tuning for [`search_hybrid`].
#[derive(Debug, Clone, PartialEq)]
pub struct HybridParams {
    pub k: usize,
    pub dim: usize,
    /// Weight of the lexical signal in the reported `hybrid_score`.
    pub alpha: f64,
    /// RRF damping constant.
    pub rrf_k: f64,
}

impl HybridParams {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            k: config.k,
            dim: config.dim,
            alpha: config.hybrid_alpha,
            rrf_k: config.rrf_k,
        }
    }
}

impl Default for HybridParams {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

/// Full-text search ranked by BM25 (lower is better).
pub async fn search(config: &Config, query: &str, k: usize) -> Result<Vec<SearchResult>> {
    if query.trim().is_empty() || k == 0 {
        return Ok(Vec::new());
    }

    let pool = db::connect(config).await?;
    let result = fetch_lexical(&pool, query, k, config.retrieval.snippet_chars).await;
    pool.close().await;
    result
}

/// Embedding search ranked by `1 - cosine similarity` (lower is better).
pub async fn search_embed(
    config: &Config,
    query: &str,
    k: usize,
    dim: usize,
) -> Result<Vec<SearchResult>> {
    if query.trim().is_empty() || k == 0 {
        return Ok(Vec::new());
    }

    let pool = db::connect(config).await?;
    let result = fetch_vector(&pool, query, k, dim, config.retrieval.snippet_chars).await;
    pool.close().await;
    result
}

/// Lexical and vector search fused with reciprocal rank fusion.
pub async fn search_hybrid(
    config: &Config,
    query: &str,
    params: &HybridParams,
) -> Result<Vec<SearchResult>> {
    if query.trim().is_empty() || params.k == 0 {
        return Ok(Vec::new());
    }

    let retrieval = &config.retrieval;
    let keyword_limit = params.k.max(retrieval.candidate_k_keyword);
    let vector_limit = params.k.max(retrieval.candidate_k_vector);

    let pool = db::connect(config).await?;
    let lexical = fetch_lexical(&pool, query, keyword_limit, retrieval.snippet_chars).await;
    let vector = match &lexical {
        Ok(_) => {
            fetch_vector(&pool, query, vector_limit, params.dim, retrieval.snippet_chars).await
        }
        Err(_) => Ok(Vec::new()),
    };
    pool.close().await;

    Ok(fuse_rrf(
        &lexical?,
        &vector?,
        params.k,
        params.alpha,
        params.rrf_k,
    ))
}

async fn fetch_lexical(
    pool: &SqlitePool,
    query: &str,
    limit: usize,
    snippet_chars: usize,
) -> Result<Vec<SearchResult>> {
    let rows = sqlx::query(
        r#"
        SELECT c.id AS chunk_id, c.doc_id AS doc_id, d.path AS path,
               c.chunk_index AS chunk_index,
               substr(c.content, 1, ?) AS snippet,
               c.content AS content,
               bm25(chunks_fts) AS score
        FROM chunks_fts
        JOIN chunks c ON c.id = chunks_fts.rowid
        JOIN documents d ON d.id = c.doc_id
        WHERE chunks_fts MATCH ?
        ORDER BY score ASC, c.id ASC
        LIMIT ?
        "#,
    )
    .bind(snippet_chars as i64)
    .bind(query)
    .bind(limit as i64)
    .fetch_all(pool)
    .await
    .map_err(|e| query_error(query, e))?;

    let results = rows
        .iter()
        .map(|row| SearchResult {
            chunk_id: row.get("chunk_id"),
            doc_id: row.get("doc_id"),
            path: row.get("path"),
            chunk_index: row.get("chunk_index"),
            snippet: row.get("snippet"),
            content: row.get("content"),
            score: row.get("score"),
            similarity: None,
            hybrid_score: None,
        })
        .collect();

    Ok(results)
}

async fn fetch_vector(
    pool: &SqlitePool,
    query: &str,
    limit: usize,
    dim: usize,
    snippet_chars: usize,
) -> Result<Vec<SearchResult>> {
    let query_vec = embedding::embed(query, dim);

    // Fetch all vectors at this dim and score them in Rust
    let rows = sqlx::query(
        r#"
        SELECT e.chunk_id AS chunk_id, c.doc_id AS doc_id, d.path AS path,
               c.chunk_index AS chunk_index,
               substr(c.content, 1, ?) AS snippet,
               c.content AS content,
               e.vector AS vector
        FROM embeddings e
        JOIN chunks c ON c.id = e.chunk_id
        JOIN documents d ON d.id = c.doc_id
        WHERE e.dim = ?
        ORDER BY e.chunk_id ASC
        "#,
    )
    .bind(snippet_chars as i64)
    .bind(dim as i64)
    .fetch_all(pool)
    .await?;

    let mut results: Vec<SearchResult> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("vector");
            let similarity = embedding::dot(&query_vec, &embedding::blob_to_vec(&blob)) as f64;
            SearchResult {
                chunk_id: row.get("chunk_id"),
                doc_id: row.get("doc_id"),
                path: row.get("path"),
                chunk_index: row.get("chunk_index"),
                snippet: row.get("snippet"),
                content: row.get("content"),
                score: 1.0 - similarity,
                similarity: Some(similarity),
                hybrid_score: None,
            }
        })
        .collect();

    // Stable: equal distances stay in chunk id order
    results.sort_by(|a, b| {
        a.score
            .partial_cmp(&b.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(limit);

    Ok(results)
}

/// Map a failed `MATCH` into [`SearchError::InvalidQuery`] when the engine
/// rejected the query text itself. Busy, corrupt, or missing-table errors
/// pass through unchanged.
fn query_error(query: &str, err: sqlx::Error) -> anyhow::Error {
    match err {
        sqlx::Error::Database(db_err) if is_query_syntax_error(db_err.message()) => {
            SearchError::InvalidQuery {
                query: query.to_string(),
                message: db_err.message().to_string(),
            }
            .into()
        }
        other => other.into(),
    }
}

fn is_query_syntax_error(message: &str) -> bool {
    message.starts_with("fts5:")
        || message.contains("syntax error")
        || message.contains("unterminated string")
        || message.starts_with("no such column")
}

/// Fuse ranked lexical and vector lists with reciprocal rank fusion.
///
/// Both inputs must already be in rank order. The returned results carry
/// the RRF sum in `score`, the weighted `hybrid_score`, and the vector
/// `similarity` when the chunk was in the vector list.
pub fn fuse_rrf(
    lexical: &[SearchResult],
    vector: &[SearchResult],
    k: usize,
    alpha: f64,
    rrf_k: f64,
) -> Vec<SearchResult> {
    struct Fused {
        result: SearchResult,
        rrf: f64,
        norm_bm25: f64,
        similarity: Option<f64>,
    }

    let mut fused: Vec<Fused> = Vec::new();
    let mut slots: HashMap<i64, usize> = HashMap::new();
    let lexical_len = lexical.len() as f64;

    let lists = [(lexical, true), (vector, false)];
    for (list, is_lexical) in lists {
        for (rank, hit) in list.iter().enumerate() {
            let slot = *slots.entry(hit.chunk_id).or_insert_with(|| {
                fused.push(Fused {
                    result: hit.clone(),
                    rrf: 0.0,
                    norm_bm25: 0.0,
                    similarity: None,
                });
                fused.len() - 1
            });

            let entry = &mut fused[slot];
            entry.rrf += 1.0 / (rrf_k + rank as f64 + 1.0);
            if is_lexical {
                entry.norm_bm25 = 1.0 - rank as f64 / (lexical_len + 1.0);
            } else {
                entry.similarity = hit.similarity;
            }
        }
    }

    let mut results: Vec<SearchResult> = fused
        .into_iter()
        .map(|f| {
            let similarity = f.similarity.unwrap_or(0.0);
            SearchResult {
                score: f.rrf,
                similarity: f.similarity,
                hybrid_score: Some(alpha * f.norm_bm25 + (1.0 - alpha) * similarity),
                ..f.result
            }
        })
        .collect();

    // Stable sort keeps first-seen order among equal RRF scores
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(k);

    results
}
