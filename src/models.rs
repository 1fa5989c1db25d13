//! Core data models shared by the index, retriever, and packer.

use serde::Serialize;

/// An ingested file, keyed by its path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: i64,
    pub path: String,
    /// Modification time in nanoseconds since the Unix epoch.
    pub mtime: i64,
    pub size_bytes: i64,
    /// Unix seconds of the last (re)ingestion.
    pub ingested_at: i64,
}

/// A slice of a document's text, the unit of indexing and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub id: i64,
    pub doc_id: i64,
    pub chunk_index: i64,
    pub content: String,
}

/// One ranked hit from lexical, vector, or hybrid search.
///
/// `score` is mode-dependent: BM25 rank (lower is better) for lexical,
/// `1 - similarity` (lower is better) for vector, and the accumulated
/// reciprocal-rank-fusion score (higher is better) for hybrid.
///
/// `snippet` is a display preview capped at `retrieval.snippet_chars`;
/// `content` is the whole chunk, which is what packing emits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub chunk_id: i64,
    pub doc_id: i64,
    pub path: String,
    pub chunk_index: i64,
    pub snippet: String,
    #[serde(skip)]
    pub content: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hybrid_score: Option<f64>,
}

/// Outcome of an ingest run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    /// Documents (re)written in this run.
    pub docs: usize,
    /// Chunks written in this run.
    pub chunks: usize,
    /// Files whose `(mtime, size)` matched the index.
    pub skipped: usize,
    /// Files that could not be read or decoded.
    pub unreadable: usize,
    pub seconds: f64,
}

/// Outcome of a prune run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub removed_docs: usize,
    pub removed_chunks: usize,
}
