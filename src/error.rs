//! Typed errors for the cases callers need to tell apart.
//!
//! Everything else travels as [`anyhow::Error`]; these variants can be
//! recovered with `err.downcast_ref::<SearchError>()`.

use thiserror::Error;

/// Errors raised while answering a query.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The full-text engine rejected the query syntax.
    #[error("invalid full-text query {query:?}: {message}")]
    InvalidQuery { query: String, message: String },

    #[error("unknown search mode: {0}. Use lexical, vector, or hybrid.")]
    UnknownMode(String),
}

/// Errors raised by invalid chunking options.
#[derive(Debug, Error, PartialEq)]
pub enum ChunkError {
    #[error("chunk_size must be > 0")]
    ZeroChunkSize,

    #[error("overlap ({overlap}) must be smaller than chunk_size ({chunk_size})")]
    OverlapTooLarge { overlap: usize, chunk_size: usize },

    #[error("semantic threshold must be in [0.0, 1.0], got {0}")]
    ThresholdOutOfRange(f64),

    #[error("unknown chunk strategy: {0}. Use fixed, paragraph, or semantic.")]
    UnknownStrategy(String),
}
