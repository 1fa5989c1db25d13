//! Bounded LRU memo of ranked result lists.
//!
//! Keys carry every parameter that affects ranking, including `k`, so the
//! same query asked with two different `k` values occupies two slots. A
//! hit is re-sliced to the requested `k` before it is returned.
//!
//! The cache is not synchronized. It is owned by a single
//! [`ContextEngine`](crate::engine::ContextEngine) and only reachable
//! through `&mut`, which keeps access single-threaded.

use lru::LruCache;
use std::num::NonZeroUsize;
use tracing::debug;

use crate::chunk::ChunkStrategy;
use crate::models::SearchResult;
use crate::search::SearchMode;

/// Default number of cached result lists.
pub const DEFAULT_CAPACITY: usize = 64;

/// Everything that determines a ranked list.
///
/// Floats are keyed by their bit pattern so the key can be hashed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub mode: SearchMode,
    pub db_path: String,
    pub k: usize,
    pub dim: Option<usize>,
    pub alpha_bits: Option<u64>,
    pub rrf_k_bits: Option<u64>,
    pub strategy: ChunkStrategy,
    pub query: String,
}

impl CacheKey {
    pub fn lexical(db_path: &str, strategy: ChunkStrategy, query: &str, k: usize) -> Self {
        Self {
            mode: SearchMode::Lexical,
            db_path: db_path.to_string(),
            k,
            dim: None,
            alpha_bits: None,
            rrf_k_bits: None,
            strategy,
            query: query.to_string(),
        }
    }

    pub fn vector(
        db_path: &str,
        strategy: ChunkStrategy,
        query: &str,
        k: usize,
        dim: usize,
    ) -> Self {
        Self {
            mode: SearchMode::Vector,
            dim: Some(dim),
            ..Self::lexical(db_path, strategy, query, k)
        }
    }

    pub fn hybrid(
        db_path: &str,
        strategy: ChunkStrategy,
        query: &str,
        k: usize,
        dim: usize,
        alpha: f64,
        rrf_k: f64,
    ) -> Self {
        Self {
            mode: SearchMode::Hybrid,
            dim: Some(dim),
            alpha_bits: Some(alpha.to_bits()),
            rrf_k_bits: Some(rrf_k.to_bits()),
            ..Self::lexical(db_path, strategy, query, k)
        }
    }
}

pub struct QueryCache {
    entries: LruCache<CacheKey, Vec<SearchResult>>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl QueryCache {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Look up `key`, marking it most recently used, and return at most
    /// `k` results.
    pub fn get(&mut self, key: &CacheKey, k: usize) -> Option<Vec<SearchResult>> {
        let hit = self.entries.get(key)?;
        debug!(mode = %key.mode, query = %key.query, "query cache hit");
        Some(hit.iter().take(k).cloned().collect())
    }

    /// Store a ranked list, evicting the least recently used entry when
    /// full.
    pub fn put(&mut self, key: CacheKey, results: Vec<SearchResult>) {
        self.entries.put(key, results);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }
}
