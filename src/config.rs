//! TOML configuration.
//!
//! Every section and field has a default, so an empty file (or
//! [`Config::default`]) yields a working setup that stores its index in the
//! user's data directory.
//!
//! ```toml
//! [db]
//! path = "/home/me/.local/share/context-pack/index.sqlite"
//!
//! [chunking]
//! chunk_size = 1000
//! overlap = 200
//! strategy = "paragraph"
//!
//! [ingest]
//! extensions = [".txt", ".md", ".py"]
//! embed = true
//! embed_dim = 64
//!
//! [retrieval]
//! hybrid_alpha = 0.5
//! rrf_k = 60
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::chunk::ChunkStrategy;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub pack: PackConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// `<data dir>/context-pack/index.sqlite`, or a file in the working
/// directory when the platform has no data directory.
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("context-pack").join("index.sqlite"))
        .unwrap_or_else(|| PathBuf::from("context-pack.sqlite"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default)]
    pub strategy: ChunkStrategy,
    #[serde(default = "default_semantic_threshold")]
    pub semantic_threshold: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            strategy: ChunkStrategy::default(),
            semantic_threshold: default_semantic_threshold(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}
fn default_semantic_threshold() -> f64 {
    0.2
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default)]
    pub embed: bool,
    #[serde(default = "default_dim")]
    pub embed_dim: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            embed: false,
            embed_dim: default_dim(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec![".txt".to_string(), ".md".to_string(), ".py".to_string()]
}
fn default_dim() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_dim")]
    pub dim: usize,
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f64,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    #[serde(default = "default_candidate_k_keyword")]
    pub candidate_k_keyword: usize,
    #[serde(default = "default_candidate_k_vector")]
    pub candidate_k_vector: usize,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            dim: default_dim(),
            hybrid_alpha: default_hybrid_alpha(),
            rrf_k: default_rrf_k(),
            candidate_k_keyword: default_candidate_k_keyword(),
            candidate_k_vector: default_candidate_k_vector(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

fn default_k() -> usize {
    5
}
fn default_hybrid_alpha() -> f64 {
    0.5
}
fn default_rrf_k() -> f64 {
    60.0
}
fn default_candidate_k_keyword() -> usize {
    20
}
fn default_candidate_k_vector() -> usize {
    50
}
fn default_snippet_chars() -> usize {
    1200
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

fn default_cache_capacity() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct PackConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default)]
    pub max_tokens: Option<usize>,
    #[serde(default = "default_token_chars_ratio")]
    pub token_chars_ratio: f64,
    #[serde(default)]
    pub dedup: bool,
    #[serde(default)]
    pub token_aware: bool,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            max_tokens: None,
            token_chars_ratio: default_token_chars_ratio(),
            dedup: false,
            token_aware: false,
        }
    }
}

fn default_max_chars() -> usize {
    8000
}
fn default_token_chars_ratio() -> f64 {
    4.0
}

impl Config {
    /// Config rooted at an explicit store path, everything else default.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            bail!("chunking.overlap must be smaller than chunking.chunk_size");
        }
        if !(0.0..=1.0).contains(&self.chunking.semantic_threshold) {
            bail!("chunking.semantic_threshold must be in [0.0, 1.0]");
        }
        if self.ingest.embed_dim == 0 || self.retrieval.dim == 0 {
            bail!("embedding dimensions must be > 0");
        }
        if self.retrieval.k == 0 {
            bail!("retrieval.k must be >= 1");
        }
        if !(0.0..=1.0).contains(&self.retrieval.hybrid_alpha) {
            bail!("retrieval.hybrid_alpha must be in [0.0, 1.0]");
        }
        if self.retrieval.rrf_k < 0.0 {
            bail!("retrieval.rrf_k must be >= 0");
        }
        if self.cache.capacity == 0 {
            bail!("cache.capacity must be >= 1");
        }
        if self.pack.token_chars_ratio <= 0.0 {
            bail!("pack.token_chars_ratio must be > 0");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
