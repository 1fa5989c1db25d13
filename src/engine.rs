//! Single entry point over one store.
//!
//! [`ContextEngine`] owns a [`Config`] and the [`QueryCache`]. Searches go
//! through the cache; operations that change the index clear it.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::backfill::{self, EmbedReport};
use crate::cache::{CacheKey, QueryCache};
use crate::config::Config;
use crate::get::{self, DocumentResponse};
use crate::ingest::{self, IngestOptions};
use crate::models::{IngestReport, PruneReport, SearchResult};
use crate::pack::{self, PackOptions, PackedContext};
use crate::prune;
use crate::search::{self, HybridParams, SearchMode};
use crate::stats::{self, StoreStats};

pub struct ContextEngine {
    config: Config,
    cache: QueryCache,
}

impl ContextEngine {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let cache = QueryCache::new(config.cache.capacity);
        Ok(Self { config, cache })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Ingest with the configured extensions and embedding settings.
    pub async fn ingest(&mut self, paths: &[PathBuf]) -> Result<IngestReport> {
        let opts = IngestOptions::from_config(&self.config);
        self.ingest_with(paths, &opts).await
    }

    pub async fn ingest_with(
        &mut self,
        paths: &[PathBuf],
        opts: &IngestOptions,
    ) -> Result<IngestReport> {
        let report = ingest::ingest(&self.config, paths, opts).await?;
        if report.docs > 0 {
            self.invalidate("ingest");
        }
        Ok(report)
    }

    pub async fn search(&mut self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let key = CacheKey::lexical(&self.db_key(), self.config.chunking.strategy, query, k);
        if let Some(hit) = self.cache.get(&key, k) {
            return Ok(hit);
        }
        let results = search::search(&self.config, query, k).await?;
        self.cache.put(key, results.clone());
        Ok(results)
    }

    pub async fn search_embed(
        &mut self,
        query: &str,
        k: usize,
        dim: usize,
    ) -> Result<Vec<SearchResult>> {
        let key = CacheKey::vector(&self.db_key(), self.config.chunking.strategy, query, k, dim);
        if let Some(hit) = self.cache.get(&key, k) {
            return Ok(hit);
        }
        let results = search::search_embed(&self.config, query, k, dim).await?;
        self.cache.put(key, results.clone());
        Ok(results)
    }

    pub async fn search_hybrid(
        &mut self,
        query: &str,
        params: &HybridParams,
    ) -> Result<Vec<SearchResult>> {
        let key = CacheKey::hybrid(
            &self.db_key(),
            self.config.chunking.strategy,
            query,
            params.k,
            params.dim,
            params.alpha,
            params.rrf_k,
        );
        if let Some(hit) = self.cache.get(&key, params.k) {
            return Ok(hit);
        }
        let results = search::search_hybrid(&self.config, query, params).await?;
        self.cache.put(key, results.clone());
        Ok(results)
    }

    /// Search in `mode`, taking dimension and fusion settings from the
    /// config.
    pub async fn query(
        &mut self,
        mode: SearchMode,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        match mode {
            SearchMode::Lexical => self.search(query, k).await,
            SearchMode::Vector => {
                let dim = self.config.retrieval.dim;
                self.search_embed(query, k, dim).await
            }
            SearchMode::Hybrid => {
                let params = HybridParams {
                    k,
                    ..HybridParams::from_config(&self.config.retrieval)
                };
                self.search_hybrid(query, &params).await
            }
        }
    }

    /// Search and pack the results with the configured budgets.
    pub async fn pack(&mut self, mode: SearchMode, query: &str, k: usize) -> Result<PackedContext> {
        let opts = PackOptions::from_config(&self.config.pack);
        self.pack_with(mode, query, k, &opts).await
    }

    pub async fn pack_with(
        &mut self,
        mode: SearchMode,
        query: &str,
        k: usize,
        opts: &PackOptions,
    ) -> Result<PackedContext> {
        let results = self.query(mode, query, k).await?;
        Ok(pack::pack(query, &results, opts))
    }

    pub async fn stats(&self, top_n: usize) -> Result<StoreStats> {
        stats::stats(&self.config, top_n).await
    }

    pub async fn prune(&mut self) -> Result<PruneReport> {
        let report = prune::prune(&self.config).await?;
        if report.removed_docs > 0 {
            self.invalidate("prune");
        }
        Ok(report)
    }

    pub async fn embed_pending(&mut self, dim: usize) -> Result<EmbedReport> {
        let report = backfill::embed_pending(&self.config, dim).await?;
        if report.embedded > 0 {
            self.invalidate("embed_pending");
        }
        Ok(report)
    }

    pub async fn get_document(&self, path: &Path) -> Result<DocumentResponse> {
        get::get_document(&self.config, path).await
    }

    fn db_key(&self) -> String {
        self.config.db.path.to_string_lossy().to_string()
    }

    fn invalidate(&mut self, reason: &str) {
        if !self.cache.is_empty() {
            debug!(reason, entries = self.cache.len(), "clearing query cache");
        }
        self.cache.clear();
    }
}
