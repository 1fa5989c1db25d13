//! # Context Pack
//!
//! A local-first retrieval engine that attaches relevant file content to a
//! prompt without any network service.
//!
//! Files are split into chunks and stored in a single SQLite file with an
//! FTS5 index and optional hashed embeddings. Queries run lexically, by
//! vector similarity, or fused with reciprocal rank fusion, and the best
//! chunks are packed into a character/token budget with their source
//! labels.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐
//! │  Files   │──▶│ Chunk+Embed  │──▶│  SQLite   │
//! │ (walk)   │   │              │   │ FTS5+Vec  │
//! └──────────┘   └──────────────┘   └─────┬─────┘
//!                                         │
//!                 ┌───────────────────────┤
//!                 ▼                       ▼
//!           ┌───────────┐          ┌────────────┐
//!           │  Search   │─────────▶│   Packer   │
//!           │ (+ cache) │          │  (budget)  │
//!           └───────────┘          └────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use context_pack::{Config, ContextEngine, SearchMode};
//! use std::path::PathBuf;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut engine = ContextEngine::new(Config::with_db_path("/tmp/index.sqlite"))?;
//! engine.ingest(&[PathBuf::from("./docs")]).await?;
//! let packed = engine.pack(SearchMode::Hybrid, "deployment steps", 5).await?;
//! println!("{}", packed.packed_text);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunk`] | Fixed, paragraph, and semantic chunking |
//! | [`embedding`] | Deterministic hashed embeddings |
//! | [`db`] | Store connection |
//! | [`migrate`] | Schema creation |
//! | [`ingest`] | File discovery and incremental ingestion |
//! | [`backfill`] | Embedding chunks that lack vectors |
//! | [`search`] | Lexical, vector, and hybrid search |
//! | [`cache`] | LRU query cache |
//! | [`pack`] | Budgeted context assembly |
//! | [`get`] | Document lookup |
//! | [`stats`] | Index statistics |
//! | [`prune`] | Removal of deleted files |
//! | [`engine`] | Facade tying it all together |
//! | [`error`] | Typed errors |

pub mod backfill;
pub mod cache;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod get;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod pack;
pub mod prune;
pub mod search;
pub mod stats;

pub use config::Config;
pub use engine::ContextEngine;
pub use models::{Chunk, Document, IngestReport, PruneReport, SearchResult};
pub use search::{HybridParams, SearchMode};
