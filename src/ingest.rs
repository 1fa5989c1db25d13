//! Ingestion pipeline.
//!
//! Walks the given paths, filters files by extension and exclude globs,
//! and for every file whose `(mtime, size)` differs from the index:
//! chunk → (optionally) embed → replace the document's rows in a single
//! transaction. Unchanged files are skipped, so re-running over the same
//! tree is a no-op. Unreadable or non-UTF-8 files are skipped silently; if
//! such a file was indexed before, its stale rows are removed.
//!
//! Files are processed one at a time in directory-walk order.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Instant, UNIX_EPOCH};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::chunk::{chunk_text, ChunkOptions};
use crate::config::{Config, IngestConfig};
use crate::db;
use crate::embedding;
use crate::models::IngestReport;

/// Per-call ingest parameters. Chunking settings come from the config.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOptions {
    /// Allowed file extensions, with or without the leading dot. An empty
    /// list accepts every file.
    pub extensions: Vec<String>,
    /// Compute and store an embedding for every written chunk.
    pub embed: bool,
    pub embed_dim: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl IngestOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            extensions: config.ingest.extensions.clone(),
            embed: config.ingest.embed,
            embed_dim: config.ingest.embed_dim,
        }
    }
}

pub async fn ingest(
    config: &Config,
    paths: &[PathBuf],
    opts: &IngestOptions,
) -> Result<IngestReport> {
    let started = Instant::now();
    let files = collect_files(paths, &opts.extensions, &config.ingest)?;

    let pool = db::connect(config).await?;
    let result = ingest_files(&pool, config, &files, opts).await;
    pool.close().await;

    let mut report = result?;
    report.seconds = started.elapsed().as_secs_f64();

    info!(
        docs = report.docs,
        chunks = report.chunks,
        skipped = report.skipped,
        unreadable = report.unreadable,
        seconds = report.seconds,
        "ingest complete"
    );

    Ok(report)
}

/// Ingest an already-resolved file list into an open store.
pub(crate) async fn ingest_files(
    pool: &SqlitePool,
    config: &Config,
    files: &[PathBuf],
    opts: &IngestOptions,
) -> Result<IngestReport> {
    let chunk_opts = ChunkOptions::from_config(&config.chunking);
    chunk_opts.validate()?;
    let embed_dim = opts.embed.then_some(opts.embed_dim);

    let mut report = IngestReport::default();

    for path in files {
        let key = path.to_string_lossy().to_string();

        let (mtime, size_bytes) = match file_signature(path) {
            Ok(sig) => sig,
            Err(e) => {
                debug!(path = %key, error = %e, "skipping unreadable file");
                report.unreadable += 1;
                continue;
            }
        };

        let existing: Option<(i64, i64)> =
            sqlx::query_as("SELECT mtime, size_bytes FROM documents WHERE path = ?")
                .bind(&key)
                .fetch_optional(pool)
                .await?;

        if existing == Some((mtime, size_bytes)) {
            report.skipped += 1;
            continue;
        }

        let body = match std::fs::read_to_string(path) {
            Ok(body) => body,
            Err(e) => {
                debug!(path = %key, error = %e, "skipping unreadable file");
                report.unreadable += 1;
                if existing.is_some() {
                    // the indexed text no longer matches the file
                    remove_document(pool, &key).await?;
                }
                continue;
            }
        };

        let chunks = chunk_text(&body, &chunk_opts)?;
        replace_document(pool, &key, mtime, size_bytes, &chunks, embed_dim).await?;

        debug!(path = %key, chunks = chunks.len(), "ingested");
        report.docs += 1;
        report.chunks += chunks.len();
    }

    Ok(report)
}

/// Upsert the document row and swap in its new chunks (and embeddings)
/// atomically.
async fn replace_document(
    pool: &SqlitePool,
    path: &str,
    mtime: i64,
    size_bytes: i64,
    chunks: &[String],
    embed_dim: Option<usize>,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    let doc_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO documents (path, mtime, size_bytes, ingested_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(path) DO UPDATE SET
            mtime = excluded.mtime,
            size_bytes = excluded.size_bytes,
            ingested_at = excluded.ingested_at
        RETURNING id
        "#,
    )
    .bind(path)
    .bind(mtime)
    .bind(size_bytes)
    .bind(chrono::Utc::now().timestamp())
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM embeddings WHERE chunk_id IN (SELECT id FROM chunks WHERE doc_id = ?)")
        .bind(doc_id)
        .execute(&mut *tx)
        .await?;

    // chunks_fts follows via the delete trigger
    sqlx::query("DELETE FROM chunks WHERE doc_id = ?")
        .bind(doc_id)
        .execute(&mut *tx)
        .await?;

    for (index, content) in chunks.iter().enumerate() {
        let chunk_id = sqlx::query("INSERT INTO chunks (doc_id, chunk_index, content) VALUES (?, ?, ?)")
            .bind(doc_id)
            .bind(index as i64)
            .bind(content)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        if let Some(dim) = embed_dim {
            store_embedding(&mut *tx, chunk_id, dim, content).await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

/// Delete a document; its chunks, vectors, and full-text rows follow via
/// cascades and triggers.
async fn remove_document(pool: &SqlitePool, path: &str) -> Result<()> {
    sqlx::query("DELETE FROM documents WHERE path = ?")
        .bind(path)
        .execute(pool)
        .await?;
    debug!(path, "removed stale document");
    Ok(())
}

/// Embed `content` at `dim` and upsert it for `chunk_id`.
pub(crate) async fn store_embedding(
    conn: &mut SqliteConnection,
    chunk_id: i64,
    dim: usize,
    content: &str,
) -> Result<()> {
    let blob = embedding::vec_to_blob(&embedding::embed(content, dim));
    sqlx::query("INSERT OR REPLACE INTO embeddings (chunk_id, dim, vector) VALUES (?, ?, ?)")
        .bind(chunk_id)
        .bind(dim as i64)
        .bind(blob)
        .execute(conn)
        .await?;
    Ok(())
}

/// `(mtime in nanoseconds, size in bytes)` used for change detection.
fn file_signature(path: &Path) -> std::io::Result<(i64, i64)> {
    let metadata = std::fs::metadata(path)?;
    let mtime = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    Ok((mtime, metadata.len() as i64))
}

/// Resolve `paths` into a deduplicated, canonical list of files to ingest.
///
/// Files given directly only need to pass the extension filter; directories
/// are walked recursively in file-name order with the exclude globs applied
/// to paths relative to the walked root. Paths that do not exist are
/// skipped with a warning.
pub fn collect_files(
    paths: &[PathBuf],
    extensions: &[String],
    ingest_config: &IngestConfig,
) -> Result<Vec<PathBuf>> {
    let mut excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    excludes.extend(ingest_config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    let mut seen = HashSet::new();

    for root in paths {
        if root.is_file() {
            if has_allowed_extension(root, extensions) {
                push_unique(&mut files, &mut seen, root);
            }
            continue;
        }
        if !root.is_dir() {
            warn!(path = %root.display(), "ingest path does not exist");
            continue;
        }

        let walker = WalkDir::new(root)
            .follow_links(ingest_config.follow_symlinks)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            if exclude_set.is_match(relative) {
                continue;
            }
            if !has_allowed_extension(path, extensions) {
                continue;
            }

            push_unique(&mut files, &mut seen, path);
        }
    }

    Ok(files)
}

fn push_unique(files: &mut Vec<PathBuf>, seen: &mut HashSet<PathBuf>, path: &Path) {
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if seen.insert(canonical.clone()) {
        files.push(canonical);
    }
}

fn has_allowed_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|allowed| allowed.trim_start_matches('.') == ext)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn exts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extension_filter() {
        let allowed = exts(&[".md", "txt"]);
        assert!(has_allowed_extension(Path::new("a/b.md"), &allowed));
        assert!(has_allowed_extension(Path::new("b.txt"), &allowed));
        assert!(!has_allowed_extension(Path::new("b.py"), &allowed));
        assert!(!has_allowed_extension(Path::new("Makefile"), &allowed));
        assert!(has_allowed_extension(Path::new("Makefile"), &[]));
    }

    #[test]
    fn test_collect_files_walks_sorted_and_excludes() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("b.md"), "b").unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join("sub/c.py"), "c").unwrap();
        fs::write(root.join("skip.rs"), "x").unwrap();
        fs::write(root.join("node_modules/pkg/readme.md"), "x").unwrap();

        let files = collect_files(
            &[root.to_path_buf()],
            &exts(&[".txt", ".md", ".py"]),
            &IngestConfig::default(),
        )
        .unwrap();

        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.md", "c.py"]);
    }

    #[test]
    fn test_collect_files_custom_exclude_and_dedup() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("drafts")).unwrap();
        fs::write(root.join("keep.md"), "k").unwrap();
        fs::write(root.join("drafts/wip.md"), "w").unwrap();

        let config = IngestConfig {
            exclude_globs: vec!["drafts/**".to_string()],
            ..IngestConfig::default()
        };
        let files = collect_files(
            &[root.to_path_buf(), root.join("keep.md")],
            &exts(&[".md"]),
            &config,
        )
        .unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("keep.md"));
    }

    #[test]
    fn test_missing_path_is_skipped() {
        let files = collect_files(
            &[PathBuf::from("/no/such/dir/anywhere")],
            &[],
            &IngestConfig::default(),
        )
        .unwrap();
        assert!(files.is_empty());
    }
}
