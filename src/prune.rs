//! Removal of documents whose files no longer exist.
//!
//! Pruning rebuilds the store instead of deleting rows in place:
//!
//! 1. Find documents whose path is gone. If there are none, stop.
//! 2. Move the store file (and its WAL sidecars) to `<db>.prune-bak`.
//! 3. Create a fresh store and re-ingest the surviving paths.
//! 4. Re-embed, at each dimension, only the documents that had vectors at
//!    that dimension before.
//! 5. Delete the backup.
//!
//! If the rebuild fails the backup is moved back into place. Failing to
//! delete the backup after a successful rebuild is logged and ignored.

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::backfill;
use crate::config::Config;
use crate::db;
use crate::ingest::{self, IngestOptions};
use crate::models::PruneReport;

const BACKUP_SUFFIX: &str = ".prune-bak";
const SIDECARS: [&str; 3] = ["", "-wal", "-shm"];

pub async fn prune(config: &Config) -> Result<PruneReport> {
    let pool = db::connect(config).await?;
    let scan = scan_documents(&pool).await;
    let embedded = backfill::embedded_documents(&pool).await;
    pool.close().await;

    let (missing, survivors) = scan?;
    let embedded = embedded?;

    if missing.is_empty() {
        info!("prune: nothing to remove");
        return Ok(PruneReport::default());
    }

    let report = PruneReport {
        removed_docs: missing.len(),
        removed_chunks: missing.iter().map(|(_, chunks)| *chunks as usize).sum(),
    };

    let db_path = &config.db.path;
    move_store(db_path, &with_suffix(db_path, BACKUP_SUFFIX))
        .context("Failed to back up store before prune")?;

    if let Err(e) = rebuild(config, &survivors, &embedded).await {
        remove_store(db_path);
        move_store(&with_suffix(db_path, BACKUP_SUFFIX), db_path)
            .context("Failed to restore store backup after prune error")?;
        return Err(e.context("prune rebuild failed; store restored from backup"));
    }

    remove_backup(db_path);

    info!(
        removed_docs = report.removed_docs,
        removed_chunks = report.removed_chunks,
        kept_docs = survivors.len(),
        "prune complete"
    );

    Ok(report)
}

/// Split stored documents into `(missing path, chunk count)` pairs and
/// surviving paths.
async fn scan_documents(pool: &SqlitePool) -> Result<(Vec<(String, i64)>, Vec<PathBuf>)> {
    let rows = sqlx::query(
        r#"
        SELECT d.path AS path, COUNT(c.id) AS chunks
        FROM documents d
        LEFT JOIN chunks c ON c.doc_id = d.id
        GROUP BY d.id
        ORDER BY d.id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut missing: Vec<(String, i64)> = Vec::new();
    let mut survivors = Vec::new();
    for row in &rows {
        let path: String = row.get("path");
        if Path::new(&path).exists() {
            survivors.push(PathBuf::from(path));
        } else {
            missing.push((path, row.get("chunks")));
        }
    }

    Ok((missing, survivors))
}

async fn rebuild(
    config: &Config,
    survivors: &[PathBuf],
    embedded: &[(usize, String)],
) -> Result<()> {
    let opts = IngestOptions {
        embed: false,
        ..IngestOptions::from_config(config)
    };

    let pool = db::connect(config).await?;
    let result = async {
        ingest::ingest_files(&pool, config, survivors, &opts).await?;
        for (dim, path) in embedded {
            backfill::embed_missing_in(&pool, *dim, Some(path.as_str())).await?;
        }
        Ok::<_, anyhow::Error>(())
    }
    .await;
    pool.close().await;

    result
}

/// Rename the store and any sidecars from `from` to `to`.
fn move_store(from: &Path, to: &Path) -> std::io::Result<()> {
    for suffix in SIDECARS {
        let src = with_suffix(from, suffix);
        if src.exists() {
            std::fs::rename(&src, with_suffix(to, suffix))?;
        }
    }
    Ok(())
}

/// Delete the backup files next to `db_path`. Failures are logged and
/// counted, never returned.
fn remove_backup(db_path: &Path) -> usize {
    let mut failed = 0;
    for suffix in SIDECARS {
        let backup = with_suffix(db_path, &format!("{}{}", BACKUP_SUFFIX, suffix));
        if !backup.exists() {
            continue;
        }
        if let Err(e) = std::fs::remove_file(&backup) {
            warn!(path = %backup.display(), error = %e, "failed to delete prune backup");
            failed += 1;
        }
    }
    failed
}

fn remove_store(path: &Path) {
    for suffix in SIDECARS {
        let _ = std::fs::remove_file(with_suffix(path, suffix));
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
