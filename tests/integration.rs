use context_pack::backfill::embed_pending;
use context_pack::error::SearchError;
use context_pack::get::get_document;
use context_pack::ingest::{ingest, IngestOptions};
use context_pack::prune::prune;
use context_pack::search::{search, search_embed, search_hybrid};
use context_pack::stats::stats;
use context_pack::{Config, ContextEngine, HybridParams, SearchMode};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup_test_env() -> (TempDir, Config, PathBuf) {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming.\n\nIt contains information about cargo and crates.",
    )
    .unwrap();
    fs::write(
        files_dir.join("beta.md"),
        "# Beta Document\n\nThis document discusses Python and machine learning.\n\nDeep learning frameworks like PyTorch are covered.",
    )
    .unwrap();
    fs::write(
        files_dir.join("gamma.txt"),
        "Gamma plain text file.\n\nContains notes about deployment and infrastructure.\n\nKubernetes and Docker are mentioned here.",
    )
    .unwrap();
    fs::write(files_dir.join("ignored.rs"), "fn main() { deployment(); }").unwrap();

    let config = Config::with_db_path(root.join("data").join("index.sqlite"));
    (tmp, config, files_dir)
}

#[tokio::test]
async fn test_ingest_creates_store() {
    let (_tmp, config, files) = setup_test_env();
    let report = ingest(&config, &[files], &IngestOptions::default())
        .await
        .unwrap();

    assert_eq!(report.docs, 3);
    assert_eq!(report.chunks, 3);
    assert_eq!(report.skipped, 0);
    assert!(config.db.path.exists());
}

#[tokio::test]
async fn test_ingest_idempotent() {
    let (_tmp, config, files) = setup_test_env();
    let opts = IngestOptions::default();
    ingest(&config, &[files.clone()], &opts).await.unwrap();

    let second = ingest(&config, &[files], &opts).await.unwrap();
    assert_eq!(second.docs, 0);
    assert_eq!(second.chunks, 0);
    assert_eq!(second.skipped, 3);

    let s = stats(&config, 10).await.unwrap();
    assert_eq!(s.doc_count, 3);
    assert_eq!(s.chunk_count, 3);
}

#[tokio::test]
async fn test_ingest_changed_file_is_replaced() {
    let (_tmp, config, files) = setup_test_env();
    let opts = IngestOptions::default();
    ingest(&config, &[files.clone()], &opts).await.unwrap();

    fs::write(
        files.join("alpha.md"),
        "Completely rewritten alpha file mentioning zeppelins only.",
    )
    .unwrap();

    let report = ingest(&config, &[files], &opts).await.unwrap();
    assert_eq!(report.docs, 1);
    assert_eq!(report.skipped, 2);

    let hits = search(&config, "zeppelins", 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].path.ends_with("alpha.md"));

    // old content is gone from the full-text index too
    let stale = search(&config, "cargo", 5).await.unwrap();
    assert!(stale.is_empty());
}

#[tokio::test]
async fn test_ingest_single_file_and_empty_allowlist() {
    let (_tmp, config, files) = setup_test_env();
    let opts = IngestOptions {
        extensions: Vec::new(),
        ..IngestOptions::default()
    };
    let report = ingest(&config, &[files.join("ignored.rs")], &opts)
        .await
        .unwrap();
    assert_eq!(report.docs, 1);
}

#[tokio::test]
async fn test_search_keyword() {
    let (_tmp, config, files) = setup_test_env();
    ingest(&config, &[files], &IngestOptions::default())
        .await
        .unwrap();

    let hits = search(&config, "deployment", 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].path.ends_with("gamma.txt"));
    assert!(hits[0].snippet.contains("deployment"));
    assert_eq!(hits[0].similarity, None);

    let hits = search(&config, "document", 5).await.unwrap();
    assert_eq!(hits.len(), 2);
    for pair in hits.windows(2) {
        assert!(pair[0].score <= pair[1].score);
    }
}

#[tokio::test]
async fn test_search_empty_and_no_results() {
    let (_tmp, config, files) = setup_test_env();
    ingest(&config, &[files], &IngestOptions::default())
        .await
        .unwrap();

    assert!(search(&config, "   ", 5).await.unwrap().is_empty());
    assert!(search(&config, "xyznonexistent", 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_query_is_typed_error() {
    let (_tmp, config, files) = setup_test_env();
    ingest(&config, &[files], &IngestOptions::default())
        .await
        .unwrap();

    let err = search(&config, "\"unterminated", 5).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SearchError>(),
        Some(SearchError::InvalidQuery { .. })
    ));

    let err = search_hybrid(&config, "\"unterminated", &HybridParams::default())
        .await
        .unwrap_err();
    assert!(err.downcast_ref::<SearchError>().is_some());
}

#[tokio::test]
async fn test_hybrid_without_embeddings_falls_back_to_lexical() {
    let (_tmp, config, files) = setup_test_env();
    ingest(&config, &[files], &IngestOptions::default())
        .await
        .unwrap();

    let hits = search_hybrid(&config, "document", &HybridParams::default())
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    for hit in &hits {
        assert!(hit.hybrid_score.is_some());
        assert_eq!(hit.similarity, None);
    }
}

#[tokio::test]
async fn test_search_embed_deterministic() {
    let (_tmp, config, files) = setup_test_env();
    let opts = IngestOptions {
        embed: true,
        ..IngestOptions::default()
    };
    ingest(&config, &[files], &opts).await.unwrap();

    let first = search_embed(&config, "machine learning frameworks", 3, 64)
        .await
        .unwrap();
    let second = search_embed(&config, "machine learning frameworks", 3, 64)
        .await
        .unwrap();

    assert_eq!(first.len(), 3);
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
    // gamma shares no tokens with the query
    assert!(first[2].path.ends_with("gamma.txt"));
    assert_eq!(first[2].similarity, Some(0.0));
    for pair in first.windows(2) {
        assert!(pair[0].score <= pair[1].score);
    }

    // no vectors stored at another dim
    assert!(search_embed(&config, "machine", 3, 32).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_embed_pending_backfills_once() {
    let (_tmp, config, files) = setup_test_env();
    ingest(&config, &[files], &IngestOptions::default())
        .await
        .unwrap();

    let report = embed_pending(&config, 32).await.unwrap();
    assert_eq!(report.pending, 3);
    assert_eq!(report.embedded, 3);

    let again = embed_pending(&config, 32).await.unwrap();
    assert_eq!(again.pending, 0);
    assert_eq!(again.embedded, 0);

    let s = stats(&config, 10).await.unwrap();
    assert_eq!(s.embeddings_by_dim, vec![(32, 3)]);
    assert_eq!(search_embed(&config, "docker", 5, 32).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_get_document() {
    let (_tmp, config, files) = setup_test_env();
    ingest(&config, &[files.clone()], &IngestOptions::default())
        .await
        .unwrap();

    let doc = get_document(&config, &files.join("beta.md")).await.unwrap();
    assert!(doc.document.path.ends_with("beta.md"));
    assert_eq!(doc.chunks.len(), 1);
    assert_eq!(doc.chunks[0].chunk_index, 0);
    assert!(doc.text().contains("PyTorch"));

    let missing = get_document(&config, &files.join("nope.md")).await;
    assert!(missing.is_err());
}

#[tokio::test]
async fn test_end_to_end_hybrid_prune_stats() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let files = tmp.path().join("docs");
    fs::create_dir_all(&files).unwrap();
    fs::write(files.join("one.md"), "alpha beta gamma delta").unwrap();
    fs::write(files.join("two.md"), "alpha beta epsilon").unwrap();
    fs::write(files.join("three.txt"), "zeta eta theta alpha").unwrap();

    let config = Config::with_db_path(tmp.path().join("index.sqlite"));
    let opts = IngestOptions {
        embed: true,
        ..IngestOptions::default()
    };
    ingest(&config, &[files.clone()], &opts).await.unwrap();

    let params = HybridParams {
        k: 3,
        ..HybridParams::default()
    };
    let hits = search_hybrid(&config, "alpha beta", &params).await.unwrap();
    assert!(!hits.is_empty());
    assert!(hits.len() <= 3);
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert!(hits.iter().all(|h| h.hybrid_score.is_some()));

    let before = stats(&config, 10).await.unwrap();
    assert_eq!(before.doc_count, 3);

    fs::remove_file(files.join("two.md")).unwrap();
    let report = prune(&config).await.unwrap();
    assert_eq!(report.removed_docs, 1);
    assert_eq!(report.removed_chunks, 1);

    let after = stats(&config, 10).await.unwrap();
    assert_eq!(after.doc_count, before.doc_count - 1);
    assert_eq!(after.embeddings_by_dim, vec![(64, 2)]);
    assert!(after.largest.iter().all(|d| !d.path.ends_with("two.md")));

    let hits = search(&config, "epsilon", 5).await.unwrap();
    assert!(hits.is_empty());

    let backup = tmp.path().join("index.sqlite.prune-bak");
    assert!(!backup.exists());

    // nothing left to remove
    let report = prune(&config).await.unwrap();
    assert_eq!(report.removed_docs, 0);
}

#[tokio::test]
async fn test_engine_caches_and_invalidates() {
    let (_tmp, config, files) = setup_test_env();
    let mut engine = ContextEngine::new(config).unwrap();
    engine.ingest(&[files.clone()]).await.unwrap();

    let first = engine.search("kubernetes", 5).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(engine.cache().len(), 1);

    let cached = engine.search("kubernetes", 5).await.unwrap();
    assert_eq!(first, cached);
    assert_eq!(engine.cache().len(), 1);

    fs::write(files.join("delta.md"), "Kubernetes operators and Helm charts.").unwrap();
    engine.ingest(&[files]).await.unwrap();
    assert!(engine.cache().is_empty());

    let fresh = engine.search("kubernetes", 5).await.unwrap();
    assert_eq!(fresh.len(), 2);
}

#[tokio::test]
async fn test_engine_pack_respects_budget() {
    let (_tmp, mut config, files) = setup_test_env();
    config.pack.max_chars = 200;
    let mut engine = ContextEngine::new(config).unwrap();
    engine.ingest(&[files]).await.unwrap();

    let packed = engine
        .pack(SearchMode::Lexical, "document", 5)
        .await
        .unwrap();
    assert!(packed.chars <= 200);
    assert_eq!(packed.chars, packed.packed_text.chars().count());
    assert!(!packed.included_refs.is_empty());
    for r in &packed.included_refs {
        assert!(packed
            .packed_text
            .contains(&format!("{}#{}]", r.path, r.chunk_index)));
    }
}

#[tokio::test]
async fn test_engine_rejects_invalid_config() {
    let mut config = Config::with_db_path("/tmp/never-created.sqlite");
    config.chunking.overlap = config.chunking.chunk_size;
    assert!(ContextEngine::new(config).is_err());
}

#[tokio::test]
async fn test_ingest_skips_undecodable_file() {
    let (_tmp, config, files) = setup_test_env();
    fs::write(files.join("binary.md"), [0xff, 0xfe, 0x00, 0x80, 0x81]).unwrap();

    let report = ingest(&config, &[files], &IngestOptions::default())
        .await
        .unwrap();
    assert_eq!(report.docs, 3);
    assert_eq!(report.unreadable, 1);
}

#[tokio::test]
async fn test_file_that_became_undecodable_is_dropped() {
    let (_tmp, config, files) = setup_test_env();
    let opts = IngestOptions::default();
    ingest(&config, &[files.clone()], &opts).await.unwrap();
    assert_eq!(search(&config, "cargo", 5).await.unwrap().len(), 1);

    fs::write(files.join("alpha.md"), [0xff, 0xfe, 0x00]).unwrap();
    let report = ingest(&config, &[files], &opts).await.unwrap();
    assert_eq!(report.unreadable, 1);
    assert_eq!(report.docs, 0);

    assert!(search(&config, "cargo", 5).await.unwrap().is_empty());
    assert_eq!(stats(&config, 10).await.unwrap().doc_count, 2);
}

#[tokio::test]
async fn test_pack_keeps_long_chunks_whole() {
    let (tmp, mut config, _files) = setup_test_env();
    config.chunking.chunk_size = 2000;

    let long_dir = tmp.path().join("long");
    fs::create_dir_all(&long_dir).unwrap();
    let body = format!("needle {}TAILMARK", "filler word ".repeat(125));
    assert!(body.chars().count() > config.retrieval.snippet_chars);
    fs::write(long_dir.join("long.md"), &body).unwrap();

    let mut engine = ContextEngine::new(config).unwrap();
    engine.ingest(&[long_dir]).await.unwrap();

    let hits = engine.search("needle", 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].snippet.chars().count(), 1200);
    assert_eq!(hits[0].content, body);

    let packed = engine
        .pack(SearchMode::Lexical, "needle", 5)
        .await
        .unwrap();
    assert_eq!(packed.included_refs.len(), 1);
    assert!(packed.packed_text.contains("TAILMARK"));
}

#[tokio::test]
async fn test_prune_restores_store_when_rebuild_fails() {
    let (tmp, config, files) = setup_test_env();
    ingest(&config, &[files.clone()], &IngestOptions::default())
        .await
        .unwrap();
    fs::remove_file(files.join("gamma.txt")).unwrap();

    // chunking options that fail validation make the re-ingest step fail
    let mut broken = config.clone();
    broken.chunking.overlap = broken.chunking.chunk_size;
    let err = prune(&broken).await.unwrap_err();
    assert!(err.to_string().contains("store restored from backup"));

    let backup = tmp.path().join("data").join("index.sqlite.prune-bak");
    assert!(!backup.exists());

    let s = stats(&config, 10).await.unwrap();
    assert_eq!(s.doc_count, 3);
    assert_eq!(search(&config, "cargo", 5).await.unwrap().len(), 1);

    // the restored store still prunes normally
    let report = prune(&config).await.unwrap();
    assert_eq!(report.removed_docs, 1);
    assert_eq!(stats(&config, 10).await.unwrap().doc_count, 2);
}

#[tokio::test]
async fn test_prune_only_reembeds_previously_embedded_documents() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let embedded_dir = tmp.path().join("embedded");
    let plain_dir = tmp.path().join("plain");
    fs::create_dir_all(&embedded_dir).unwrap();
    fs::create_dir_all(&plain_dir).unwrap();
    fs::write(embedded_dir.join("keep.md"), "rust cargo crates").unwrap();
    fs::write(embedded_dir.join("drop.md"), "python pip wheels").unwrap();
    fs::write(plain_dir.join("plain.md"), "go modules vendoring").unwrap();

    let config = Config::with_db_path(tmp.path().join("index.sqlite"));
    let with_vectors = IngestOptions {
        embed: true,
        ..IngestOptions::default()
    };
    ingest(&config, &[embedded_dir.clone()], &with_vectors)
        .await
        .unwrap();
    ingest(&config, &[plain_dir], &IngestOptions::default())
        .await
        .unwrap();

    fs::remove_file(embedded_dir.join("drop.md")).unwrap();
    let report = prune(&config).await.unwrap();
    assert_eq!(report.removed_docs, 1);

    let s = stats(&config, 10).await.unwrap();
    assert_eq!(s.doc_count, 2);
    assert_eq!(s.embeddings_by_dim, vec![(64, 1)]);

    let hits = search_embed(&config, "go modules", 5, 64).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].path.ends_with("keep.md"));
}
