//! Collection persistence.
//!
//! A collection is a single SQLite database file under the configured
//! storage directory, named after the collection. The build pipeline owns
//! its lifecycle (create and delete) while the query path only ever opens
//! it. A full rebuild removes the file entirely before writing the new one;
//! the delete/recreate boundary is not crash-safe, which is the accepted
//! trade-off of the replace-not-merge contract.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::Config;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::PipelineError;
use crate::models::{Fragment, FragmentMeta, SourceKind};

/// Path of the collection database for this configuration.
pub fn collection_file(config: &Config) -> PathBuf {
    config
        .store
        .path
        .join(format!("{}.sqlite3", config.store.collection))
}

/// Create the collection database (and its parent directory) and run the
/// schema migration. Used by the build pipeline only.
pub async fn create_collection(config: &Config) -> Result<SqlitePool> {
    let file = collection_file(config);
    if let Some(parent) = file.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| PipelineError::Storage(format!("{}: {}", file.display(), e)))?;
    }
    let pool = connect(&file, true).await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Open an existing collection. The query path treats it as read-only.
///
/// A missing collection is an explicit precondition failure here, so the
/// server and the CLI fail at startup with a clear message instead of
/// serving an empty index.
pub async fn open_collection(config: &Config) -> Result<SqlitePool> {
    let file = collection_file(config);
    if !file.exists() {
        anyhow::bail!(
            "collection '{}' not found under {}; run `docqa rebuild` first",
            config.store.collection,
            config.store.path.display()
        );
    }
    connect(&file, false).await
}

async fn connect(file: &std::path::Path, create: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", file.display()))?
        .create_if_missing(create)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| PipelineError::Storage(format!("{}: {}", file.display(), e)))?;
    Ok(pool)
}

/// Remove the collection database and its WAL sidecar files, if present.
pub fn delete_collection(config: &Config) -> Result<()> {
    let file = collection_file(config);
    let sidecars = [
        file.clone(),
        file.with_extension("sqlite3-wal"),
        file.with_extension("sqlite3-shm"),
    ];
    for path in sidecars {
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| {
                PipelineError::Storage(format!("failed to remove {}: {}", path.display(), e))
            })?;
        }
    }
    Ok(())
}

/// Whether a collection exists and holds at least one fragment. Drives the
/// incremental build mode.
pub async fn exists_nonempty(config: &Config) -> Result<bool> {
    if !collection_file(config).exists() {
        return Ok(false);
    }
    let pool = open_collection(config).await?;
    let count = count_fragments(&pool).await?;
    pool.close().await;
    Ok(count > 0)
}

async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fragments (
            id TEXT PRIMARY KEY,
            seq INTEGER NOT NULL,
            content TEXT NOT NULL,
            hash TEXT NOT NULL,
            source TEXT NOT NULL,
            pdf_file TEXT,
            file TEXT,
            path TEXT,
            module TEXT,
            chunk_id TEXT,
            extra_json TEXT NOT NULL DEFAULT '{}',
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_fragments_source ON fragments(source)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collection_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert fragments and their vectors in one transaction, preserving the
/// construction order in `seq`.
pub async fn insert_fragments(
    pool: &SqlitePool,
    fragments: &[Fragment],
    embeddings: &[Vec<f32>],
) -> Result<()> {
    let mut tx = pool.begin().await?;
    for (seq, (fragment, vector)) in fragments.iter().zip(embeddings.iter()).enumerate() {
        let extra_json = serde_json::Value::Object(fragment.meta.extra.clone()).to_string();
        sqlx::query(
            r#"
            INSERT INTO fragments
                (id, seq, content, hash, source, pdf_file, file, path, module, chunk_id, extra_json, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&fragment.id)
        .bind(seq as i64)
        .bind(&fragment.content)
        .bind(&fragment.hash)
        .bind(fragment.meta.source.as_str())
        .bind(&fragment.meta.pdf_file)
        .bind(&fragment.meta.file)
        .bind(&fragment.meta.path)
        .bind(&fragment.meta.module)
        .bind(&fragment.meta.chunk_id)
        .bind(extra_json)
        .bind(vec_to_blob(vector))
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Record build provenance: embedding model, dimensionality, timestamp.
pub async fn write_meta(pool: &SqlitePool, model: &str, dims: usize) -> Result<()> {
    let entries = [
        ("embedding_model", model.to_string()),
        ("dims", dims.to_string()),
        ("built_at", chrono::Utc::now().to_rfc3339()),
    ];
    for (key, value) in entries {
        sqlx::query(
            r#"
            INSERT INTO collection_meta (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
    }
    Ok(())
}

pub async fn read_meta(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value = sqlx::query_scalar("SELECT value FROM collection_meta WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

pub async fn count_fragments(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM fragments")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn count_by_source(pool: &SqlitePool, source: &str) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM fragments WHERE source = ?")
        .bind(source)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Every stored vector, in construction order.
pub async fn all_embeddings(pool: &SqlitePool) -> Result<Vec<(String, Vec<f32>)>> {
    let rows = sqlx::query("SELECT id, embedding FROM fragments ORDER BY seq")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .iter()
        .map(|row| {
            let id: String = row.get("id");
            let blob: Vec<u8> = row.get("embedding");
            (id, blob_to_vec(&blob))
        })
        .collect())
}

pub async fn fragment_by_id(pool: &SqlitePool, id: &str) -> Result<Fragment> {
    let row = sqlx::query("SELECT * FROM fragments WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;
    row_to_fragment(&row)
}

/// Every stored fragment, in construction order.
pub async fn all_fragments(pool: &SqlitePool) -> Result<Vec<Fragment>> {
    let rows = sqlx::query("SELECT * FROM fragments ORDER BY seq")
        .fetch_all(pool)
        .await?;
    rows.iter().map(row_to_fragment).collect()
}

fn row_to_fragment(row: &SqliteRow) -> Result<Fragment> {
    let source_str: String = row.get("source");
    let source = SourceKind::parse(&source_str)
        .ok_or_else(|| PipelineError::Storage(format!("unknown source kind: {}", source_str)))?;

    let extra_json: String = row.get("extra_json");
    let extra = serde_json::from_str::<serde_json::Value>(&extra_json)
        .ok()
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();

    let mut meta = FragmentMeta::new(source);
    meta.pdf_file = row.get("pdf_file");
    meta.file = row.get("file");
    meta.path = row.get("path");
    meta.module = row.get("module");
    meta.chunk_id = row.get("chunk_id");
    meta.extra = extra;

    Ok(Fragment {
        id: row.get("id"),
        content: row.get("content"),
        hash: row.get("hash"),
        meta,
    })
}
