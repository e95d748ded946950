//! Operator summary of the persisted collection.

use anyhow::Result;

use crate::config::Config;
use crate::store;

pub async fn run_status(config: &Config) -> Result<()> {
    let pool = store::open_collection(config).await?;

    let total = store::count_fragments(&pool).await?;
    let pdf = store::count_by_source(&pool, "pdf").await?;
    let code = store::count_by_source(&pool, "code").await?;
    let unknown = "unknown".to_string();
    let model = store::read_meta(&pool, "embedding_model")
        .await?
        .unwrap_or_else(|| unknown.clone());
    let dims = store::read_meta(&pool, "dims")
        .await?
        .unwrap_or_else(|| unknown.clone());
    let built_at = store::read_meta(&pool, "built_at")
        .await?
        .unwrap_or(unknown);

    println!("collection: {}", store::collection_file(config).display());
    println!("  fragments: {} ({} pdf, {} code)", total, pdf, code);
    println!("  embedding model: {} ({} dims)", model, dims);
    println!("  built at: {}", built_at);

    pool.close().await;
    Ok(())
}
