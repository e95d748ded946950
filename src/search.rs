//! Query-time retrieval.
//!
//! Embeds the question with the same backend used at build time and ranks
//! every stored fragment by cosine similarity. The collection is small
//! enough that a linear scan over the stored vectors beats maintaining a
//! separate index; result order is by score, not ingestion order.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::embedding::{cosine_similarity, EmbeddingBackend};
use crate::models::Fragment;
use crate::store;

/// One retrieved fragment with its similarity score.
pub struct Hit {
    pub fragment: Fragment,
    pub score: f32,
}

/// The `k` fragments most similar to `question`, best first.
pub async fn top_fragments(
    pool: &SqlitePool,
    backend: &dyn EmbeddingBackend,
    question: &str,
    k: usize,
) -> Result<Vec<Hit>> {
    let query_vec = backend
        .embed(&[question.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("empty embedding response for query"))?;

    let mut scored: Vec<(String, f32)> = store::all_embeddings(pool)
        .await?
        .into_iter()
        .map(|(id, vector)| {
            let score = cosine_similarity(&query_vec, &vector);
            (id, score)
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);

    let mut hits = Vec::with_capacity(scored.len());
    for (id, score) in scored {
        hits.push(Hit {
            fragment: store::fragment_by_id(pool, &id).await?,
            score,
        });
    }
    Ok(hits)
}
