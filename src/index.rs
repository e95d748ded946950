//! Rebuild orchestration.
//!
//! Drives the full pipeline: load PDFs → chunk → load code records →
//! normalize → concatenate → embed → persist. The unified rebuild replaces
//! the collection wholesale: the old one is deleted before the new one is
//! written, never merged into. A crash between the delete and the final
//! commit leaves no usable collection; the single-file layout keeps the
//! window small, and `store::delete_collection` is the one place to change
//! if an atomic swap is ever wanted.
//!
//! Everything runs synchronously to completion: one batch job, no workers,
//! no partial commits. Loader errors abort before the existing collection
//! is touched; backend errors after the delete leave the collection absent.

use anyhow::Result;

use crate::chunk::{self, ChunkPolicy};
use crate::code_source;
use crate::config::Config;
use crate::embedding::EmbeddingBackend;
use crate::error::PipelineError;
use crate::models::{Fragment, SourceKind};
use crate::normalize;
use crate::pdf_source;
use crate::store;

/// Stage counts reported back to the caller.
#[derive(Debug)]
pub struct RebuildReport {
    pub pdf_documents: usize,
    pub pdf_fragments: usize,
    pub code_fragments: usize,
    pub total: usize,
}

/// Full rebuild: destroy the existing collection and re-ingest the corpus.
///
/// Fragment order in the new collection is deterministic. PDF fragments come
/// first, code fragments after, each in input order.
pub async fn rebuild(config: &Config, backend: &dyn EmbeddingBackend) -> Result<RebuildReport> {
    let policy = ChunkPolicy {
        chunk_size: config.chunking.chunk_size,
        chunk_overlap: config.chunking.chunk_overlap,
        ..ChunkPolicy::default()
    };

    println!("rebuild");

    let pdf_docs = pdf_source::load_pdfs(config)?;
    let pdf_documents = pdf_docs.len();
    println!("  pdf documents: {}", pdf_documents);

    let mut fragments: Vec<Fragment> = chunk::split_documents(&pdf_docs, &policy)
        .into_iter()
        .map(|fragment| normalize::normalize(fragment, SourceKind::Pdf))
        .collect();
    let pdf_fragments = fragments.len();
    println!("  pdf fragments: {}", pdf_fragments);

    // Code records are pre-chunked; they skip the splitter and go straight
    // through normalization.
    let code_docs = code_source::load_code_chunks(config)?;
    fragments.extend(code_docs.into_iter().map(|doc| {
        normalize::normalize(Fragment::new(doc.content, doc.meta), SourceKind::Code)
    }));
    let code_fragments = fragments.len() - pdf_fragments;
    println!("  code fragments: {}", code_fragments);

    if fragments.is_empty() {
        return Err(PipelineError::EmptyCorpus.into());
    }
    println!("  total fragments: {}", fragments.len());

    // Replace, never merge.
    store::delete_collection(config)?;
    let pool = store::create_collection(config).await?;

    let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(fragments.len());
    for batch in fragments.chunks(config.embedding.batch_size) {
        let texts: Vec<String> = batch.iter().map(|f| f.content.clone()).collect();
        let vectors = backend.embed(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(PipelineError::Backend(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            ))
            .into());
        }
        embeddings.extend(vectors);
    }
    println!("  embedded with: {}", backend.model_name());

    store::insert_fragments(&pool, &fragments, &embeddings).await?;
    store::write_meta(&pool, backend.model_name(), backend.dims()).await?;
    pool.close().await;

    println!("  collection: {}", store::collection_file(config).display());
    println!("ok");

    Ok(RebuildReport {
        pdf_documents,
        pdf_fragments,
        code_fragments,
        total: pdf_fragments + code_fragments,
    })
}

/// Incremental variant: reuse an existing non-empty collection, otherwise
/// build from scratch. Returns `true` when a build actually ran.
///
/// Distinct from [`rebuild`] on purpose: this mode never destroys data.
pub async fn ensure(config: &Config, backend: &dyn EmbeddingBackend) -> Result<bool> {
    if store::exists_nonempty(config).await? {
        println!(
            "collection '{}' already present, skipping rebuild",
            config.store.collection
        );
        return Ok(false);
    }
    rebuild(config, backend).await?;
    Ok(true)
}
