//! End-to-end pipeline tests over a temporary corpus and collection.
//!
//! Embeddings come from a deterministic in-test backend, so no network and
//! no model download is involved; the PDF case uses a minimal hand-built
//! document that the extraction library can parse.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use docqa::config::{
    ChunkingConfig, Config, CorpusConfig, EmbeddingConfig, LlmConfig, QaConfig, ServerConfig,
    StoreConfig,
};
use docqa::embedding::EmbeddingBackend;
use docqa::error::PipelineError;
use docqa::index;
use docqa::models::SourceKind;
use docqa::search;
use docqa::store;

struct StubBackend {
    calls: AtomicUsize,
}

impl StubBackend {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingBackend for StubBackend {
    fn model_name(&self) -> &str {
        "stub-embedder"
    }

    fn dims(&self) -> usize {
        8
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| pseudo_vector(t)).collect())
    }
}

// Deterministic unit-norm vector from a byte histogram. Identical texts map
// to identical vectors, so an exact-content query must rank first.
fn pseudo_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 8];
    for (i, b) in text.bytes().enumerate() {
        v[(b as usize + i) % 8] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
    v.into_iter().map(|x| x / norm).collect()
}

fn test_config(root: &Path) -> Config {
    Config {
        corpus: CorpusConfig {
            pdf_dir: root.join("pdfs"),
            code_chunks: root.join("code_chunks.json"),
        },
        store: StoreConfig {
            path: root.join("collections"),
            collection: "corpus".to_string(),
        },
        chunking: ChunkingConfig::default(),
        // Provider/model are bypassed: tests hand the stub backend to the
        // pipeline directly.
        embedding: EmbeddingConfig {
            provider: "openai".to_string(),
            model: "stub-embedder".to_string(),
            dims: 8,
            batch_size: 4,
            max_retries: 0,
            timeout_secs: 5,
        },
        llm: LlmConfig::default(),
        qa: QaConfig::default(),
        server: ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        },
    }
}

fn write_code_chunks(config: &Config, body: &str) {
    std::fs::write(&config.corpus.code_chunks, body).unwrap();
}

const TWO_RECORDS: &str = r#"[
    {"id": 1, "content": "def foo(): pass", "metadata": {"file": "a.py"}},
    {"id": 2, "content": "", "metadata": {}}
]"#;

/// Minimal single-page PDF containing `phrase`, with a correct xref table so
/// the extraction library can parse it.
fn minimal_pdf(phrase: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    let stream = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET\n", phrase);
    out.extend_from_slice(
        format!("4 0 obj << /Length {} >> stream\n{}endstream endobj\n", stream.len(), stream)
            .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n");
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

#[tokio::test]
async fn code_only_rebuild_succeeds_without_pdf_dir() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_code_chunks(&config, TWO_RECORDS);
    let backend = StubBackend::new();

    let report = index::rebuild(&config, &backend).await.unwrap();
    assert_eq!(report.pdf_documents, 0);
    assert_eq!(report.pdf_fragments, 0);
    assert_eq!(report.code_fragments, 1, "blank record must be dropped");
    assert_eq!(report.total, 1);

    let pool = store::open_collection(&config).await.unwrap();
    let fragments = store::all_fragments(&pool).await.unwrap();
    assert_eq!(fragments.len(), 1);

    let meta = &fragments[0].meta;
    assert_eq!(meta.source, SourceKind::Code);
    assert_eq!(meta.file.as_deref(), Some("a.py"));
    assert_eq!(meta.path.as_deref(), Some("unknown"));
    assert_eq!(meta.module.as_deref(), Some("unknown"));
    assert_eq!(meta.chunk_id.as_deref(), Some("1"));
    pool.close().await;
}

#[tokio::test]
async fn missing_code_chunks_fails_before_any_embedding() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let backend = StubBackend::new();

    let err = index::rebuild(&config, &backend).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::MissingInput(_))
    ));
    assert_eq!(backend.call_count(), 0, "no embedding call may happen");
    assert!(!store::collection_file(&config).exists());
}

#[tokio::test]
async fn empty_corpus_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_code_chunks(&config, "[]");
    let backend = StubBackend::new();

    let err = index::rebuild(&config, &backend).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::EmptyCorpus)
    ));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn rebuild_replaces_the_previous_collection() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let backend = StubBackend::new();

    write_code_chunks(
        &config,
        r#"[{"id": 1, "content": "first generation marker", "metadata": {}}]"#,
    );
    index::rebuild(&config, &backend).await.unwrap();

    write_code_chunks(
        &config,
        r#"[{"id": 2, "content": "second generation marker", "metadata": {}}]"#,
    );
    index::rebuild(&config, &backend).await.unwrap();

    let pool = store::open_collection(&config).await.unwrap();
    let fragments = store::all_fragments(&pool).await.unwrap();
    assert_eq!(fragments.len(), 1, "replace, not merge");
    assert_eq!(fragments[0].content, "second generation marker");
    pool.close().await;
}

#[tokio::test]
async fn rebuild_is_idempotent_on_an_unchanged_corpus() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_code_chunks(
        &config,
        r#"[
            {"id": "a", "content": "fn parse() {}", "metadata": {"file": "parse.rs"}},
            {"id": "b", "content": "fn render() {}", "metadata": {"file": "render.rs"}}
        ]"#,
    );
    let backend = StubBackend::new();

    let snapshot = |fragments: Vec<docqa::models::Fragment>| {
        fragments
            .into_iter()
            .map(|f| (f.content, f.hash, f.meta.file, f.meta.chunk_id))
            .collect::<Vec<_>>()
    };

    index::rebuild(&config, &backend).await.unwrap();
    let pool = store::open_collection(&config).await.unwrap();
    let first = snapshot(store::all_fragments(&pool).await.unwrap());
    pool.close().await;

    index::rebuild(&config, &backend).await.unwrap();
    let pool = store::open_collection(&config).await.unwrap();
    let second = snapshot(store::all_fragments(&pool).await.unwrap());
    pool.close().await;

    assert_eq!(first, second);
}

#[tokio::test]
async fn reuse_mode_keeps_an_existing_collection() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_code_chunks(&config, TWO_RECORDS);
    let backend = StubBackend::new();

    assert!(index::ensure(&config, &backend).await.unwrap());
    let calls_after_build = backend.call_count();

    // Second run must open the collection read-only and skip the build.
    assert!(!index::ensure(&config, &backend).await.unwrap());
    assert_eq!(backend.call_count(), calls_after_build);

    let pool = store::open_collection(&config).await.unwrap();
    assert_eq!(store::count_fragments(&pool).await.unwrap(), 1);
    pool.close().await;
}

#[tokio::test]
async fn retrieval_ranks_exact_content_first() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_code_chunks(
        &config,
        r#"[
            {"id": 1, "content": "fn connect_database() {}", "metadata": {}},
            {"id": 2, "content": "fn render_template() {}", "metadata": {}},
            {"id": 3, "content": "fn rotate_logs() {}", "metadata": {}}
        ]"#,
    );
    let backend = StubBackend::new();
    index::rebuild(&config, &backend).await.unwrap();

    let pool = store::open_collection(&config).await.unwrap();
    let hits = search::top_fragments(&pool, &backend, "fn render_template() {}", 2)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].fragment.content, "fn render_template() {}");
    assert!((hits[0].score - 1.0).abs() < 1e-5);
    assert!(hits[0].score >= hits[1].score);
    pool.close().await;
}

#[tokio::test]
async fn pdf_corpus_is_chunked_and_attributed() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    std::fs::create_dir_all(&config.corpus.pdf_dir).unwrap();
    std::fs::write(
        config.corpus.pdf_dir.join("manual.pdf"),
        minimal_pdf("power cycle the unit before replacing the filter"),
    )
    .unwrap();
    std::fs::write(config.corpus.pdf_dir.join("notes.txt"), "ignored").unwrap();
    write_code_chunks(
        &config,
        r#"[{"id": 1, "content": "def foo(): pass", "metadata": {"file": "a.py"}}]"#,
    );
    let backend = StubBackend::new();

    let report = index::rebuild(&config, &backend).await.unwrap();
    assert_eq!(report.pdf_documents, 1);
    assert!(report.pdf_fragments >= 1);
    assert_eq!(report.code_fragments, 1);

    let pool = store::open_collection(&config).await.unwrap();
    let fragments = store::all_fragments(&pool).await.unwrap();

    // Construction order: PDF fragments first, then code.
    assert_eq!(fragments.first().unwrap().meta.source, SourceKind::Pdf);
    assert_eq!(fragments.last().unwrap().meta.source, SourceKind::Code);

    let pdf_fragment = fragments
        .iter()
        .find(|f| f.meta.source == SourceKind::Pdf)
        .unwrap();
    assert_eq!(pdf_fragment.meta.pdf_file.as_deref(), Some("manual.pdf"));
    assert!(pdf_fragment.content.contains("power cycle"));
    pool.close().await;
}
