//! Core data types for the ingestion and retrieval pipeline.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Origin of a document or fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Code,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Pdf => "pdf",
            SourceKind::Code => "code",
        }
    }

    pub fn parse(s: &str) -> Option<SourceKind> {
        match s {
            "pdf" => Some(SourceKind::Pdf),
            "code" => Some(SourceKind::Code),
            _ => None,
        }
    }
}

/// Provenance metadata carried by documents and fragments.
///
/// The well-known fields are typed; anything else from the input records is
/// preserved in `extra` so nothing is lost across a rebuild.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentMeta {
    pub source: SourceKind,
    /// Originating PDF file name (PDF fragments).
    pub pdf_file: Option<String>,
    /// Source file name (code fragments).
    pub file: Option<String>,
    /// Source path (code fragments).
    pub path: Option<String>,
    /// Module name (code fragments).
    pub module: Option<String>,
    /// Identifier of the upstream code-chunk record.
    pub chunk_id: Option<String>,
    /// Input metadata keys with no dedicated field.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl FragmentMeta {
    pub fn new(source: SourceKind) -> Self {
        Self {
            source,
            pdf_file: None,
            file: None,
            path: None,
            module: None,
            chunk_id: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// One logical unit of corpus text before chunking.
///
/// Produced by the loaders; PDF documents go through the chunker, code
/// records pass through unchanged.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub content: String,
    pub meta: FragmentMeta,
}

/// The atomic retrievable unit stored in the collection.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub id: String,
    pub content: String,
    /// SHA-256 of the content, for change detection between builds.
    pub hash: String,
    pub meta: FragmentMeta,
}

impl Fragment {
    pub fn new(content: String, meta: FragmentMeta) -> Self {
        let hash = content_hash(&content);
        Self {
            id: Uuid::new_v4().to_string(),
            content,
            hash,
            meta,
        }
    }
}

/// Hex-encoded SHA-256 digest of fragment text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
