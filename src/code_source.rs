//! Loader for pre-chunked code fragments.
//!
//! The input is a JSON array of records produced by an upstream extraction
//! pipeline, each with an `id`, a `content` body, and an open metadata map.
//! Records arrive already chunked, so they bypass the splitter entirely.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::config::Config;
use crate::error::PipelineError;
use crate::models::{FragmentMeta, RawDocument, SourceKind};

#[derive(Debug, Deserialize)]
struct CodeRecord {
    #[serde(default)]
    id: serde_json::Value,
    #[serde(default)]
    content: String,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

/// Load the code-chunks file into raw documents, one per record.
///
/// The file is a required input: its absence fails the whole rebuild with
/// [`PipelineError::MissingInput`] before any embedding work starts.
/// Records whose content is empty or whitespace-only are dropped.
pub fn load_code_chunks(config: &Config) -> Result<Vec<RawDocument>> {
    let path = &config.corpus.code_chunks;
    if !path.exists() {
        return Err(PipelineError::MissingInput(path.clone()).into());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let records: Vec<CodeRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    Ok(records_to_docs(records))
}

fn records_to_docs(records: Vec<CodeRecord>) -> Vec<RawDocument> {
    let mut docs = Vec::new();
    for record in records {
        let content = record.content.trim();
        if content.is_empty() {
            continue;
        }

        let mut meta = FragmentMeta::new(SourceKind::Code);
        meta.chunk_id = id_as_text(&record.id);
        let mut extra = record.metadata;
        meta.file = take_string(&mut extra, "file");
        meta.path = take_string(&mut extra, "path");
        meta.module = take_string(&mut extra, "module");
        meta.extra = extra;

        docs.push(RawDocument {
            content: content.to_string(),
            meta,
        });
    }
    docs
}

// Lift a well-known key out of the open metadata map.
fn take_string(
    map: &mut serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Option<String> {
    match map.remove(key) {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    }
}

// Record ids are opaque; integers and strings both occur in real inputs.
fn id_as_text(id: &serde_json::Value) -> Option<String> {
    match id {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
