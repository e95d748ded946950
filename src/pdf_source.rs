//! PDF corpus loader.
//!
//! Scans the configured path, a directory of manuals or a single file,
//! and produces one [`RawDocument`] per PDF, stamped with its originating
//! file name. Extraction granularity (whole document rather than per page)
//! follows what the extraction library provides; the chunker makes the
//! distinction irrelevant for retrieval.

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::models::{FragmentMeta, RawDocument, SourceKind};

/// Load every PDF under the corpus path.
///
/// A missing path yields an empty set rather than an error: a code-only
/// corpus is valid, and the rebuild decides whether the combined corpus is
/// empty. A PDF that cannot be parsed is an error; a PDF with no extractable
/// text is skipped with a warning.
pub fn load_pdfs(config: &Config) -> Result<Vec<RawDocument>> {
    let root = &config.corpus.pdf_dir;
    if !root.exists() {
        eprintln!(
            "Warning: PDF corpus path {} does not exist, continuing without PDFs",
            root.display()
        );
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    if root.is_dir() {
        for entry in std::fs::read_dir(root)
            .with_context(|| format!("failed to read PDF directory {}", root.display()))?
        {
            let path = entry?.path();
            if path.is_file() && has_pdf_extension(&path) {
                paths.push(path);
            }
        }
        // Directory order is platform-defined; sort for stable fragment order.
        paths.sort();
    } else {
        paths.push(root.clone());
    }

    let mut docs = Vec::new();
    for path in paths {
        let text = pdf_extract::extract_text(&path)
            .with_context(|| format!("failed to extract text from {}", path.display()))?;
        if text.trim().is_empty() {
            eprintln!("Warning: no text extracted from {}, skipping", path.display());
            continue;
        }
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut meta = FragmentMeta::new(SourceKind::Pdf);
        meta.pdf_file = Some(file_name);
        docs.push(RawDocument {
            content: text,
            meta,
        });
    }

    Ok(docs)
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}
