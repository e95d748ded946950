//! Prompt assembly and answer synthesis.
//!
//! The query path is deliberately thin: retrieve the top fragments, render
//! them into a fixed prompt with their provenance, and hand the result to
//! the completion backend. No caching, no re-ranking.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::embedding::EmbeddingBackend;
use crate::llm;
use crate::models::SourceKind;
use crate::search::{self, Hit};

const PROMPT_TEMPLATE: &str = "\
You are a technical assistant for a documented software product. Answer \
using ONLY the information in the CONTEXT below, which may contain \
source-code fragments and excerpts from PDF manuals. Do not invent behavior \
the context does not support. When the context includes code, explain its \
purpose and how it relates to the question. If the context is insufficient, \
say clearly what information is missing and what kind of document would help.

CONTEXT:
{context}

QUESTION:
{question}
";

/// Answer a free-text question against the persisted collection.
pub async fn answer_question(
    config: &Config,
    pool: &SqlitePool,
    backend: &dyn EmbeddingBackend,
    question: &str,
) -> Result<String> {
    let question = question.trim();
    if question.is_empty() {
        anyhow::bail!("question must not be empty");
    }

    let hits = search::top_fragments(pool, backend, question, config.qa.top_k).await?;
    let prompt = render_prompt(&hits, question);
    llm::complete(&config.llm, &prompt).await
}

fn render_prompt(hits: &[Hit], question: &str) -> String {
    PROMPT_TEMPLATE
        .replace("{context}", &render_context(hits))
        .replace("{question}", question)
}

// Each fragment is prefixed with its origin so the model can attribute what
// it quotes.
fn render_context(hits: &[Hit]) -> String {
    if hits.is_empty() {
        return "(no matching fragments)".to_string();
    }
    let mut out = String::new();
    for hit in hits {
        let origin = match hit.fragment.meta.source {
            SourceKind::Pdf => hit.fragment.meta.pdf_file.as_deref(),
            SourceKind::Code => hit.fragment.meta.file.as_deref(),
        }
        .unwrap_or("unknown");
        out.push_str(&format!(
            "[{} {}]\n{}\n\n",
            hit.fragment.meta.source.as_str(),
            origin,
            hit.fragment.content
        ));
    }
    out
}
