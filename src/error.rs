use std::path::PathBuf;

use thiserror::Error;

/// Failure classes of the build pipeline and query path.
///
/// Pipeline functions return `anyhow::Result` with one of these as the root
/// cause, so callers (and tests) can downcast to decide how a failure should
/// be handled. The CLI treats all of them as fatal and exits non-zero.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required corpus input is absent. Raised before any embedding work.
    #[error("required input not found: {0}")]
    MissingInput(PathBuf),

    /// Nothing survived loading: zero PDF documents and zero code records.
    #[error("corpus is empty: no PDF documents and no code records survived loading")]
    EmptyCorpus,

    /// An external backend call (embeddings or completion) failed after
    /// retries. Never skipped silently, since a partially embedded collection
    /// would corrupt retrieval quality without anyone noticing.
    #[error("backend call failed: {0}")]
    Backend(String),

    /// The collection storage layer failed (create/open/delete).
    #[error("storage error: {0}")]
    Storage(String),
}
