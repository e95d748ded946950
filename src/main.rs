//! # docqa CLI
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa rebuild` | Destroy and re-ingest the vector collection |
//! | `docqa rebuild --reuse` | Build only if no collection exists yet |
//! | `docqa ask "<question>"` | Answer a question from the terminal |
//! | `docqa status` | Show collection counts and build provenance |
//! | `docqa serve` | Start the HTTP question-answering server |
//!
//! All commands take a `--config` flag pointing at a TOML file; see
//! `config/docqa.example.toml`. API keys (`OPENAI_API_KEY`,
//! `ANTHROPIC_API_KEY`) come from the environment or a `.env` file.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docqa::{config, embedding, index, qa, server, status, store};

/// Retrieval-augmented question answering over PDF manuals and
/// source-code fragments.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "Retrieval-augmented question answering over PDF manuals and source-code fragments",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the vector collection from the configured corpus.
    ///
    /// Loads every PDF and code record, chunks and embeds them, and writes
    /// a fresh collection. The existing collection is deleted first; a
    /// rebuild replaces, it never merges.
    Rebuild {
        /// Skip the rebuild when a non-empty collection already exists.
        #[arg(long)]
        reuse: bool,
    },

    /// Ask a question against the persisted collection.
    Ask {
        /// The question text.
        question: String,

        /// Number of fragments to retrieve (defaults to [qa].top_k).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Show fragment counts and build provenance for the collection.
    Status,

    /// Start the HTTP question-answering server.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Rebuild { reuse } => {
            let backend = embedding::create_backend(&cfg.embedding)?;
            if reuse {
                index::ensure(&cfg, backend.as_ref()).await?;
            } else {
                index::rebuild(&cfg, backend.as_ref()).await?;
            }
        }
        Commands::Ask { question, top_k } => {
            if let Some(k) = top_k {
                cfg.qa.top_k = k;
            }
            let backend = embedding::create_backend(&cfg.embedding)?;
            let pool = store::open_collection(&cfg).await?;
            let answer = qa::answer_question(&cfg, &pool, backend.as_ref(), &question).await?;
            pool.close().await;
            println!("{}", answer);
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
