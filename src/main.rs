//! # Overview Study CLI (`overview-study`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `overview-study serve` | Start the study web server |
//! | `overview-study overview "<query>"` | Print the AI overview for a query |
//! | `overview-study corpus [--query Q]` | List corpus documents, optionally ranked |
//!
//! ## Examples
//!
//! ```bash
//! # Serve with defaults (./webpages, ./logs, port 8000)
//! GEMINI_API_KEY=... overview-study serve
//!
//! # Check what the model would be given for a query
//! overview-study --config ./study.toml corpus --query "climate policy"
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use overview_study::config::{self, Config};
use overview_study::corpus::load_corpus;
use overview_study::generation::create_backend;
use overview_study::overview::{generate_overview, rank_documents};
use overview_study::score::score_query;
use overview_study::server;

/// Overview Study: a research search page with a corpus-grounded AI overview.
///
/// Settings are read from an optional TOML file; `GEMINI_API_KEY`,
/// `ADMIN_PASSWORD`, `LOGS_DIR`, and `PORT` override it.
#[derive(Parser)]
#[command(name = "overview-study", version)]
struct Cli {
    /// Path to a configuration file (TOML). Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the study web server.
    Serve,

    /// Generate the AI overview for a query and print it with its sources.
    Overview {
        /// The search query.
        query: String,
    },

    /// List the documents loaded from the corpus directory.
    Corpus {
        /// Rank documents against this query and show their scores.
        #[arg(long)]
        query: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("overview_study=info,tower_http=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve => server::run_server(&cfg).await?,
        Commands::Overview { query } => run_overview(&cfg, &query).await?,
        Commands::Corpus { query } => run_corpus(&cfg, query.as_deref())?,
    }

    Ok(())
}

async fn run_overview(cfg: &Config, query: &str) -> Result<()> {
    let documents = load_corpus(&cfg.corpus)?;
    let backend = create_backend(&cfg.generation)?;
    let overview = generate_overview(query.trim(), &documents, backend.as_ref(), &cfg.overview).await;

    println!("{}", overview.text);
    if !overview.citations.is_empty() {
        println!();
        for c in &overview.citations {
            println!("[{}] {} ({})", c.index, c.title, c.href);
        }
    }
    Ok(())
}

fn run_corpus(cfg: &Config, query: Option<&str>) -> Result<()> {
    let documents = load_corpus(&cfg.corpus)?;
    if documents.is_empty() {
        println!("No documents in {}", cfg.corpus.dir.display());
        return Ok(());
    }

    match query {
        Some(q) => {
            println!("{:<6} {:<32} TITLE", "SCORE", "NAME");
            for doc in rank_documents(&documents, q, documents.len()) {
                println!("{:<6} {:<32} {}", score_query(&doc.text, q), doc.name, doc.title);
            }
        }
        None => {
            println!("{:<32} {:<8} {:<40} TITLE", "NAME", "CHARS", "HREF");
            for doc in &documents {
                println!(
                    "{:<32} {:<8} {:<40} {}",
                    doc.name,
                    doc.text.chars().count(),
                    doc.href,
                    doc.title
                );
            }
        }
    }
    println!("{} documents", documents.len());
    Ok(())
}
