//! # Issue Dedupe CLI (`issue-dedupe`)
//!
//! Operator interface for the duplicate issue index: OpenSearch bootstrap,
//! bulk indexing, single lookups, batch audits and the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! issue-dedupe --config ./config/dedupe.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `issue-dedupe init-opensearch` | Upload and load the model, create pipeline and index |
//! | `issue-dedupe load-model` | Reload the model after a cluster restart |
//! | `issue-dedupe create-index` | Create the configured index |
//! | `issue-dedupe index <source>` | Index downloaded payloads (`github`, `stack-overflow`) |
//! | `issue-dedupe search "<title>"` | Find duplicates of a new issue |
//! | `issue-dedupe search-id <id>` | Find duplicates of an indexed document |
//! | `issue-dedupe dry-run` | Audit open issues for likely duplicates |
//! | `issue-dedupe test` | Replay the labeled duplicate corpus |
//! | `issue-dedupe serve` | Start the HTTP API |

use clap::{Parser, Subcommand, ValueEnum};
use issue_dedupe::{acceptance, admin, config, dry_run, index_cmd, logging, search, server};
use issue_dedupe_core::models::{SearchFilter, Source};
use std::path::PathBuf;
use tracing::error;

/// Issue Dedupe CLI: duplicate issue detection over an OpenSearch neural
/// index.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/dedupe.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "issue-dedupe",
    about = "Duplicate issue detection over an OpenSearch neural index",
    version,
    long_about = "Issue Dedupe indexes issues, pull requests and questions from several sources \
    into OpenSearch and finds likely duplicates with weighted semantic similarity queries, \
    from the command line, in batch audits, or through a JSON HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dedupe.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum IndexSource {
    Github,
    StackOverflow,
}

impl From<IndexSource> for Source {
    fn from(source: IndexSource) -> Self {
        match source {
            IndexSource::Github => Source::Github,
            IndexSource::StackOverflow => Source::StackOverflow,
        }
    }
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create the OpenSearch model, ingest pipeline and index.
    ///
    /// Uploads the sentence embedding model, waits for the upload task,
    /// loads the model, then creates the embedding pipeline and the index.
    InitOpensearch,

    /// Load the ML model, e.g. after a cluster restart.
    LoadModel,

    /// Create the configured index.
    CreateIndex,

    /// Index downloaded source payloads.
    ///
    /// Reads one JSON payload per file from the source directory and
    /// upserts every item. Re-indexing overwrites.
    Index {
        source: IndexSource,

        /// Payload directory. Defaults to `./github` or `./stack-overflow`.
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Concurrent upserts. Defaults to `[batch].index_concurrency`.
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Audit open documents of one source for likely duplicates.
    DryRun {
        /// Source tag to audit.
        #[arg(long)]
        source: Option<String>,

        /// Maximum number of open documents to scan.
        #[arg(long)]
        page_size: Option<usize>,

        /// Concurrent searches. Defaults to `[batch].search_concurrency`.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Report threshold. Defaults to `[scoring].audit_min_score`.
        #[arg(long)]
        min_score: Option<f64>,
    },

    /// Replay the labeled duplicate corpus and report ranking mismatches.
    ///
    /// Exits non-zero when any expected match is missing or any unexpected
    /// match is found.
    Test {
        /// Corpus directory.
        #[arg(long, default_value = "duplicates")]
        dir: PathBuf,

        /// Concurrent searches. Defaults to `[batch].search_concurrency`.
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Find duplicates of a new issue.
    Search {
        title: String,

        #[arg(long)]
        description: Option<String>,

        /// Only match documents from this source.
        #[arg(long)]
        source: Option<String>,

        /// Only match public documents.
        #[arg(long)]
        only_public: bool,

        /// Document id to leave out of the results.
        #[arg(long)]
        exclude: Option<String>,
    },

    /// Find duplicates of an indexed document.
    SearchId { id: String },

    /// Start the HTTP API.
    ///
    /// Binds to the address configured in `[server].bind`.
    Serve,
}

async fn run(command: Commands, cfg: &config::Config) -> anyhow::Result<()> {
    match command {
        Commands::InitOpensearch => admin::run_init(cfg).await?,
        Commands::LoadModel => admin::run_load_model(cfg).await?,
        Commands::CreateIndex => admin::run_create_index(cfg).await?,
        Commands::Index {
            source,
            dir,
            concurrency,
        } => {
            index_cmd::run_index(cfg, source.into(), dir, concurrency).await?;
        }
        Commands::DryRun {
            source,
            page_size,
            concurrency,
            min_score,
        } => {
            dry_run::run_dry_run(cfg, source, page_size, concurrency, min_score).await?;
        }
        Commands::Test { dir, concurrency } => {
            acceptance::run_acceptance(cfg, dir, concurrency).await?;
        }
        Commands::Search {
            title,
            description,
            source,
            only_public,
            exclude,
        } => {
            let filter = SearchFilter {
                excluded_document_id: exclude,
                source,
                only_public,
            };
            search::run_search(cfg, &title, description, filter).await?;
        }
        Commands::SearchId { id } => {
            search::run_search_id(cfg, &id, SearchFilter::default()).await?;
        }
        Commands::Serve => server::run_server(cfg).await?,
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging)?;

    if let Err(e) = run(cli.command, &cfg).await {
        error!(error = %format!("{:#}", e), "command failed");
        return Err(e);
    }

    Ok(())
}
