use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "prism-aggs")]
#[command(about = "Run bucket aggregations over a Tantivy index")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search an index and print hits and aggregations as JSON
    Run {
        /// Tantivy index directory
        #[arg(short, long)]
        index: PathBuf,

        /// Aggregations file (.yaml, .toml or .json)
        #[arg(short, long)]
        aggs: PathBuf,

        /// Query in Tantivy syntax, all documents when omitted
        #[arg(short, long)]
        query: Option<String>,

        /// Number of ranked hits to return
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Print compact JSON
        #[arg(long)]
        compact: bool,
    },

    /// Check an aggregations file against an index without searching
    Validate {
        /// Tantivy index directory
        #[arg(short, long)]
        index: PathBuf,

        /// Aggregations file (.yaml, .toml or .json)
        #[arg(short, long)]
        aggs: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            index,
            aggs,
            query,
            limit,
            compact,
        } => {
            tracing::info!("Running aggregations {:?} on {:?}", aggs, index);
            commands::run_search(&index, &aggs, query.as_deref(), limit, compact)?;
        }
        Commands::Validate { index, aggs } => {
            tracing::info!("Validating aggregations {:?} against {:?}", aggs, index);
            commands::run_validate(&index, &aggs)?;
        }
    }

    Ok(())
}
