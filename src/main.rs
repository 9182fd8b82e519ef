//! LoreVault - versioned knowledge artifact store
//!
//! Operator commands for inspecting and querying a LoreVault data directory.

use anyhow::Result;
use clap::{Parser, Subcommand};
use lorevault::{
    config::LoreVaultConfig,
    retrieval::RetrievalContext,
    service::KnowledgeService,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "lorevault")]
#[command(version)]
#[command(about = "Versioned knowledge artifact store with ranked retrieval")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "LOREVAULT_CONFIG")]
    config: Option<PathBuf>,

    /// Artifact data directory (overrides the configuration file)
    #[arg(short, long, env = "LOREVAULT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },

    /// Show store, index and proposal counters
    Stats,

    /// Re-check every artifact checksum
    Verify,

    /// Search artifacts
    Search {
        /// Query text
        query: String,

        /// Restrict to a domain
        #[arg(long)]
        domain: Option<String>,

        /// Maximum number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// List artifacts, most recently updated first
    List {
        /// Restrict to a domain
        #[arg(long)]
        domain: Option<String>,

        /// Include archived artifacts
        #[arg(long)]
        include_archived: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("lorevault={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => LoreVaultConfig::load(path)?,
        None => LoreVaultConfig::default(),
    };
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.storage.data_dir_or_default());
    config.storage.data_dir = Some(data_dir);

    match cli.command {
        Commands::Config { default } => {
            show_config(if default { None } else { Some(&config) })?;
        }
        Commands::Stats => {
            let service = KnowledgeService::open(config).await?;
            println!("{}", serde_json::to_string_pretty(&service.stats().await)?);
        }
        Commands::Verify => {
            run_verify(config).await?;
        }
        Commands::Search {
            query,
            domain,
            limit,
        } => {
            run_search(config, &query, domain, limit).await?;
        }
        Commands::List {
            domain,
            include_archived,
        } => {
            run_list(config, domain, include_archived).await?;
        }
    }

    Ok(())
}

async fn run_verify(config: LoreVaultConfig) -> Result<()> {
    // Loading already verifies every record and fails on the first mismatch.
    let service = KnowledgeService::open(config).await?;
    let corrupted = service.store().verify_integrity().await;
    if corrupted.is_empty() {
        println!("✓ {} artifacts verified", service.store().len().await);
        return Ok(());
    }
    for id in &corrupted {
        println!("✗ {}", id);
    }
    anyhow::bail!("{} corrupted artifacts", corrupted.len())
}

async fn run_search(config: LoreVaultConfig, query: &str, domain: Option<String>, limit: usize) -> Result<()> {
    let service = KnowledgeService::open(config).await?;
    let mut context = RetrievalContext::new();
    context.domain = domain;

    let results = service.retriever().retrieve(query, &context, limit).await?;
    if results.is_empty() {
        println!("No results for '{}'", query);
        return Ok(());
    }
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. {} [{}] {:.4} {}",
            rank + 1,
            result.artifact.title,
            result.artifact.knowledge_type,
            result.relevance,
            result.artifact.id
        );
        println!("   {}", result.explanation);
        for highlight in &result.highlights {
            println!("   > {}", highlight);
        }
    }
    Ok(())
}

async fn run_list(config: LoreVaultConfig, domain: Option<String>, include_archived: bool) -> Result<()> {
    let service = KnowledgeService::open(config).await?;
    let summaries = service.store().list_summaries(include_archived, None).await;
    let domain = domain.map(|d| d.to_lowercase());

    for summary in summaries
        .iter()
        .filter(|s| domain.as_ref().map_or(true, |d| s.domain.to_lowercase() == *d))
    {
        println!(
            "{}  {:<10} {:<8} v{:<8} {:>6} uses  {}",
            summary.id,
            summary.knowledge_type,
            summary.status,
            summary.version,
            summary.usage_count,
            summary.title
        );
    }
    Ok(())
}

fn show_config(config: Option<&LoreVaultConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    println!("{}", config.to_toml()?);
    Ok(())
}
