// ============================================================================
// ltm — command-line access to a long-term memory collection
// ============================================================================
// Usage:
//   ltm store "Went hiking" --people Alice --emotions happy
//   ltm recall "outdoor activity"                Semantic recall
//   ltm recent --hours 6                         Memories from the last N hours
//   ltm delete <UUID>                            Remove one memory
//   ltm drop-collection --yes                    Destroy the whole collection
//   ltm stats                                    Collection size and health
// ============================================================================

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use ltm_core::memory::parse_datetime;
use ltm_core::{HashingEmbedder, LtmConfig, MemoryDoc, MemoryStore, QdrantIndex};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Long-term memory store for conversational personas
#[derive(Parser)]
#[command(name = "ltm", version, about = "Store and recall long-term memories")]
struct Cli {
    #[command(flatten)]
    overrides: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// JSON config file (defaults, then this file, then LTM_* env vars, then flags)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Collection name
    #[arg(long, global = true)]
    collection: Option<String>,

    /// Maximum number of distinct memories returned by recall
    #[arg(long, global = true)]
    limit: Option<usize>,

    /// Embedding model name (e.g. all-MiniLM-L6-v2)
    #[arg(long, global = true)]
    embedder: Option<String>,

    /// Qdrant host or URL
    #[arg(long, global = true)]
    address: Option<String>,

    /// Qdrant gRPC port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Compute device hint for embeddings
    #[arg(long, global = true)]
    device: Option<String>,

    /// Directory holding downloaded embedding models
    #[arg(long, global = true)]
    model_cache_dir: Option<PathBuf>,

    /// Verbose diagnostic logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use the built-in hashing embedder instead of downloading a model
    #[arg(long, global = true)]
    offline: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a new memory
    Store {
        /// Memory text
        comment: String,

        /// Participants
        #[arg(long, default_value = "")]
        people: String,

        /// Emotions
        #[arg(long, default_value = "")]
        emotions: String,

        /// Timestamp (YYYY-MM-DDTHH:MM:SS.ffffff), defaults to now
        #[arg(long)]
        datetime: Option<String>,
    },

    /// Recall memories related to a query
    Recall {
        query: String,

        /// Print results as a JSON array
        #[arg(long)]
        json: bool,
    },

    /// List memories from the last N hours
    Recent {
        #[arg(long, default_value = "24")]
        hours: u32,

        /// Print results as a JSON array
        #[arg(long)]
        json: bool,
    },

    /// Delete a single memory by id
    Delete { id: Uuid },

    /// Delete the entire collection
    DropCollection {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Show collection statistics
    Stats,
}

fn resolve_config(args: &ConfigArgs) -> Result<LtmConfig> {
    let base = match &args.config {
        Some(path) => LtmConfig::from_json_file(path)?,
        None => LtmConfig::default(),
    };
    let config = apply_flags(base.with_env(), args);
    config.validate()?;
    Ok(config)
}

/// Overlay command-line flags on an already layered config
fn apply_flags(mut config: LtmConfig, args: &ConfigArgs) -> LtmConfig {
    if let Some(v) = &args.collection {
        config.collection = v.clone();
    }
    if let Some(v) = args.limit {
        config.ltm_limit = v;
    }
    if let Some(v) = &args.embedder {
        config.embedder = v.clone();
    }
    if let Some(v) = &args.address {
        config.address = v.clone();
    }
    if let Some(v) = args.port {
        config.port = v;
    }
    if let Some(v) = &args.device {
        config.device = v.clone();
    }
    if let Some(v) = &args.model_cache_dir {
        config.model_cache_dir = v.clone();
    }
    if args.verbose {
        config.verbose = true;
    }
    config
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("ltm_core={}", level).parse()?)
                .add_directive(format!("ltm={}", level).parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn open_store(config: LtmConfig, offline: bool) -> Result<MemoryStore> {
    if offline {
        let index = QdrantIndex::connect(&config.qdrant_url(), &config.collection)?;
        MemoryStore::new(config, Box::new(HashingEmbedder::default()), Box::new(index)).await
    } else {
        MemoryStore::connect(config).await
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
    }

    let cli = Cli::parse();
    let config = resolve_config(&cli.overrides)?;
    init_logging(config.verbose)?;

    let store = open_store(config, cli.overrides.offline).await?;
    debug!("Opened memory store ({})", store);

    match cli.command {
        Commands::Store {
            comment,
            people,
            emotions,
            datetime,
        } => cmd_store(&store, comment, people, emotions, datetime).await,
        Commands::Recall { query, json } => {
            let results = store.recall(&query).await?;
            print_results(&results, json)
        }
        Commands::Recent { hours, json } => {
            let results = store.get_last_summaries(hours).await?;
            print_results(&results, json)
        }
        Commands::Delete { id } => {
            store.delete(&id).await?;
            println!("Deleted {}", id);
            Ok(())
        }
        Commands::DropCollection { yes } => {
            if !yes {
                anyhow::bail!(
                    "Refusing to delete collection '{}' without --yes",
                    store.config().collection
                );
            }
            store.delete_collection().await?;
            println!("Deleted collection {}", store.config().collection);
            Ok(())
        }
        Commands::Stats => cmd_stats(&store).await,
    }
}

async fn cmd_store(
    store: &MemoryStore,
    comment: String,
    people: String,
    emotions: String,
    datetime: Option<String>,
) -> Result<()> {
    let doc = match datetime {
        Some(dt) => {
            parse_datetime(&dt)?;
            MemoryDoc::new(comment, people, emotions, dt)
        }
        None => MemoryDoc::now(comment, people, emotions),
    };

    let id = store.store(doc).await?;
    println!("{}", id);
    Ok(())
}

async fn cmd_stats(store: &MemoryStore) -> Result<()> {
    let healthy = store.health_check().await?;

    println!("=== LTM Collection Stats ===");
    println!("{}", store);
    println!();
    println!("Healthy:   {}", healthy);
    if healthy {
        println!("Memories:  {}", store.len().await?);
    }
    println!("Dimension: {}", store.dimension());
    println!("Limit:     {}", store.config().ltm_limit);

    Ok(())
}

fn print_results(results: &[String], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No memories found.");
        return Ok(());
    }

    for line in results {
        println!("- {}", line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "ltm",
            "--collection",
            "persona_bob",
            "--limit",
            "3",
            "--port",
            "7000",
            "recall",
            "hiking",
        ])
        .unwrap();

        let config = apply_flags(LtmConfig::default(), &cli.overrides);
        assert_eq!(config.collection, "persona_bob");
        assert_eq!(config.ltm_limit, 3);
        assert_eq!(config.port, 7000);
        assert_eq!(config.address, LtmConfig::default().address);
        assert!(!config.verbose);
        assert!(matches!(cli.command, Commands::Recall { .. }));
    }

    #[test]
    fn test_unset_flags_keep_base() {
        let base = LtmConfig {
            collection: "from_file".to_string(),
            address: "qdrant.internal".to_string(),
            ltm_limit: 9,
            ..LtmConfig::default()
        };
        let args = ConfigArgs {
            verbose: true,
            ..ConfigArgs::default()
        };

        let config = apply_flags(base, &args);
        assert_eq!(config.collection, "from_file");
        assert_eq!(config.address, "qdrant.internal");
        assert_eq!(config.ltm_limit, 9);
        assert!(config.verbose);
    }

    #[test]
    fn test_invalid_limit_rejected() {
        let args = ConfigArgs {
            collection: Some("persona_bob".to_string()),
            limit: Some(0),
            ..ConfigArgs::default()
        };
        assert!(apply_flags(LtmConfig::default(), &args).validate().is_err());
    }

    #[test]
    fn test_delete_requires_uuid() {
        assert!(Cli::try_parse_from(["ltm", "delete", "not-a-uuid"]).is_err());
        let id = Uuid::new_v4().to_string();
        assert!(Cli::try_parse_from(["ltm", "delete", id.as_str()]).is_ok());
    }
}
