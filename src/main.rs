use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use table_memory::commands::{
    CommandOptions, clear_snapshot, estimate_snapshot, list_chats, ping, rebuild_snapshot,
    search_snapshot, show_stats, sync_snapshot,
};
use table_memory::config::{run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "table-memory")]
#[command(about = "Semantic memory for chat tables: embed table rows and search them by meaning")]
#[command(version)]
struct Cli {
    /// API key for the embedding service, overriding the configuration file
    #[arg(long, global = true, env = "TABLE_MEMORY_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding API and search defaults
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Test the connection to the embedding API
    Ping,
    /// Vectorize every enabled table of a chat snapshot
    Sync {
        /// Chat snapshot JSON file
        snapshot: PathBuf,
    },
    /// Drop all vectors of a chat and vectorize its tables again
    Rebuild {
        /// Chat snapshot JSON file
        snapshot: PathBuf,
    },
    /// Search the rows of a chat by meaning
    Search {
        /// Chat snapshot JSON file
        snapshot: PathBuf,
        /// Text to search for
        query: String,
        /// Maximum number of results (defaults to the configured value)
        #[arg(long)]
        top_k: Option<usize>,
        /// Only search rows of this table (name or uid)
        #[arg(long)]
        table: Option<String>,
    },
    /// Show what is stored for a chat
    Stats {
        /// Chat snapshot JSON file
        snapshot: PathBuf,
    },
    /// Remove all stored vectors of a chat
    Clear {
        /// Chat snapshot JSON file
        snapshot: PathBuf,
    },
    /// Estimate tokens and cost of vectorizing a chat snapshot
    Estimate {
        /// Chat snapshot JSON file
        snapshot: PathBuf,
    },
    /// List chats with stored vectors
    Chats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let options = CommandOptions {
        api_key: cli.api_key,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config().await?;
            }
        }
        Commands::Ping => {
            ping(&options).await?;
        }
        Commands::Sync { snapshot } => {
            sync_snapshot(&snapshot, &options).await?;
        }
        Commands::Rebuild { snapshot } => {
            rebuild_snapshot(&snapshot, &options).await?;
        }
        Commands::Search {
            snapshot,
            query,
            top_k,
            table,
        } => {
            search_snapshot(&snapshot, &query, top_k, table.as_deref(), &options).await?;
        }
        Commands::Stats { snapshot } => {
            show_stats(&snapshot).await?;
        }
        Commands::Clear { snapshot } => {
            clear_snapshot(&snapshot).await?;
        }
        Commands::Estimate { snapshot } => {
            estimate_snapshot(&snapshot)?;
        }
        Commands::Chats => {
            list_chats().await?;
        }
    }

    Ok(())
}
