use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::database::{CollectionStore, SqliteCollectionStore, StoredCollection};
use crate::embeddings::{EmbeddingClient, estimate_cost};
use crate::memory::{VectorMemory, VectorizeOutcome, VectorizeReport};
use crate::tables::{ChatSnapshot, ConversationContext, TableSource, row_text};

/// Settings shared by every command that talks to the embedding API
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    /// Overrides the API key from the configuration file
    pub api_key: Option<String>,
}

fn load_config(options: &CommandOptions) -> Result<Config> {
    let mut config = Config::load_default().context("Failed to load configuration")?;
    if let Some(api_key) = options.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
        config.embedding.api_key = api_key.trim().to_string();
    }
    Ok(config)
}

async fn open_store(config: &Config) -> Result<Arc<SqliteCollectionStore>> {
    let store = SqliteCollectionStore::connect(config.database_path())
        .await
        .context("Failed to open vector database")?;
    Ok(Arc::new(store))
}

fn load_snapshot(path: &Path) -> Result<Arc<ChatSnapshot>> {
    Ok(Arc::new(ChatSnapshot::load(path)?))
}

fn snapshot_chat_id(snapshot: &ChatSnapshot) -> Result<String> {
    match snapshot
        .identity()
        .and_then(|identity| identity.collection_key())
    {
        Some(chat_id) => Ok(chat_id),
        None => bail!("Snapshot has no conversation with a chat id"),
    }
}

async fn open_memory(
    config: &Config,
    snapshot: Arc<ChatSnapshot>,
    auto_vectorize: bool,
) -> Result<VectorMemory> {
    let store = open_store(config).await?;
    let memory = VectorMemory::new(store, snapshot.clone(), snapshot)
        .with_auto_vectorize(auto_vectorize);

    memory
        .init(config.embedding.clone())
        .await
        .context("Failed to initialize vector memory")?;

    Ok(memory)
}

fn print_report(outcome: &VectorizeOutcome) {
    match outcome {
        VectorizeOutcome::AlreadyRunning => {
            println!("Vectorization is already running.");
        }
        VectorizeOutcome::Completed(VectorizeReport {
            tables_vectorized,
            tables_skipped,
            tables_failed,
            rows_vectorized,
        }) => {
            println!("Vectorization completed!");
            println!("  Tables vectorized: {}", tables_vectorized);
            println!("  Rows vectorized: {}", rows_vectorized);
            println!("  Empty tables skipped: {}", tables_skipped);
            if *tables_failed > 0 {
                println!("  Failed tables: {} (see log for details)", tables_failed);
            }
        }
    }
}

/// Check that the embedding API answers with the configured credentials
#[inline]
pub async fn ping(options: &CommandOptions) -> Result<()> {
    let config = load_config(options)?;
    if !config.embedding.has_api_key() {
        bail!("No API key configured. Run 'table-memory config' or set TABLE_MEMORY_API_KEY.");
    }

    let client = EmbeddingClient::new(config.embedding.clone())?;
    println!("Testing {} ({})...", config.embedding.api_url, config.embedding.model);

    if client.test_connection().await {
        println!("✓ Embedding API reachable");
        Ok(())
    } else {
        bail!("Embedding API is not reachable; see log for details")
    }
}

/// Vectorize every enabled table of a snapshot into its conversation's collection
#[inline]
pub async fn sync_snapshot(snapshot_path: &Path, options: &CommandOptions) -> Result<()> {
    let config = load_config(options)?;
    let snapshot = load_snapshot(snapshot_path)?;
    let chat_id = snapshot_chat_id(&snapshot)?;

    info!("Syncing {} into {}", snapshot_path.display(), chat_id);
    let memory = open_memory(&config, snapshot, false).await?;

    let outcome = memory.vectorize_all_tables().await?;
    print_report(&outcome);
    let stats = memory.get_stats().await;
    println!("Collection {} now holds {} vectors", chat_id, stats.total_vectors);

    Ok(())
}

/// Drop the conversation's vectors and vectorize all tables from scratch
#[inline]
pub async fn rebuild_snapshot(snapshot_path: &Path, options: &CommandOptions) -> Result<()> {
    let config = load_config(options)?;
    let snapshot = load_snapshot(snapshot_path)?;
    let chat_id = snapshot_chat_id(&snapshot)?;

    info!("Rebuilding collection {}", chat_id);
    let memory = open_memory(&config, snapshot, false).await?;

    let outcome = memory.rebuild_all().await?;
    print_report(&outcome);

    Ok(())
}

/// Search a conversation's collection and print the hits above the configured
/// minimum score
#[inline]
pub async fn search_snapshot(
    snapshot_path: &Path,
    query: &str,
    top_k: Option<usize>,
    table: Option<&str>,
    options: &CommandOptions,
) -> Result<()> {
    let config = load_config(options)?;
    let snapshot = load_snapshot(snapshot_path)?;
    snapshot_chat_id(&snapshot)?;

    let top_k = top_k.unwrap_or(config.search.top_k);
    if top_k == 0 {
        bail!("--top-k must be at least 1");
    }

    let memory = open_memory(&config, snapshot, config.vectorization.auto_vectorize).await?;

    let hits = match table {
        Some(table) => {
            memory
                .search_filtered(query, top_k, |meta| {
                    meta.table_name == table || meta.table_uid == table
                })
                .await?
        }
        None => memory.search(query, top_k).await?,
    };

    let min_score = config.search.min_score;
    let relevant: Vec<_> = hits.into_iter().filter(|hit| hit.score >= min_score).collect();

    if relevant.is_empty() {
        println!("No rows matched '{}' (minimum score {:.2}).", query, min_score);
        return Ok(());
    }

    println!("Results for '{}':", query);
    println!();
    for (rank, hit) in relevant.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} row {}",
            rank + 1,
            hit.score,
            hit.metadata.table_name,
            hit.metadata.row_index
        );
        println!(
            "   {}",
            row_text(
                &hit.metadata.table_name,
                &hit.metadata.headers,
                &hit.metadata.values,
                hit.metadata.row_index
            )
        );
    }

    Ok(())
}

/// Show the stored collection of a snapshot's conversation, without network access
#[inline]
pub async fn show_stats(snapshot_path: &Path) -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let snapshot = load_snapshot(snapshot_path)?;
    let chat_id = snapshot_chat_id(&snapshot)?;
    let store = open_store(&config).await?;

    let Some(collection) = store.get(&chat_id).await? else {
        println!("No vectors stored for {}.", chat_id);
        println!("Use 'table-memory sync <snapshot>' to vectorize its tables.");
        return Ok(());
    };

    let mut groups: BTreeMap<&str, usize> = BTreeMap::new();
    for record in &collection.vectors {
        *groups.entry(record.metadata.table_name.as_str()).or_insert(0) += 1;
    }

    println!("📊 Collection {}", chat_id);
    println!("   Vectors: {}", collection.vectors.len());
    println!("   Last update: {}", collection.last_update.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("   Format version: {}", collection.version);
    if let Some(dimension) = collection.vectors.first().map(|r| r.vector.len()) {
        println!("   Dimensions: {}", dimension);
    }

    if !groups.is_empty() {
        println!();
        println!("   Per table:");
        for (table, count) in groups {
            println!("     {}: {}", table, count);
        }
    }

    Ok(())
}

/// Replace the stored collection of a snapshot's conversation with an empty one
#[inline]
pub async fn clear_snapshot(snapshot_path: &Path) -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let snapshot = load_snapshot(snapshot_path)?;
    let chat_id = snapshot_chat_id(&snapshot)?;
    let store = open_store(&config).await?;

    store
        .put(&StoredCollection::new(chat_id.clone(), Vec::new()))
        .await
        .context("Failed to clear collection")?;

    println!("Cleared all vectors of {}", chat_id);
    Ok(())
}

/// Estimate tokens and cost of vectorizing a snapshot, without network access
#[inline]
pub fn estimate_snapshot(snapshot_path: &Path) -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let snapshot = ChatSnapshot::load(snapshot_path)?;

    let texts: Vec<String> = snapshot
        .sheets()
        .filter(|sheet| sheet.enabled())
        .flat_map(|sheet| {
            let header = sheet.header();
            sheet
                .body()
                .into_iter()
                .enumerate()
                .map(move |(index, values)| row_text(sheet.name(), &header, &values, index))
        })
        .collect();

    let estimate = estimate_cost(&texts, config.embedding.cost_per_million_tokens);

    println!("Vectorization estimate for {}:", snapshot_path.display());
    println!("  Rows: {}", estimate.total_texts);
    println!("  Tokens (approx.): {}", estimate.total_tokens);
    println!(
        "  Cost (approx.): {:.6} {}",
        estimate.estimated_cost, estimate.currency
    );

    Ok(())
}

/// List every persisted collection
#[inline]
pub async fn list_chats() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let store = open_store(&config).await?;

    let collections = store
        .list_collections()
        .await
        .context("Failed to list collections")?;

    if collections.is_empty() {
        println!("No conversations have been vectorized yet.");
        return Ok(());
    }

    println!("Vectorized Conversations ({} total):", collections.len());
    println!();
    for summary in &collections {
        println!("💬 {}", summary.chat_id);
        println!("   Vectors: {}", summary.vector_count);
        println!(
            "   Last update: {}",
            summary.last_update.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    Ok(())
}
