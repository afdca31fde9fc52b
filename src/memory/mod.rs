// Memory module
// Owns the vector collection of the active conversation: loading and persisting
// it, bulk vectorization of tables, and similarity search


use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, EmbeddingConfig, EmbeddingConfigUpdate};
use crate::database::{COLLECTION_SCHEMA_VERSION, CollectionStore, RowMetadata, StoredCollection, VectorRecord};
use crate::embeddings::{EmbeddingClient, HttpTransport};
use crate::tables::{ConversationContext, TableProvider, TableSource, row_text, row_vector_id};
use crate::vector_math::{Candidate, rank_by_similarity};
use crate::{MemoryError, Result};

/// Lifecycle of a [`VectorMemory`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    Uninitialized,
    Initializing,
    Ready,
}

/// One search result
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub metadata: RowMetadata,
}

/// Read-only diagnostic view of the memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryStats {
    pub total_vectors: usize,
    /// Vector count per table name
    pub table_groups: BTreeMap<String, usize>,
    pub chat_id: Option<String>,
    pub is_initialized: bool,
    pub is_vectorizing: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorizeReport {
    pub tables_vectorized: usize,
    pub tables_skipped: usize,
    pub tables_failed: usize,
    pub rows_vectorized: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VectorizeOutcome {
    /// Another bulk vectorization was already running; nothing was done
    AlreadyRunning,
    Completed(VectorizeReport),
}

#[derive(Debug)]
struct CollectionState {
    init: InitState,
    chat_id: Option<String>,
    vectors: Vec<VectorRecord>,
}

/// Clears the single-flight flag when the bulk pass ends, however it ends
struct VectorizingGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for VectorizingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Semantic memory for the tables of the active conversation.
///
/// Exactly one conversation's collection is resident at a time. Every
/// operation goes through this object; the collection is never handed out
/// by reference.
pub struct VectorMemory {
    store: Arc<dyn CollectionStore>,
    tables: Arc<dyn TableProvider>,
    conversation: Arc<dyn ConversationContext>,
    transport: Option<Arc<dyn HttpTransport>>,
    auto_vectorize: bool,
    init_lock: Mutex<()>,
    client: RwLock<Option<Arc<EmbeddingClient>>>,
    state: RwLock<CollectionState>,
    vectorizing: AtomicBool,
}

impl VectorMemory {
    #[inline]
    pub fn new(
        store: Arc<dyn CollectionStore>,
        tables: Arc<dyn TableProvider>,
        conversation: Arc<dyn ConversationContext>,
    ) -> Self {
        Self {
            store,
            tables,
            conversation,
            transport: None,
            auto_vectorize: true,
            init_lock: Mutex::new(()),
            client: RwLock::new(None),
            state: RwLock::new(CollectionState {
                init: InitState::Uninitialized,
                chat_id: None,
                vectors: Vec::new(),
            }),
            vectorizing: AtomicBool::new(false),
        }
    }

    /// Use `transport` instead of the default HTTP agent for embedding requests
    #[inline]
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Whether a conversation without stored vectors is vectorized on load
    #[inline]
    pub fn with_auto_vectorize(mut self, auto_vectorize: bool) -> Self {
        self.auto_vectorize = auto_vectorize;
        self
    }

    /// Connect to the embedding API, open the store and load the current
    /// conversation. Calling it again once ready does nothing.
    #[inline]
    pub async fn init(&self, config: EmbeddingConfig) -> Result<()> {
        let _init = self.init_lock.lock().await;

        if self.state.read().await.init == InitState::Ready {
            debug!("Vector memory already initialized");
            return Ok(());
        }

        self.state.write().await.init = InitState::Initializing;

        match self.initialize(config).await {
            Ok(()) => {
                self.state.write().await.init = InitState::Ready;
                info!("Vector memory initialized");
                Ok(())
            }
            Err(e) => {
                *self.client.write().await = None;
                let mut state = self.state.write().await;
                state.init = InitState::Uninitialized;
                state.chat_id = None;
                state.vectors.clear();
                error!("Vector memory initialization failed: {}", e);
                Err(e)
            }
        }
    }

    async fn initialize(&self, config: EmbeddingConfig) -> Result<()> {
        if !config.has_api_key() {
            return Err(ConfigError::MissingApiKey.into());
        }

        let client = match &self.transport {
            Some(transport) => EmbeddingClient::with_transport(config, Arc::clone(transport))?,
            None => EmbeddingClient::new(config)?,
        };

        if !client.test_connection().await {
            return Err(MemoryError::Network(
                "Embedding API connection test failed".to_string(),
            ));
        }

        *self.client.write().await = Some(Arc::new(client));

        self.store.open().await?;
        self.load_current_chat().await
    }

    #[inline]
    pub async fn init_state(&self) -> InitState {
        self.state.read().await.init
    }

    #[inline]
    pub async fn is_initialized(&self) -> bool {
        self.init_state().await == InitState::Ready
    }

    /// Collection key of the active conversation, `None` without a conversation
    #[inline]
    pub fn current_chat_id(&self) -> Option<String> {
        self.conversation
            .identity()
            .and_then(|identity| identity.collection_key())
    }

    /// Replace the resident collection with the stored one for the current
    /// conversation. A conversation seen for the first time starts empty and,
    /// with auto vectorization on, gets all enabled tables vectorized.
    #[inline]
    pub async fn load_current_chat(&self) -> Result<()> {
        let Some(chat_id) = self.current_chat_id() else {
            warn!("No active conversation; vector memory is empty");
            let mut state = self.state.write().await;
            state.chat_id = None;
            state.vectors.clear();
            return Ok(());
        };

        let stored = match self.store.get(&chat_id).await {
            Ok(stored) => stored,
            Err(e) => {
                // Nothing must be persisted over the unreadable entry
                let mut state = self.state.write().await;
                state.chat_id = None;
                state.vectors.clear();
                return Err(e);
            }
        };

        match stored {
            Some(collection) => {
                if collection.version != COLLECTION_SCHEMA_VERSION {
                    warn!(
                        "Collection {} has schema version {}, expected {}",
                        chat_id, collection.version, COLLECTION_SCHEMA_VERSION
                    );
                }

                let count = collection.vectors.len();
                {
                    let mut state = self.state.write().await;
                    state.chat_id = Some(chat_id.clone());
                    state.vectors = collection.vectors;
                }
                info!("Loaded {} vectors for {}", count, chat_id);
            }
            None => {
                {
                    let mut state = self.state.write().await;
                    state.chat_id = Some(chat_id.clone());
                    state.vectors.clear();
                }

                if self.auto_vectorize {
                    info!("New conversation {}, vectorizing all tables", chat_id);
                    self.vectorize_all_tables().await?;
                } else {
                    debug!("New conversation {}, starting empty", chat_id);
                }
            }
        }

        Ok(())
    }

    /// Persist the resident collection, then load the one for the conversation
    /// that is now active
    #[inline]
    pub async fn switch_chat(&self) -> Result<()> {
        self.ensure_ready().await?;

        let has_unsaved = {
            let state = self.state.read().await;
            state.chat_id.is_some() && !state.vectors.is_empty()
        };

        if has_unsaved {
            self.persist().await?;
        }

        self.load_current_chat().await
    }

    /// Vectorize every enabled table and persist once at the end.
    ///
    /// A call made while another bulk pass is running returns
    /// [`VectorizeOutcome::AlreadyRunning`] without doing anything. A table
    /// that fails is logged and skipped; the others are still processed.
    #[inline]
    pub async fn vectorize_all_tables(&self) -> Result<VectorizeOutcome> {
        let Some(_guard) = self.try_start_vectorizing() else {
            info!("Vectorization already in progress");
            return Ok(VectorizeOutcome::AlreadyRunning);
        };

        let report = self.vectorize_enabled_tables().await?;
        Ok(VectorizeOutcome::Completed(report))
    }

    /// Drop every resident vector and vectorize all enabled tables from scratch
    #[inline]
    pub async fn rebuild_all(&self) -> Result<VectorizeOutcome> {
        self.client().await?;

        let Some(_guard) = self.try_start_vectorizing() else {
            info!("Vectorization already in progress");
            return Ok(VectorizeOutcome::AlreadyRunning);
        };

        info!("Rebuilding all vectors");
        self.state.write().await.vectors.clear();

        let report = self.vectorize_enabled_tables().await?;
        Ok(VectorizeOutcome::Completed(report))
    }

    /// Vectorize a single table and persist. Returns the number of rows embedded.
    #[inline]
    pub async fn vectorize_table(&self, table: &dyn TableSource) -> Result<usize> {
        let client = self.client().await?;
        let chat_id = self.resident_chat_id().await;
        let rows = self.embed_table(&client, table, chat_id.as_deref()).await?;
        self.persist_if_resident(chat_id.as_deref()).await?;
        Ok(rows)
    }

    /// Re-embed one row and persist. Failures are logged, never returned;
    /// the result tells whether the vector was updated.
    #[inline]
    pub async fn update_row(&self, table: &dyn TableSource, row_index: usize) -> bool {
        match self.try_update_row(table, row_index).await {
            Ok(updated) => updated,
            Err(e) => {
                error!(
                    "Failed to update vector for row {} of table {}: {}",
                    row_index,
                    table.name(),
                    e
                );
                false
            }
        }
    }

    async fn try_update_row(&self, table: &dyn TableSource, row_index: usize) -> Result<bool> {
        let client = self.client().await?;
        let chat_id = self.resident_chat_id().await;

        let Some(values) = table.body().into_iter().nth(row_index) else {
            warn!("Row {} no longer exists in table {}", row_index, table.name());
            return Ok(false);
        };

        let headers = table.header();
        let text = row_text(table.name(), &headers, &values, row_index);
        let vector = client.embed(&text).await?;

        let id = row_vector_id(table.uid(), row_index);
        let record = VectorRecord {
            id: id.clone(),
            vector,
            metadata: RowMetadata {
                table_uid: table.uid().to_string(),
                table_name: table.name().to_string(),
                row_index,
                headers,
                values,
                timestamp: Utc::now(),
            },
        };

        self.commit_records(chat_id.as_deref(), vec![record]).await?;
        self.persist_if_resident(chat_id.as_deref()).await?;
        info!("Vector updated: {}", id);
        Ok(true)
    }

    /// Insert a vector, replacing any record with the same id in place
    #[inline]
    pub async fn add_vector(&self, id: String, vector: Vec<f32>, metadata: RowMetadata) -> Result<()> {
        let record = VectorRecord {
            id,
            vector,
            metadata,
        };

        let mut state = self.state.write().await;
        ensure_dimension(&state.vectors, std::slice::from_ref(&record))?;
        upsert_records(&mut state.vectors, vec![record]);
        Ok(())
    }

    /// Remove a vector. Returns whether it existed.
    #[inline]
    pub async fn delete_vector(&self, id: &str) -> bool {
        let mut state = self.state.write().await;
        let before = state.vectors.len();
        state.vectors.retain(|record| record.id != id);
        state.vectors.len() != before
    }

    /// Rank the resident vectors against `query`
    #[inline]
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        self.search_filtered(query, top_k, |_| true).await
    }

    /// Rank the resident vectors whose metadata passes `filter`.
    ///
    /// An empty collection returns no hits without calling the embedding API.
    #[inline]
    pub async fn search_filtered<F>(&self, query: &str, top_k: usize, filter: F) -> Result<Vec<SearchHit>>
    where
        F: Fn(&RowMetadata) -> bool + Send,
    {
        let client = self.client().await?;

        if self.state.read().await.vectors.is_empty() {
            debug!("No vectors to search");
            return Ok(Vec::new());
        }

        let query_vector = client.embed(query).await?;

        let state = self.state.read().await;
        let candidates = state
            .vectors
            .iter()
            .filter(|record| filter(&record.metadata))
            .map(|record| Candidate {
                vector: &record.vector,
                payload: record,
            })
            .collect();

        let ranked = rank_by_similarity(&query_vector, candidates, top_k)?;

        Ok(ranked
            .into_iter()
            .map(|hit| SearchHit {
                id: hit.payload.id.clone(),
                score: hit.score,
                metadata: hit.payload.metadata.clone(),
            })
            .collect())
    }

    #[inline]
    pub async fn get_stats(&self) -> MemoryStats {
        let state = self.state.read().await;

        let mut table_groups = BTreeMap::new();
        for record in &state.vectors {
            *table_groups
                .entry(record.metadata.table_name.clone())
                .or_insert(0) += 1;
        }

        MemoryStats {
            total_vectors: state.vectors.len(),
            table_groups,
            chat_id: state.chat_id.clone(),
            is_initialized: state.init == InitState::Ready,
            is_vectorizing: self.vectorizing.load(Ordering::Acquire),
        }
    }

    /// Snapshot of the resident records in insertion order
    #[inline]
    pub async fn records(&self) -> Vec<VectorRecord> {
        self.state.read().await.vectors.clone()
    }

    /// Forget every vector of the current conversation, durably
    #[inline]
    pub async fn clear_current_chat(&self) -> Result<()> {
        self.state.write().await.vectors.clear();
        self.persist().await?;
        info!("Cleared vectors of the current conversation");
        Ok(())
    }

    /// Write the resident collection to the store under its chat id
    #[inline]
    pub async fn persist(&self) -> Result<()> {
        let collection = {
            let state = self.state.read().await;
            let Some(chat_id) = state.chat_id.clone() else {
                warn!("Cannot persist vectors without an active conversation");
                return Ok(());
            };
            StoredCollection::new(chat_id, state.vectors.clone())
        };

        self.store.put(&collection).await?;
        info!(
            "Persisted {} vectors for {}",
            collection.vectors.len(),
            collection.chat_id
        );
        Ok(())
    }

    /// Replace the embedding client with one using the merged configuration
    #[inline]
    pub async fn update_embedding_config(&self, update: EmbeddingConfigUpdate) -> Result<()> {
        let mut client = self.client.write().await;
        let current = client.as_ref().ok_or(MemoryError::NotInitialized)?;

        let mut updated = EmbeddingClient::clone(current);
        updated.update_config(update)?;
        *client = Some(Arc::new(updated));
        Ok(())
    }

    /// Snapshot of the embedding configuration in use
    #[inline]
    pub async fn embedding_config(&self) -> Option<EmbeddingConfig> {
        self.client
            .read()
            .await
            .as_ref()
            .map(|client| client.get_config())
    }

    async fn client(&self) -> Result<Arc<EmbeddingClient>> {
        self.client
            .read()
            .await
            .clone()
            .ok_or(MemoryError::NotInitialized)
    }

    async fn ensure_ready(&self) -> Result<()> {
        if self.is_initialized().await {
            Ok(())
        } else {
            Err(MemoryError::NotInitialized)
        }
    }

    fn try_start_vectorizing(&self) -> Option<VectorizingGuard<'_>> {
        self.vectorizing
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| VectorizingGuard {
                flag: &self.vectorizing,
            })
    }

    async fn resident_chat_id(&self) -> Option<String> {
        self.state.read().await.chat_id.clone()
    }

    /// Bulk pass body; the caller holds the single-flight guard.
    ///
    /// The pass belongs to the conversation resident when it starts. If the
    /// conversation is switched while requests are in flight, the remaining
    /// records go to that conversation's stored collection instead.
    async fn vectorize_enabled_tables(&self) -> Result<VectorizeReport> {
        let client = self.client().await?;
        let chat_id = self.resident_chat_id().await;
        let tables: Vec<_> = self
            .tables
            .tables()
            .into_iter()
            .filter(|table| table.enabled())
            .collect();

        info!("Vectorizing {} enabled tables", tables.len());

        let mut report = VectorizeReport::default();
        for table in &tables {
            match self.embed_table(&client, table.as_ref(), chat_id.as_deref()).await {
                Ok(0) => report.tables_skipped += 1,
                Ok(rows) => {
                    report.tables_vectorized += 1;
                    report.rows_vectorized += rows;
                }
                Err(e) => {
                    error!("Failed to vectorize table {}: {}", table.name(), e);
                    report.tables_failed += 1;
                }
            }
        }

        self.persist_if_resident(chat_id.as_deref()).await?;

        info!(
            "Vectorization finished: {} tables, {} rows, {} skipped, {} failed",
            report.tables_vectorized,
            report.rows_vectorized,
            report.tables_skipped,
            report.tables_failed
        );
        Ok(report)
    }

    /// Embed every row of `table` in one batch and upsert the records into
    /// the collection of `chat_id`. Empty tables are skipped and report zero rows.
    async fn embed_table(
        &self,
        client: &EmbeddingClient,
        table: &dyn TableSource,
        chat_id: Option<&str>,
    ) -> Result<usize> {
        let headers = table.header();
        let rows = table.body();

        if headers.is_empty() || rows.is_empty() {
            debug!("Table {} is empty, skipping", table.name());
            return Ok(0);
        }

        info!("Vectorizing table {} ({} rows)", table.name(), rows.len());

        let texts: Vec<String> = rows
            .iter()
            .enumerate()
            .map(|(index, values)| row_text(table.name(), &headers, values, index))
            .collect();

        let vectors = client.embed_batch(&texts).await?;

        let timestamp = Utc::now();
        let records: Vec<VectorRecord> = rows
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(row_index, (values, vector))| VectorRecord {
                id: row_vector_id(table.uid(), row_index),
                vector,
                metadata: RowMetadata {
                    table_uid: table.uid().to_string(),
                    table_name: table.name().to_string(),
                    row_index,
                    headers: headers.clone(),
                    values,
                    timestamp,
                },
            })
            .collect();

        let count = records.len();
        self.commit_records(chat_id, records).await?;

        debug!("Table {} vectorized ({} rows)", table.name(), count);
        Ok(count)
    }

    /// Upsert records embedded for `chat_id`. While that conversation is
    /// resident they join the resident collection; after a switch they are
    /// merged into its stored collection so the newly active one stays clean.
    async fn commit_records(&self, chat_id: Option<&str>, records: Vec<VectorRecord>) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if state.chat_id.as_deref() == chat_id {
                ensure_dimension(&state.vectors, &records)?;
                upsert_records(&mut state.vectors, records);
                return Ok(());
            }
        }

        let Some(chat_id) = chat_id else {
            warn!(
                "Conversation changed while embedding; dropping {} vectors without a chat id",
                records.len()
            );
            return Ok(());
        };

        warn!(
            "Conversation changed while embedding; writing {} vectors to stored collection {}",
            records.len(),
            chat_id
        );

        let mut vectors = self
            .store
            .get(chat_id)
            .await?
            .map(|collection| collection.vectors)
            .unwrap_or_default();
        ensure_dimension(&vectors, &records)?;
        upsert_records(&mut vectors, records);
        self.store
            .put(&StoredCollection::new(chat_id.to_string(), vectors))
            .await
    }

    /// Persist the resident collection unless another conversation has
    /// replaced the one `chat_id` names
    async fn persist_if_resident(&self, chat_id: Option<&str>) -> Result<()> {
        if self.resident_chat_id().await.as_deref() == chat_id {
            self.persist().await
        } else {
            debug!("Conversation changed; {:?} was already written to the store", chat_id);
            Ok(())
        }
    }
}

/// Reject records whose dimension differs from each other or from the resident
/// records they would not replace
fn ensure_dimension(resident: &[VectorRecord], incoming: &[VectorRecord]) -> Result<()> {
    let Some(first) = incoming.first() else {
        return Ok(());
    };
    let dimension = first.vector.len();

    if let Some(other) = incoming.iter().find(|r| r.vector.len() != dimension) {
        return Err(MemoryError::DimensionMismatch {
            left: dimension,
            right: other.vector.len(),
        });
    }

    let replaced: HashSet<&str> = incoming.iter().map(|r| r.id.as_str()).collect();
    let kept = resident
        .iter()
        .find(|r| !replaced.contains(r.id.as_str()));

    match kept {
        Some(existing) if existing.vector.len() != dimension => {
            Err(MemoryError::DimensionMismatch {
                left: existing.vector.len(),
                right: dimension,
            })
        }
        _ => Ok(()),
    }
}

/// Replace records in place by id, append the rest in order
fn upsert_records(resident: &mut Vec<VectorRecord>, incoming: Vec<VectorRecord>) {
    let mut positions: HashMap<String, usize> = resident
        .iter()
        .enumerate()
        .map(|(index, record)| (record.id.clone(), index))
        .collect();

    for record in incoming {
        if let Some(&index) = positions.get(&record.id) {
            resident[index] = record;
        } else {
            positions.insert(record.id.clone(), resident.len());
            resident.push(record);
        }
    }
}
