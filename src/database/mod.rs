// Database module
// Durable storage for per-conversation vector collections

pub mod memory;
pub mod models;
pub mod sqlite;

use async_trait::async_trait;

use crate::Result;

pub use memory::InMemoryCollectionStore;
pub use models::{
    COLLECTION_SCHEMA_VERSION, CollectionSummary, RowMetadata, StoredCollection, VectorRecord,
};
pub use sqlite::SqliteCollectionStore;

/// Keyed store holding at most one collection per chat id.
///
/// Writes replace the whole collection; the last write wins.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Prepare the store for use (create files, run migrations)
    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, chat_id: &str) -> Result<Option<StoredCollection>>;

    async fn put(&self, collection: &StoredCollection) -> Result<()>;
}
