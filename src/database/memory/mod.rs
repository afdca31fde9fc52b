
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::CollectionStore;
use super::models::StoredCollection;
use crate::Result;

/// Process-local store, mainly for tests and throwaway sessions
#[derive(Debug, Default)]
pub struct InMemoryCollectionStore {
    collections: RwLock<HashMap<String, StoredCollection>>,
}

impl InMemoryCollectionStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub async fn len(&self) -> usize {
        self.collections.read().await.len()
    }

    #[inline]
    pub async fn is_empty(&self) -> bool {
        self.collections.read().await.is_empty()
    }
}

#[async_trait]
impl CollectionStore for InMemoryCollectionStore {
    async fn get(&self, chat_id: &str) -> Result<Option<StoredCollection>> {
        Ok(self.collections.read().await.get(chat_id).cloned())
    }

    async fn put(&self, collection: &StoredCollection) -> Result<()> {
        self.collections
            .write()
            .await
            .insert(collection.chat_id.clone(), collection.clone());
        Ok(())
    }
}
