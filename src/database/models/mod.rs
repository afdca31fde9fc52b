#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const COLLECTION_SCHEMA_VERSION: &str = "1.0";

/// One embedded table row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: RowMetadata,
}

/// Where a vector came from, kept alongside it for filtering and display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowMetadata {
    pub table_uid: String,
    pub table_name: String,
    pub row_index: usize,
    pub headers: Vec<String>,
    pub values: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Durable form of one conversation's vector collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCollection {
    pub chat_id: String,
    pub vectors: Vec<VectorRecord>,
    pub last_update: DateTime<Utc>,
    pub version: String,
}

impl StoredCollection {
    #[inline]
    pub fn new(chat_id: impl Into<String>, vectors: Vec<VectorRecord>) -> Self {
        Self {
            chat_id: chat_id.into(),
            vectors,
            last_update: Utc::now(),
            version: COLLECTION_SCHEMA_VERSION.to_string(),
        }
    }
}

/// Listing entry for a persisted collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSummary {
    pub chat_id: String,
    pub vector_count: i64,
    pub last_update: DateTime<Utc>,
    pub version: String,
}
