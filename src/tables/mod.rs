// Tables module
// Capability traits for the table engine and conversation context, plus the
// JSON chat snapshot used by the command line


use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

const UNKNOWN_CONVERSATION: &str = "unknown";

/// Read access to one table of the table engine
pub trait TableSource: Send + Sync {
    fn name(&self) -> &str;
    fn uid(&self) -> &str;
    fn enabled(&self) -> bool;
    fn header(&self) -> Vec<String>;
    fn body(&self) -> Vec<Vec<String>>;
}

/// Enumerates the tables attached to the active conversation
pub trait TableProvider: Send + Sync {
    fn tables(&self) -> Vec<Arc<dyn TableSource>>;
}

/// Identity of the active conversation, if there is one
pub trait ConversationContext: Send + Sync {
    fn identity(&self) -> Option<ConversationIdentity>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationIdentity {
    /// Display name of the conversation partner
    #[serde(default)]
    pub name: String,
    pub chat_id: String,
}

impl ConversationIdentity {
    #[inline]
    pub fn new(name: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chat_id: chat_id.into(),
        }
    }

    /// Stable collection key, `None` when the conversation has no chat id
    #[inline]
    pub fn collection_key(&self) -> Option<String> {
        if self.chat_id.trim().is_empty() {
            return None;
        }

        let name = if self.name.trim().is_empty() {
            UNKNOWN_CONVERSATION
        } else {
            self.name.as_str()
        };

        Some(format!("{}_{}", name, self.chat_id))
    }
}

/// Vector id of a table row
#[inline]
pub fn row_vector_id(table_uid: &str, row_index: usize) -> String {
    format!("{}_row{}", table_uid, row_index)
}

/// Text that gets embedded for one row, e.g. `表格Characters第0行：Name是Alice，Age是30`.
///
/// Headers without a value render with an empty value.
#[inline]
pub fn row_text(table_name: &str, headers: &[String], values: &[String], row_index: usize) -> String {
    let pairs = headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let value = values.get(i).map_or("", String::as_str);
            format!("{}是{}", header, value)
        })
        .collect::<Vec<_>>()
        .join("，");

    format!("表格{}第{}行：{}", table_name, row_index, pairs)
}

/// In-memory table with owned data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetTable {
    pub uid: String,
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enable: bool,
    #[serde(default)]
    pub header: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

fn enabled_by_default() -> bool {
    true
}

impl TableSource for SheetTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn uid(&self) -> &str {
        &self.uid
    }

    fn enabled(&self) -> bool {
        self.enable
    }

    fn header(&self) -> Vec<String> {
        self.header.clone()
    }

    fn body(&self) -> Vec<Vec<String>> {
        self.rows.clone()
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotFile {
    conversation: Option<ConversationIdentity>,
    #[serde(default)]
    tables: Vec<SheetTable>,
}

/// A conversation and its tables, as exported by the table engine
#[derive(Clone, Default)]
pub struct ChatSnapshot {
    conversation: Option<ConversationIdentity>,
    tables: Vec<Arc<SheetTable>>,
}

impl ChatSnapshot {
    #[inline]
    pub fn new(conversation: Option<ConversationIdentity>, tables: Vec<SheetTable>) -> Self {
        Self {
            conversation,
            tables: tables.into_iter().map(Arc::new).collect(),
        }
    }

    #[inline]
    pub fn from_json(json: &str) -> Result<Self> {
        let file: SnapshotFile =
            serde_json::from_str(json).context("Failed to parse chat snapshot")?;
        Ok(Self::new(file.conversation, file.tables))
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read chat snapshot: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Invalid chat snapshot: {}", path.display()))
    }

    #[inline]
    pub fn sheets(&self) -> impl Iterator<Item = &SheetTable> {
        self.tables.iter().map(AsRef::as_ref)
    }

    /// Look up a table by name or uid
    #[inline]
    pub fn find_table(&self, name_or_uid: &str) -> Option<Arc<SheetTable>> {
        self.tables
            .iter()
            .find(|t| t.uid == name_or_uid || t.name == name_or_uid)
            .cloned()
    }
}

impl TableProvider for ChatSnapshot {
    fn tables(&self) -> Vec<Arc<dyn TableSource>> {
        self.tables
            .iter()
            .map(|t| Arc::clone(t) as Arc<dyn TableSource>)
            .collect()
    }
}

impl ConversationContext for ChatSnapshot {
    fn identity(&self) -> Option<ConversationIdentity> {
        self.conversation.clone()
    }
}
