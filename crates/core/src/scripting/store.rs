//! Durable storage contract for script documents.
//!
//! The registry depends only on [`ScriptStore`]. `scriptd-db` provides the
//! PostgreSQL implementation; [`MemoryStore`] backs tests and database-less
//! development runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::document::ScriptDocument;
use crate::script_types::ScriptLanguage;

/// Default page size when a query sets no limit.
pub const DEFAULT_LIMIT: i64 = 100;
/// Hard cap on page size.
pub const MAX_LIMIT: i64 = 1000;

/// Errors reported by a store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend failed (connection, query, ...).
    #[error("{0}")]
    Backend(String),
    /// A stored row could not be turned back into a document.
    #[error("corrupt record '{name}': {reason}")]
    Corrupt { name: String, reason: String },
}

/// A stored document plus its soft-delete marker.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptRecord {
    pub document: ScriptDocument,
    pub deleted: bool,
}

/// Sort key for listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScriptOrder {
    #[default]
    Name,
    Language,
    UpdatedAt,
    Version,
}

/// Listing filter. Opaque to the registry, interpreted by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptQuery {
    pub language: Option<ScriptLanguage>,
    pub active: Option<bool>,
    /// Literal name prefix (no wildcards).
    pub name_prefix: Option<String>,
    pub order_by: ScriptOrder,
    pub descending: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ScriptQuery {
    /// Effective page size, clamped to `1..=MAX_LIMIT`.
    pub fn clamped_limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    /// Effective offset, never negative.
    pub fn clamped_offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    /// Whether `doc` passes the filters (ordering and paging aside).
    pub fn matches(&self, doc: &ScriptDocument) -> bool {
        self.language.map_or(true, |lang| doc.language == lang)
            && self.active.map_or(true, |active| doc.active == active)
            && self
                .name_prefix
                .as_deref()
                .map_or(true, |prefix| doc.name.starts_with(prefix))
    }
}

/// Key-value persistence keyed by script name.
///
/// Implementations must be linearizable per key. `get` and
/// `list_matching` never return soft-deleted records.
#[async_trait]
pub trait ScriptStore: Send + Sync {
    /// Insert or replace the live record for `document.name`.
    async fn put(&self, document: &ScriptDocument) -> Result<(), StoreError>;

    async fn get(&self, name: &str) -> Result<Option<ScriptDocument>, StoreError>;

    async fn list_matching(&self, query: &ScriptQuery) -> Result<Vec<ScriptDocument>, StoreError>;

    /// Mark the record deleted, keeping it. Returns `true` if a live record was marked.
    async fn soft_delete(&self, name: &str) -> Result<bool, StoreError>;

    /// Remove the record entirely, deleted or not. Returns `true` if a row was removed.
    async fn hard_delete(&self, name: &str) -> Result<bool, StoreError>;

    /// Every record, soft-deleted ones included. Used to hydrate the registry.
    async fn load_all(&self) -> Result<Vec<ScriptRecord>, StoreError>;
}

/// In-process store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, ScriptRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with `records`.
    pub fn with_records(records: impl IntoIterator<Item = ScriptRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.document.name.clone(), record))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }
}

#[async_trait]
impl ScriptStore for MemoryStore {
    async fn put(&self, document: &ScriptDocument) -> Result<(), StoreError> {
        self.records.write().await.insert(
            document.name.clone(),
            ScriptRecord {
                document: document.clone(),
                deleted: false,
            },
        );
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<ScriptDocument>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .get(name)
            .filter(|record| !record.deleted)
            .map(|record| record.document.clone()))
    }

    async fn list_matching(&self, query: &ScriptQuery) -> Result<Vec<ScriptDocument>, StoreError> {
        let records = self.records.read().await;
        let mut docs: Vec<ScriptDocument> = records
            .values()
            .filter(|record| !record.deleted && query.matches(&record.document))
            .map(|record| record.document.clone())
            .collect();

        docs.sort_by(|a, b| {
            let ord = match query.order_by {
                ScriptOrder::Name => a.name.cmp(&b.name),
                ScriptOrder::Language => a
                    .language
                    .as_str()
                    .cmp(b.language.as_str())
                    .then_with(|| a.name.cmp(&b.name)),
                ScriptOrder::UpdatedAt => a
                    .updated_at
                    .cmp(&b.updated_at)
                    .then_with(|| a.name.cmp(&b.name)),
                ScriptOrder::Version => a.version.cmp(&b.version).then_with(|| a.name.cmp(&b.name)),
            };
            if query.descending {
                ord.reverse()
            } else {
                ord
            }
        });

        let offset = usize::try_from(query.clamped_offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.clamped_limit()).unwrap_or(usize::MAX);
        Ok(docs.into_iter().skip(offset).take(limit).collect())
    }

    async fn soft_delete(&self, name: &str) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        match records.get_mut(name) {
            Some(record) if !record.deleted => {
                record.deleted = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn hard_delete(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(name).is_some())
    }

    async fn load_all(&self) -> Result<Vec<ScriptRecord>, StoreError> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
