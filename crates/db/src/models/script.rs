//! Script rows.

use scriptd_core::script_types::{ScriptEncoding, ScriptLanguage};
use scriptd_core::scripting::document::ScriptDocument;
use scriptd_core::scripting::store::{ScriptRecord, StoreError};
use scriptd_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Entity structs (database rows)
// ---------------------------------------------------------------------------

/// A row from the `scripts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ScriptRow {
    pub name: String,
    pub code: String,
    pub lang: String,
    pub encoded: Option<String>,
    pub active: bool,
    pub version: i64,
    pub deleted_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ScriptRow {
    /// Parse the textual tags back into a core record.
    pub fn into_record(self) -> Result<ScriptRecord, StoreError> {
        let language = ScriptLanguage::for_name(&self.lang).ok_or_else(|| StoreError::Corrupt {
            name: self.name.clone(),
            reason: format!("unknown language '{}'", self.lang),
        })?;
        let encoding = match self.encoded.as_deref() {
            None => None,
            Some(tag) => Some(ScriptEncoding::for_name(tag).ok_or_else(|| StoreError::Corrupt {
                name: self.name.clone(),
                reason: format!("unknown encoding '{tag}'"),
            })?),
        };

        Ok(ScriptRecord {
            deleted: self.deleted_at.is_some(),
            document: ScriptDocument {
                name: self.name,
                code: self.code,
                language,
                encoding,
                active: self.active,
                version: self.version,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
        })
    }
}
