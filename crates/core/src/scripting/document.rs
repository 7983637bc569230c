//! Script documents and the immutable snapshots the registry publishes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::script_types::{ScriptEncoding, ScriptLanguage};
use crate::types::Timestamp;

/// The persisted, administratively managed unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptDocument {
    pub name: String,
    /// Source exactly as submitted; see `encoding`.
    pub code: String,
    #[serde(rename = "lang")]
    pub language: ScriptLanguage,
    #[serde(rename = "encoded", default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<ScriptEncoding>,
    pub active: bool,
    /// Starts at 0; +1 on every successful update.
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ScriptDocument {
    /// The administrative fields as a JSON object, the shape update patches
    /// are merged onto.
    pub fn to_admin_json(&self) -> Value {
        let mut body = serde_json::json!({
            "name": self.name,
            "code": self.code,
            "lang": self.language.as_str(),
            "active": self.active,
        });
        if let (Some(encoding), Some(map)) = (self.encoding, body.as_object_mut()) {
            map.insert("encoded".to_string(), Value::from(encoding.as_str()));
        }
        body
    }
}

/// Immutable view of one script version.
///
/// Shared as `Arc<ScriptSnapshot>`; an evaluation holding one keeps running
/// that exact version no matter what is published afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptSnapshot {
    pub document: ScriptDocument,
    /// `code` after decoding; what engines compile and run.
    pub source: String,
}

impl ScriptSnapshot {
    pub fn name(&self) -> &str {
        &self.document.name
    }

    pub fn version(&self) -> i64 {
        self.document.version
    }

    pub fn is_active(&self) -> bool {
        self.document.active
    }
}

/// Successful outcome of `create` / `update`.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptStatus {
    /// Human-readable status line for the admin surface.
    pub message: String,
    pub document: ScriptDocument,
}

/// Outcome of an activation toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// The flag flipped and was persisted.
    Changed,
    /// The script was already in the requested state.
    NoOp,
    NotFound,
}
