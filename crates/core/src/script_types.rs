//! Supported script languages and code encodings.
//!
//! Both sets are closed: adding a language means adding a variant here and
//! registering an engine for it in the
//! [`EngineSet`](crate::scripting::engine::EngineSet).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A scripting language a plugin can be written in.
///
/// Serialized as its canonical lowercase tag (`"lua"`, `"shell"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptLanguage {
    /// Lua 5.4, evaluated in-process.
    Lua,
    /// Shell scripts executed via `bash`.
    Shell,
    /// Python scripts executed via `python3`.
    Python,
    /// JavaScript executed via `node`.
    JavaScript,
}

impl ScriptLanguage {
    /// Every language variant, in declaration order.
    pub const ALL: [ScriptLanguage; 4] = [Self::Lua, Self::Shell, Self::Python, Self::JavaScript];

    /// Canonical tag stored in documents and the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lua => "lua",
            Self::Shell => "shell",
            Self::Python => "python",
            Self::JavaScript => "javascript",
        }
    }

    /// Resolve a user-supplied tag, accepting common aliases.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    /// Returns `None` for unknown tags.
    pub fn for_name(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "lua" => Some(Self::Lua),
            "shell" | "sh" | "bash" => Some(Self::Shell),
            "python" | "py" => Some(Self::Python),
            "javascript" | "js" | "node" => Some(Self::JavaScript),
            _ => None,
        }
    }
}

impl fmt::Display for ScriptLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown language tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown script language: {0}")]
pub struct UnknownLanguage(pub String);

impl FromStr for ScriptLanguage {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::for_name(s).ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}

/// How the `code` property of a document is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScriptEncoding {
    /// Code is stored as-is.
    Plain,
    /// Code is standard base64 of UTF-8 source text.
    Base64,
}

impl ScriptEncoding {
    /// Canonical uppercase tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Base64 => "BASE64",
        }
    }

    /// Case-insensitive parse of an encoding tag.
    pub fn for_name(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "BASE64" => Some(Self::Base64),
            _ => None,
        }
    }
}

impl fmt::Display for ScriptEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
