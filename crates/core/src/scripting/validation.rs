//! Admission checks for script documents.
//!
//! [`validate_document`] is pure: it inspects a JSON body and the set of
//! registered engines and either returns a normalized [`ScriptDraft`] or
//! the first rule the body violates. Checks always run in the same order
//! (body, name, code, language, language support, encoding), so the error
//! for a given body is deterministic.

use base64::Engine as _;
use serde_json::Value;

use super::document::ScriptDocument;
use super::engine::EngineSet;
use crate::script_types::{ScriptEncoding, ScriptLanguage};

pub const NAME: &str = "name";
pub const CODE: &str = "code";
pub const LANG: &str = "lang";
pub const ENCODED: &str = "encoded";
pub const ACTIVE: &str = "active";
pub const VERSION: &str = "version";

/// The first rule a candidate document breaks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing body")]
    MissingBody,
    #[error("Missing required 'name' property")]
    MissingName,
    #[error("Missing required 'code' property")]
    MissingCode,
    #[error("Missing required 'lang' property or it is not a string")]
    MissingLanguage,
    #[error("Language '{0}' is not supported")]
    UnsupportedLanguage(String),
    #[error("The field 'encoded' must be a String")]
    EncodingNotText,
    #[error("The specified 'encoded' value is not valid")]
    InvalidEncoding,
    #[error("The 'code' property is not valid {0} text")]
    UndecodableCode(ScriptEncoding),
    #[error("The field 'active' must be a boolean")]
    ActiveNotBoolean,
    #[error("Script name cannot be changed; delete and create it again")]
    NameChanged,
}

/// A document that passed every check, normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDraft {
    /// Trimmed name.
    pub name: String,
    /// Code as submitted.
    pub code: String,
    pub language: ScriptLanguage,
    pub encoding: Option<ScriptEncoding>,
    /// Decoded source handed to engines.
    pub source: String,
    /// Requested activation, if the body carried one.
    pub active: Option<bool>,
}

/// Run the admission checks on `body`.
pub fn validate_document(
    body: Option<&Value>,
    engines: &EngineSet,
) -> Result<ScriptDraft, ValidationError> {
    let body = body
        .filter(|b| !b.is_null())
        .ok_or(ValidationError::MissingBody)?;

    let name = non_blank_text(body, NAME).ok_or(ValidationError::MissingName)?;
    let code = non_blank_text(body, CODE).ok_or(ValidationError::MissingCode)?;
    let lang = non_blank_text(body, LANG).ok_or(ValidationError::MissingLanguage)?;

    let language = ScriptLanguage::for_name(lang)
        .filter(|language| engines.supports(*language))
        .ok_or_else(|| ValidationError::UnsupportedLanguage(lang.to_string()))?;

    let encoding = match body.get(ENCODED) {
        None | Some(Value::Null) => None,
        Some(Value::String(tag)) => {
            Some(ScriptEncoding::for_name(tag).ok_or(ValidationError::InvalidEncoding)?)
        }
        Some(_) => return Err(ValidationError::EncodingNotText),
    };

    let source = decode_source(code, encoding)?;

    let active = match body.get(ACTIVE) {
        None | Some(Value::Null) => None,
        Some(Value::Bool(active)) => Some(*active),
        Some(_) => return Err(ValidationError::ActiveNotBoolean),
    };

    Ok(ScriptDraft {
        name: name.trim().to_string(),
        code: code.to_string(),
        language,
        encoding,
        source,
        active,
    })
}

/// Overlay `patch` onto the admin form of `current`.
///
/// Keys in the patch replace the current values; an explicit
/// `"encoded": null` clears the encoding. The result still has to go
/// through [`validate_document`].
pub fn merge_patch(current: &ScriptDocument, patch: Option<&Value>) -> Result<Value, ValidationError> {
    let patch = match patch {
        Some(Value::Object(patch)) => patch,
        _ => return Err(ValidationError::MissingBody),
    };

    let mut merged = current.to_admin_json();
    if let Some(target) = merged.as_object_mut() {
        for (key, value) in patch {
            if key == VERSION {
                continue;
            }
            if value.is_null() {
                target.remove(key);
            } else {
                target.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(merged)
}

/// Decode `code` according to `encoding`.
pub fn decode_source(
    code: &str,
    encoding: Option<ScriptEncoding>,
) -> Result<String, ValidationError> {
    match encoding {
        None | Some(ScriptEncoding::Plain) => Ok(code.to_string()),
        Some(ScriptEncoding::Base64) => base64::engine::general_purpose::STANDARD
            .decode(code.trim())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .filter(|source| !source.trim().is_empty())
            .ok_or(ValidationError::UndecodableCode(ScriptEncoding::Base64)),
    }
}

fn non_blank_text<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::scripting::lua::LuaEngine;
    use crate::scripting::test_helpers::document;

    fn engines() -> EngineSet {
        EngineSet::new().with(Arc::new(LuaEngine::new()))
    }

    fn check(body: Value) -> Result<ScriptDraft, ValidationError> {
        validate_document(Some(&body), &engines())
    }

    #[test]
    fn accepts_minimal_document() {
        let draft = check(json!({"name": " greet ", "code": "return 1", "lang": "LUA"}))
            .expect("valid");
        assert_eq!(draft.name, "greet");
        assert_eq!(draft.language, ScriptLanguage::Lua);
        assert_eq!(draft.source, "return 1");
        assert_eq!(draft.encoding, None);
        assert_eq!(draft.active, None);
    }

    #[test]
    fn missing_body() {
        assert_eq!(
            validate_document(None, &engines()),
            Err(ValidationError::MissingBody)
        );
        assert_eq!(check(Value::Null), Err(ValidationError::MissingBody));
    }

    #[test]
    fn first_violation_wins() {
        // Everything is wrong; only the name is reported.
        assert_eq!(
            check(json!({"name": "  ", "lang": "cobol", "encoded": 7})),
            Err(ValidationError::MissingName)
        );
        assert_eq!(
            check(json!({"name": "x", "code": 12, "lang": "cobol"})),
            Err(ValidationError::MissingCode)
        );
        assert_eq!(
            check(json!({"name": "x", "code": "c", "lang": ["lua"]})),
            Err(ValidationError::MissingLanguage)
        );
    }

    #[test]
    fn unregistered_language_is_rejected_with_its_tag() {
        let err = check(json!({"name": "x", "code": "c", "lang": "cobol"})).unwrap_err();
        assert_eq!(err.to_string(), "Language 'cobol' is not supported");

        // Known tag, but no engine registered for it.
        let err = check(json!({"name": "x", "code": "c", "lang": "python"})).unwrap_err();
        assert_eq!(err, ValidationError::UnsupportedLanguage("python".into()));
    }

    #[test]
    fn encoding_must_be_known_text() {
        assert_eq!(
            check(json!({"name": "x", "code": "c", "lang": "lua", "encoded": true})),
            Err(ValidationError::EncodingNotText)
        );
        assert_eq!(
            check(json!({"name": "x", "code": "c", "lang": "lua", "encoded": "rot13"})),
            Err(ValidationError::InvalidEncoding)
        );
    }

    #[test]
    fn base64_code_is_decoded() {
        let draft = check(json!({
            "name": "x",
            "code": "cmV0dXJuIDQy",
            "lang": "lua",
            "encoded": "base64"
        }))
        .expect("valid");
        assert_eq!(draft.source, "return 42");
        assert_eq!(draft.code, "cmV0dXJuIDQy");
        assert_eq!(draft.encoding, Some(ScriptEncoding::Base64));
    }

    #[test]
    fn undecodable_base64_is_rejected() {
        assert_eq!(
            check(json!({"name": "x", "code": "!!!", "lang": "lua", "encoded": "BASE64"})),
            Err(ValidationError::UndecodableCode(ScriptEncoding::Base64))
        );
    }

    #[test]
    fn active_must_be_boolean() {
        assert_eq!(
            check(json!({"name": "x", "code": "c", "lang": "lua", "active": "yes"})),
            Err(ValidationError::ActiveNotBoolean)
        );
        let draft = check(json!({"name": "x", "code": "c", "lang": "lua", "active": false}))
            .expect("valid");
        assert_eq!(draft.active, Some(false));
    }

    #[test]
    fn merge_overlays_patch_keys() {
        let current = document("greet", ScriptLanguage::Lua);
        let merged = merge_patch(&current, Some(&json!({"code": "return 2", "version": 9})))
            .expect("merge");
        assert_eq!(merged["code"], "return 2");
        assert_eq!(merged["lang"], "lua");
        assert_eq!(merged["name"], "greet");
        assert!(merged.get("version").is_none());
    }

    #[test]
    fn merge_null_clears_encoding() {
        let mut current = document("greet", ScriptLanguage::Lua);
        current.encoding = Some(ScriptEncoding::Base64);
        let merged = merge_patch(&current, Some(&json!({"encoded": null, "code": "return 3"})))
            .expect("merge");
        assert!(merged.get("encoded").is_none());
    }

    #[test]
    fn merge_requires_object_patch() {
        let current = document("greet", ScriptLanguage::Lua);
        assert_eq!(merge_patch(&current, None), Err(ValidationError::MissingBody));
        assert_eq!(
            merge_patch(&current, Some(&json!(["code"]))),
            Err(ValidationError::MissingBody)
        );
    }
}
