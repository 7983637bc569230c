//! Shared query parameter types for API handlers.

use scriptd_core::script_types::ScriptLanguage;
use scriptd_core::scripting::store::{ScriptOrder, ScriptQuery};
use serde::Deserialize;

use crate::error::AppError;

/// Query parameters for `GET /admin/plugins`.
///
/// `?lang=&active=&name_prefix=&order_by=&desc=&limit=&offset=`. Limits
/// are clamped by the store.
#[derive(Debug, Default, Deserialize)]
pub struct ListScriptsParams {
    pub lang: Option<String>,
    pub active: Option<bool>,
    pub name_prefix: Option<String>,
    pub order_by: Option<String>,
    #[serde(default)]
    pub desc: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListScriptsParams {
    /// Translate into store criteria, rejecting unknown tags.
    pub fn into_query(self) -> Result<ScriptQuery, AppError> {
        let language = self
            .lang
            .as_deref()
            .map(|tag| {
                ScriptLanguage::for_name(tag)
                    .ok_or_else(|| AppError::BadRequest(format!("Unknown language '{tag}'")))
            })
            .transpose()?;

        let order_by = match self.order_by.as_deref() {
            None | Some("name") => ScriptOrder::Name,
            Some("lang") => ScriptOrder::Language,
            Some("updated_at") => ScriptOrder::UpdatedAt,
            Some("version") => ScriptOrder::Version,
            Some(other) => {
                return Err(AppError::BadRequest(format!(
                    "Cannot order by '{other}'; expected name, lang, updated_at or version"
                )))
            }
        };

        Ok(ScriptQuery {
            language,
            active: self.active,
            name_prefix: self.name_prefix.filter(|p| !p.is_empty()),
            order_by,
            descending: self.desc,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

/// Query parameters for `DELETE /admin/plugins/{name}`.
#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    /// Remove the record entirely instead of soft deleting it.
    #[serde(default)]
    pub force: bool,
}
