//! Repository for the `scripts` table.
//!
//! Soft deletes set `deleted_at`; every read except
//! [`ScriptRepo::list_all_including_deleted`] filters those rows out.

use scriptd_core::scripting::document::ScriptDocument;
use scriptd_core::scripting::store::{ScriptOrder, ScriptQuery};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::models::script::ScriptRow;

/// Column list for `scripts` queries.
const COLUMNS: &str = "\
    name, code, lang, encoded, active, version, \
    deleted_at, created_at, updated_at";

/// Provides persistence operations for scripts.
pub struct ScriptRepo;

impl ScriptRepo {
    /// Insert or fully replace the row for `document.name`, clearing any
    /// soft-delete marker.
    pub async fn upsert(pool: &PgPool, document: &ScriptDocument) -> Result<ScriptRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO scripts \
                (name, code, lang, encoded, active, version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (name) DO UPDATE SET \
                code = EXCLUDED.code, \
                lang = EXCLUDED.lang, \
                encoded = EXCLUDED.encoded, \
                active = EXCLUDED.active, \
                version = EXCLUDED.version, \
                deleted_at = NULL, \
                created_at = EXCLUDED.created_at, \
                updated_at = EXCLUDED.updated_at \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ScriptRow>(&query)
            .bind(&document.name)
            .bind(&document.code)
            .bind(document.language.as_str())
            .bind(document.encoding.map(|e| e.as_str()))
            .bind(document.active)
            .bind(document.version)
            .bind(document.created_at)
            .bind(document.updated_at)
            .fetch_one(pool)
            .await
    }

    /// Find a live script by name.
    pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<ScriptRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM scripts WHERE name = $1 AND deleted_at IS NULL");
        sqlx::query_as::<_, ScriptRow>(&query)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    /// List live scripts matching `filter`, ordered and paged.
    pub async fn list(pool: &PgPool, filter: &ScriptQuery) -> Result<Vec<ScriptRow>, sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {COLUMNS} FROM scripts WHERE deleted_at IS NULL"
        ));

        if let Some(language) = filter.language {
            builder.push(" AND lang = ").push_bind(language.as_str());
        }
        if let Some(active) = filter.active {
            builder.push(" AND active = ").push_bind(active);
        }
        if let Some(prefix) = &filter.name_prefix {
            builder
                .push(" AND starts_with(name, ")
                .push_bind(prefix.clone())
                .push(")");
        }

        builder.push(" ORDER BY ").push(order_clause(filter));
        builder
            .push(" LIMIT ")
            .push_bind(filter.clamped_limit())
            .push(" OFFSET ")
            .push_bind(filter.clamped_offset());

        builder.build_query_as::<ScriptRow>().fetch_all(pool).await
    }

    /// Every row, soft-deleted ones included, ordered by name.
    pub async fn list_all_including_deleted(pool: &PgPool) -> Result<Vec<ScriptRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM scripts ORDER BY name");
        sqlx::query_as::<_, ScriptRow>(&query).fetch_all(pool).await
    }

    /// Soft-delete a live script. Returns `true` if a row was marked.
    pub async fn soft_delete(pool: &PgPool, name: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE scripts SET deleted_at = NOW() WHERE name = $1 AND deleted_at IS NULL",
        )
        .bind(name)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Permanently remove a script, deleted or not. Returns `true` if a row was removed.
    pub async fn hard_delete(pool: &PgPool, name: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM scripts WHERE name = $1")
            .bind(name)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn order_clause(filter: &ScriptQuery) -> &'static str {
    match (filter.order_by, filter.descending) {
        (ScriptOrder::Name, false) => "name ASC",
        (ScriptOrder::Name, true) => "name DESC",
        (ScriptOrder::Language, false) => "lang ASC, name ASC",
        (ScriptOrder::Language, true) => "lang DESC, name DESC",
        (ScriptOrder::UpdatedAt, false) => "updated_at ASC, name ASC",
        (ScriptOrder::UpdatedAt, true) => "updated_at DESC, name DESC",
        (ScriptOrder::Version, false) => "version ASC, name ASC",
        (ScriptOrder::Version, true) => "version DESC, name DESC",
    }
}
