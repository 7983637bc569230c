//! [`ScriptStore`] backed by PostgreSQL.

use async_trait::async_trait;
use scriptd_core::scripting::document::ScriptDocument;
use scriptd_core::scripting::store::{ScriptQuery, ScriptRecord, ScriptStore, StoreError};

use crate::models::script::ScriptRow;
use crate::repositories::ScriptRepo;
use crate::DbPool;

/// Durable script store over the `scripts` table.
#[derive(Debug, Clone)]
pub struct PgScriptStore {
    pool: DbPool,
}

impl PgScriptStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Convert rows, skipping (and logging) the ones that no longer parse.
fn parse_rows(rows: Vec<ScriptRow>) -> Vec<ScriptRecord> {
    rows.into_iter()
        .filter_map(|row| match row.into_record() {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable script row");
                None
            }
        })
        .collect()
}

#[async_trait]
impl ScriptStore for PgScriptStore {
    async fn put(&self, document: &ScriptDocument) -> Result<(), StoreError> {
        ScriptRepo::upsert(&self.pool, document)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<ScriptDocument>, StoreError> {
        ScriptRepo::find_by_name(&self.pool, name)
            .await
            .map_err(backend)?
            .map(|row| row.into_record().map(|record| record.document))
            .transpose()
    }

    async fn list_matching(&self, query: &ScriptQuery) -> Result<Vec<ScriptDocument>, StoreError> {
        let rows = ScriptRepo::list(&self.pool, query).await.map_err(backend)?;
        Ok(parse_rows(rows)
            .into_iter()
            .map(|record| record.document)
            .collect())
    }

    async fn soft_delete(&self, name: &str) -> Result<bool, StoreError> {
        ScriptRepo::soft_delete(&self.pool, name)
            .await
            .map_err(backend)
    }

    async fn hard_delete(&self, name: &str) -> Result<bool, StoreError> {
        ScriptRepo::hard_delete(&self.pool, name)
            .await
            .map_err(backend)
    }

    async fn load_all(&self) -> Result<Vec<ScriptRecord>, StoreError> {
        let rows = ScriptRepo::list_all_including_deleted(&self.pool)
            .await
            .map_err(backend)?;
        Ok(parse_rows(rows))
    }
}
