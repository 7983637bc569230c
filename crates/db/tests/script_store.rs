//! Integration tests for the PostgreSQL script store.
//!
//! Exercises `PgScriptStore` against a real database to verify that:
//! - `put` upserts and clears a previous soft delete
//! - soft-deleted rows are hidden from `get` and listings but still loaded
//! - hard delete removes the row entirely
//! - listing filters, orders and pages in SQL
//!
//! Run with `cargo test -p scriptd-db -- --ignored` and a `DATABASE_URL`.

use scriptd_core::script_types::{ScriptEncoding, ScriptLanguage};
use scriptd_core::scripting::document::ScriptDocument;
use scriptd_core::scripting::store::{ScriptOrder, ScriptQuery, ScriptStore};
use scriptd_db::PgScriptStore;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn document(name: &str, language: ScriptLanguage) -> ScriptDocument {
    let now = chrono::Utc::now();
    ScriptDocument {
        name: name.to_string(),
        code: "return 1".to_string(),
        language,
        encoding: None,
        active: true,
        version: 0,
        created_at: now,
        updated_at: now,
    }
}

fn names(docs: &[ScriptDocument]) -> Vec<&str> {
    docs.iter().map(|d| d.name.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn put_then_get_round_trips_tags(pool: PgPool) {
    let store = PgScriptStore::new(pool);
    let mut doc = document("greet", ScriptLanguage::Python);
    doc.code = "cHJpbnQoMSk=".to_string();
    doc.encoding = Some(ScriptEncoding::Base64);
    store.put(&doc).await.unwrap();

    let loaded = store.get("greet").await.unwrap().expect("stored");
    assert_eq!(loaded.language, ScriptLanguage::Python);
    assert_eq!(loaded.encoding, Some(ScriptEncoding::Base64));
    assert_eq!(loaded.code, "cHJpbnQoMSk=");

    doc.version = 1;
    doc.encoding = None;
    store.put(&doc).await.unwrap();
    let loaded = store.get("greet").await.unwrap().expect("stored");
    assert_eq!(loaded.version, 1);
    assert_eq!(loaded.encoding, None);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn soft_delete_hides_but_keeps_row(pool: PgPool) {
    let store = PgScriptStore::new(pool);
    store.put(&document("a", ScriptLanguage::Lua)).await.unwrap();

    assert!(store.soft_delete("a").await.unwrap());
    assert!(!store.soft_delete("a").await.unwrap());
    assert!(store.get("a").await.unwrap().is_none());
    assert!(store
        .list_matching(&ScriptQuery::default())
        .await
        .unwrap()
        .is_empty());

    let all = store.load_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].deleted);

    assert!(store.hard_delete("a").await.unwrap());
    assert!(!store.hard_delete("a").await.unwrap());
    assert!(store.load_all().await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn put_revives_soft_deleted_row(pool: PgPool) {
    let store = PgScriptStore::new(pool);
    store.put(&document("a", ScriptLanguage::Lua)).await.unwrap();
    store.soft_delete("a").await.unwrap();

    store.put(&document("a", ScriptLanguage::Shell)).await.unwrap();
    let loaded = store.get("a").await.unwrap().expect("revived");
    assert_eq!(loaded.language, ScriptLanguage::Shell);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn list_filters_orders_and_pages(pool: PgPool) {
    let store = PgScriptStore::new(pool);
    for (name, lang, version) in [
        ("beta", ScriptLanguage::Lua, 3),
        ("alpha", ScriptLanguage::Lua, 1),
        ("gamma", ScriptLanguage::Shell, 2),
        ("al_pine", ScriptLanguage::Lua, 0),
    ] {
        let mut doc = document(name, lang);
        doc.version = version;
        store.put(&doc).await.unwrap();
    }

    let lua = store
        .list_matching(&ScriptQuery {
            language: Some(ScriptLanguage::Lua),
            ..ScriptQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(names(&lua), vec!["al_pine", "alpha", "beta"]);

    // `_` is literal, not a wildcard.
    let prefixed = store
        .list_matching(&ScriptQuery {
            name_prefix: Some("al_".to_string()),
            ..ScriptQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(names(&prefixed), vec!["al_pine"]);

    let by_version = store
        .list_matching(&ScriptQuery {
            order_by: ScriptOrder::Version,
            descending: true,
            limit: Some(2),
            offset: Some(1),
            ..ScriptQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(names(&by_version), vec!["gamma", "alpha"]);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn unreadable_rows_are_skipped_on_load(pool: PgPool) {
    sqlx::query("INSERT INTO scripts (name, code, lang) VALUES ('old', 'x', 'cobol')")
        .execute(&pool)
        .await
        .unwrap();
    let store = PgScriptStore::new(pool);
    store.put(&document("kept", ScriptLanguage::Lua)).await.unwrap();

    let all = store.load_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].document.name, "kept");

    // A forced delete still clears the row.
    assert!(store.hard_delete("old").await.unwrap());
}
