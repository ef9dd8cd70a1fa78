// Persisted per-spec section cache (SQLite, WAL mode).
//
// One row per spec, holding the last-extracted SpecSections as a single JSON
// value. Refreshes overwrite the row wholesale in one statement, so a reader
// either sees the previous complete entry or the new complete entry — never
// a partial one. Entries survive restarts and may go stale relative to
// source markup edits until the next refresh.

use anyhow::{Context as _, Result};
use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
    SqlitePool,
};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use crate::sections::{self, SpecSections};

#[derive(Clone)]
pub struct HtmlStore {
    pool: SqlitePool,
}

impl HtmlStore {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("specd.db");
        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(opts)
            .await
            .context("cannot open section cache database")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS spec_sections (\
                 spec_id    TEXT PRIMARY KEY,\
                 data       TEXT NOT NULL,\
                 updated_at TEXT NOT NULL\
             )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Full cached tree for a spec, or `None` when never extracted.
    pub async fn get_by_id(&self, spec_id: &str) -> Result<Option<SpecSections>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM spec_sections WHERE spec_id = ?")
                .bind(spec_id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((data,)) => {
                let spec = serde_json::from_str(&data)
                    .with_context(|| format!("corrupt cache entry for {spec_id}"))?;
                Ok(Some(spec))
            }
            None => Ok(None),
        }
    }

    /// Cached subset for a spec. `None` when the spec has no entry or when
    /// none of the requested ids exist in it — a nonexistent id set is a
    /// lookup miss, not an empty success.
    pub async fn get_by_section(
        &self,
        spec_id: &str,
        section_ids: &[String],
    ) -> Result<Option<SpecSections>> {
        let Some(full) = self.get_by_id(spec_id).await? else {
            return Ok(None);
        };

        let wanted: HashSet<String> = section_ids.iter().cloned().collect();
        let filtered = sections::filter(&full.contents, &wanted);
        if filtered.is_empty() {
            return Ok(None);
        }

        Ok(Some(SpecSections {
            contents: filtered,
            ..full
        }))
    }

    /// Overwrite a spec's entry wholesale.
    pub async fn put(&self, spec: &SpecSections) -> Result<()> {
        let data = serde_json::to_string(spec)?;
        sqlx::query(
            "INSERT OR REPLACE INTO spec_sections (spec_id, data, updated_at) VALUES (?, ?, ?)",
        )
        .bind(&spec.spec_id)
        .bind(data)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn has(&self, spec_id: &str) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM spec_sections WHERE spec_id = ?")
                .bind(spec_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PAGE: &str = "<body>\
        <h1 id=\"overview\">Overview</h1><p>intro</p>\
        <h2 id=\"usage\">Usage</h2><p>use it</p>\
        </body>";

    async fn store() -> (TempDir, HtmlStore) {
        let dir = TempDir::new().unwrap();
        let store = HtmlStore::new(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn put_then_get_round_trips_the_full_shape() {
        let (_dir, store) = store().await;
        let spec = sections::parse_spec("components/button", PAGE);
        store.put(&spec).await.unwrap();

        let got = store.get_by_id("components/button").await.unwrap().unwrap();
        assert_eq!(got, spec);
        assert!(store.has("components/button").await.unwrap());
    }

    #[tokio::test]
    async fn missing_entries_are_absent_not_errors() {
        let (_dir, store) = store().await;
        assert!(store.get_by_id("nope").await.unwrap().is_none());
        assert!(!store.has("nope").await.unwrap());
    }

    #[tokio::test]
    async fn get_by_section_equals_filtering_the_full_entry() {
        let (_dir, store) = store().await;
        let spec = sections::parse_spec("components/button", PAGE);
        store.put(&spec).await.unwrap();

        let ids = vec!["usage".to_string()];
        let subset = store
            .get_by_section("components/button", &ids)
            .await
            .unwrap()
            .unwrap();

        let wanted: HashSet<String> = ids.into_iter().collect();
        assert_eq!(subset.contents, sections::filter(&spec.contents, &wanted));
        // Resources travel with the subset unchanged.
        assert_eq!(subset.head_resources, spec.head_resources);
    }

    #[tokio::test]
    async fn unknown_section_ids_are_a_miss() {
        let (_dir, store) = store().await;
        let spec = sections::parse_spec("components/button", PAGE);
        store.put(&spec).await.unwrap();

        let ids = vec!["does-not-exist".to_string()];
        assert!(store
            .get_by_section("components/button", &ids)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn refresh_overwrites_wholesale() {
        let (_dir, store) = store().await;
        let v1 = sections::parse_spec("s", "<body><h1>Old</h1></body>");
        store.put(&v1).await.unwrap();
        let v2 = sections::parse_spec("s", "<body><h1>New</h1><h2>More</h2></body>");
        store.put(&v2).await.unwrap();

        let got = store.get_by_id("s").await.unwrap().unwrap();
        assert_eq!(got, v2);
    }

    #[tokio::test]
    async fn entries_survive_reopening_the_store() {
        let dir = TempDir::new().unwrap();
        let spec = sections::parse_spec("s", PAGE);
        {
            let store = HtmlStore::new(dir.path()).await.unwrap();
            store.put(&spec).await.unwrap();
        }
        let store = HtmlStore::new(dir.path()).await.unwrap();
        assert_eq!(store.get_by_id("s").await.unwrap().unwrap(), spec);
    }
}
