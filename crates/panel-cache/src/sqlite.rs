//! SQLite-based cache implementation.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use panel_core::{ConceptFacts, FactCache, PanelError, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, instrument};

/// SQLite-based cache for company-concept payloads.
///
/// This cache stores each payload as JSON in a SQLite database file, providing
/// persistence across runs so that a rerun does not hit the throttled regulator
/// endpoint again.
#[derive(Debug)]
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

fn timestamp(at: chrono::DateTime<Utc>) -> String {
    // Fixed precision keeps the text column ordered like the instants.
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl SqliteCache {
    /// Create a new SQLite cache at the given path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| PanelError::Cache(e.to_string()))?;
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.initialize_schema()?;
        Ok(cache)
    }

    /// Create an in-memory SQLite cache.
    ///
    /// Useful for testing; data is lost when the cache is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| PanelError::Cache(e.to_string()))?;
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.initialize_schema()?;
        Ok(cache)
    }

    /// Initialize the database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| PanelError::Cache(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS concept_cache (
                provider TEXT NOT NULL,
                cik TEXT NOT NULL,
                tag TEXT NOT NULL,
                record_count INTEGER NOT NULL,
                data_json TEXT NOT NULL,
                cached_at TEXT NOT NULL,
                PRIMARY KEY (provider, cik, tag)
            )",
            [],
        )
        .map_err(|e| PanelError::Cache(e.to_string()))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_concept_cached_at
             ON concept_cache(cached_at)",
            [],
        )
        .map_err(|e| PanelError::Cache(e.to_string()))?;

        debug!("SQLite cache schema initialized");
        Ok(())
    }
}

#[async_trait]
impl FactCache for SqliteCache {
    #[instrument(skip(self), fields(provider = %provider, cik = %cik, tag = %tag))]
    async fn get_concept(
        &self,
        provider: &str,
        cik: &str,
        tag: &str,
    ) -> Result<Option<ConceptFacts>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| PanelError::Cache(e.to_string()))?;

        let result = conn
            .query_row(
                "SELECT data_json FROM concept_cache
                 WHERE provider = ?1 AND cik = ?2 AND tag = ?3",
                params![provider, cik, tag],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|e| PanelError::Cache(e.to_string()))?;

        match result {
            Some(json) => {
                let facts: ConceptFacts =
                    serde_json::from_str(&json).map_err(|e| PanelError::Parse(e.to_string()))?;
                debug!("Found cached concept");
                Ok(Some(facts))
            }
            None => {
                debug!("No cached concept found");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, facts), fields(provider = %provider, cik = %cik, tag = %tag))]
    async fn put_concept(
        &self,
        provider: &str,
        cik: &str,
        tag: &str,
        facts: &ConceptFacts,
    ) -> Result<()> {
        let cached_at = timestamp(Utc::now());
        let data_json =
            serde_json::to_string(facts).map_err(|e| PanelError::Parse(e.to_string()))?;
        let record_count = i64::try_from(facts.record_count()).unwrap_or(i64::MAX);

        let conn = self
            .conn
            .lock()
            .map_err(|e| PanelError::Cache(e.to_string()))?;

        conn.execute(
            "INSERT OR REPLACE INTO concept_cache
             (provider, cik, tag, record_count, data_json, cached_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![provider, cik, tag, record_count, data_json, cached_at],
        )
        .map_err(|e| PanelError::Cache(e.to_string()))?;

        debug!("Cached {} concept records", record_count);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn invalidate_stale(&self, ttl: Duration) -> Result<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(ttl)
                .map_err(|e| PanelError::Cache(format!("Invalid TTL duration: {}", e)))?;
        let cutoff_str = timestamp(cutoff);

        let conn = self
            .conn
            .lock()
            .map_err(|e| PanelError::Cache(e.to_string()))?;

        let deleted = conn
            .execute(
                "DELETE FROM concept_cache WHERE cached_at < ?1",
                params![cutoff_str],
            )
            .map_err(|e| PanelError::Cache(e.to_string()))?;

        if deleted > 0 {
            debug!("Invalidated {} stale cache entries", deleted);
        }

        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| PanelError::Cache(e.to_string()))?;

        conn.execute("DELETE FROM concept_cache", [])
            .map_err(|e| PanelError::Cache(e.to_string()))?;

        debug!("Cleared all cache entries");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use panel_core::FactRecord;

    fn sample_facts(val: f64) -> ConceptFacts {
        let mut facts = ConceptFacts {
            cik: Some(63908),
            tag: Some("Revenues".to_string()),
            ..Default::default()
        };
        facts.units.insert(
            "USD".to_string(),
            vec![FactRecord {
                start: Some("2021-01-01".to_string()),
                end: Some("2021-03-31".to_string()),
                val: Some(val),
                fy: Some(2021),
                fp: Some("Q1".to_string()),
                ..Default::default()
            }],
        );
        facts
    }

    #[tokio::test]
    async fn test_sqlite_cache_initialization() {
        let cache = SqliteCache::in_memory();
        assert!(cache.is_ok());
    }

    #[tokio::test]
    async fn test_concept_cache_round_trip() {
        let cache = SqliteCache::in_memory().unwrap();

        let result = cache
            .get_concept("test", "0000063908", "Revenues")
            .await
            .unwrap();
        assert!(result.is_none());

        let facts = sample_facts(5.0e9);
        cache
            .put_concept("test", "0000063908", "Revenues", &facts)
            .await
            .unwrap();

        let cached = cache
            .get_concept("test", "0000063908", "Revenues")
            .await
            .unwrap();
        assert_eq!(cached, Some(facts));
    }

    #[tokio::test]
    async fn test_concept_cache_replaces() {
        let cache = SqliteCache::in_memory().unwrap();
        cache
            .put_concept("test", "1", "Revenues", &sample_facts(1.0))
            .await
            .unwrap();
        cache
            .put_concept("test", "1", "Revenues", &sample_facts(2.0))
            .await
            .unwrap();

        let cached = cache.get_concept("test", "1", "Revenues").await.unwrap().unwrap();
        assert_eq!(cached.units["USD"][0].val, Some(2.0));
    }

    #[tokio::test]
    async fn test_invalidate_stale_and_clear() {
        let cache = SqliteCache::in_memory().unwrap();
        cache
            .put_concept("test", "1", "Revenues", &sample_facts(1.0))
            .await
            .unwrap();
        cache
            .put_concept("test", "1", "NetIncomeLoss", &sample_facts(1.0))
            .await
            .unwrap();

        let removed = cache
            .invalidate_stale(Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(removed, 0);

        tokio::time::sleep(Duration::from_millis(5)).await;
        let removed = cache.invalidate_stale(Duration::ZERO).await.unwrap();
        assert_eq!(removed, 2);

        cache
            .put_concept("test", "1", "Revenues", &sample_facts(1.0))
            .await
            .unwrap();
        cache.clear().await.unwrap();
        assert!(cache.get_concept("test", "1", "Revenues").await.unwrap().is_none());
    }
}
