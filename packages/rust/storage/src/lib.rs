//! libSQL storage for the evidence cache.
//!
//! The [`Storage`] struct wraps a local libSQL database holding one row per
//! cache key. Expiry is lazy: reads ignore rows past their TTL, and stale rows
//! are overwritten by the next write or removed by [`Storage::purge_expired`].

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use keywatch_shared::{KeywatchError, Result};
use libsql::{Connection, Database, params};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

/// A fresh cache row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEvidence {
    pub provider: String,
    pub term: String,
    pub payload_json: String,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: i64,
}

/// Values written by [`Storage::put_cached_evidence`].
#[derive(Debug, Clone, Copy)]
pub struct CacheWrite<'a> {
    pub key: &'a str,
    pub provider: &'a str,
    pub term: &'a str,
    pub payload_json: &'a str,
    pub ttl_secs: i64,
}

fn storage_err(e: libsql::Error) -> KeywatchError {
    KeywatchError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| KeywatchError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        KeywatchError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 before the first migration.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // table not created yet
        }
    }

    // -----------------------------------------------------------------------
    // Evidence cache operations
    // -----------------------------------------------------------------------

    /// Fetch a cache row that has not yet expired.
    pub async fn get_cached_evidence(&self, key: &str) -> Result<Option<CachedEvidence>> {
        self.get_cached_evidence_at(key, Utc::now()).await
    }

    async fn get_cached_evidence_at(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CachedEvidence>> {
        let mut rows = self
            .conn
            .query(
                "SELECT provider, term, payload_json, created_at, ttl_secs
                 FROM evidence_cache
                 WHERE cache_key = ?1 AND expires_at > ?2",
                params![key, now.timestamp()],
            )
            .await
            .map_err(storage_err)?;

        let Some(row) = rows.next().await.map_err(storage_err)? else {
            return Ok(None);
        };

        let created_secs: i64 = row.get(3).map_err(storage_err)?;
        let created_at = DateTime::from_timestamp(created_secs, 0).ok_or_else(|| {
            KeywatchError::Storage(format!("invalid created_at timestamp {created_secs}"))
        })?;

        Ok(Some(CachedEvidence {
            provider: row.get(0).map_err(storage_err)?,
            term: row.get(1).map_err(storage_err)?,
            payload_json: row.get(2).map_err(storage_err)?,
            created_at,
            ttl_secs: row.get(4).map_err(storage_err)?,
        }))
    }

    /// Store a provider result (upsert, last writer wins).
    pub async fn put_cached_evidence(&self, entry: CacheWrite<'_>) -> Result<()> {
        let now = Utc::now().timestamp();
        let ttl = entry.ttl_secs.max(0);
        self.conn
            .execute(
                "INSERT INTO evidence_cache (cache_key, provider, term, payload_json, created_at, ttl_secs, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(cache_key) DO UPDATE SET
                   provider = excluded.provider,
                   term = excluded.term,
                   payload_json = excluded.payload_json,
                   created_at = excluded.created_at,
                   ttl_secs = excluded.ttl_secs,
                   expires_at = excluded.expires_at",
                params![
                    entry.key,
                    entry.provider,
                    entry.term,
                    entry.payload_json,
                    now,
                    ttl,
                    now.saturating_add(ttl)
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Delete every expired row. Returns the number of rows removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM evidence_cache WHERE expires_at <= ?1",
                params![Utc::now().timestamp()],
            )
            .await
            .map_err(storage_err)?;
        tracing::debug!(removed, "purged expired cache rows");
        Ok(removed)
    }

    /// Total rows, fresh or not.
    pub async fn cached_evidence_count(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM evidence_cache", params![])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => row.get::<u64>(0).map_err(storage_err),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("kw_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn write<'a>(key: &'a str, payload: &'a str, ttl_secs: i64) -> CacheWrite<'a> {
        CacheWrite {
            key,
            provider: "perplexity",
            term: "santam",
            payload_json: payload,
            ttl_secs,
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("kw_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let storage = test_storage().await;

        let cached = storage.get_cached_evidence("k1").await.expect("get miss");
        assert!(cached.is_none());

        storage
            .put_cached_evidence(write("k1", "[]", 3600))
            .await
            .expect("put");

        let cached = storage
            .get_cached_evidence("k1")
            .await
            .expect("get hit")
            .expect("row present");
        assert_eq!(cached.provider, "perplexity");
        assert_eq!(cached.term, "santam");
        assert_eq!(cached.payload_json, "[]");
        assert_eq!(cached.ttl_secs, 3600);
    }

    #[tokio::test]
    async fn upsert_overwrites_previous_payload() {
        let storage = test_storage().await;
        storage
            .put_cached_evidence(write("k1", "[1]", 3600))
            .await
            .expect("first put");
        storage
            .put_cached_evidence(write("k1", "[2]", 3600))
            .await
            .expect("second put");

        let cached = storage.get_cached_evidence("k1").await.expect("get");
        assert_eq!(cached.map(|c| c.payload_json).as_deref(), Some("[2]"));
        assert_eq!(storage.cached_evidence_count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn expired_rows_read_as_absent_until_purged() {
        let storage = test_storage().await;
        storage
            .put_cached_evidence(write("old", "[]", 0))
            .await
            .expect("put expired");
        storage
            .put_cached_evidence(write("new", "[]", 3600))
            .await
            .expect("put fresh");

        assert!(storage.get_cached_evidence("old").await.expect("get").is_none());
        assert_eq!(storage.cached_evidence_count().await.expect("count"), 2);

        let removed = storage.purge_expired().await.expect("purge");
        assert_eq!(removed, 1);
        assert_eq!(storage.cached_evidence_count().await.expect("count"), 1);
        assert!(storage.get_cached_evidence("new").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn lazy_expiry_uses_read_time() {
        let storage = test_storage().await;
        storage
            .put_cached_evidence(write("k", "[]", 60))
            .await
            .expect("put");

        let later = Utc::now() + chrono::Duration::seconds(120);
        let cached = storage.get_cached_evidence_at("k", later).await.expect("get");
        assert!(cached.is_none());
    }
}
