//! Named response caches on top of SQLite.
//!
//! Caches are registered by name when opened. Entries are written with a single
//! UPSERT inside a transaction, so a reader sees either the previous response or
//! the new one, never a mix. There is no per-entry eviction: caches are dropped
//! as a whole by [`CacheStore::purge_caches_not_in`] or [`CacheStore::clear_all`].

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::entry::{CacheEntry, StoredResponse};
use crate::Error;
use crate::clock::Clock;
use crate::db::StoreDb;

/// Handle to an opened cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheHandle {
    name: String,
}

impl CacheHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Versioned key/response caches with per-entry freshness stamps.
#[derive(Clone, Debug)]
pub struct CacheStore {
    db: StoreDb,
    clock: Arc<dyn Clock>,
    quota_bytes: Option<u64>,
}

/// cache_name, key, status, headers_json, body, digest, stored_at, max_age_secs
type EntryRow = (String, String, i64, String, Vec<u8>, String, String, Option<i64>);

fn digest_of(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Serialization(format!("bad stored_at '{raw}': {e}")))
}

impl CacheStore {
    pub fn new(db: StoreDb, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock, quota_bytes: None }
    }

    /// Cap total body bytes across all caches. Writes past the cap fail with
    /// [`Error::QuotaExceeded`].
    pub fn with_quota(mut self, quota_bytes: Option<u64>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Open (creating if needed) the cache called `name`.
    pub async fn open(&self, name: &str) -> Result<CacheHandle, Error> {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("cache name cannot be empty".into()));
        }
        let name = name.to_string();
        let created_at = self.clock.now().to_rfc3339();
        let handle_name = name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)",
                    params![name, created_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;
        Ok(CacheHandle { name: handle_name })
    }

    /// Look up `key`. Entries whose body no longer matches the recorded digest
    /// are reported as absent.
    pub async fn get(&self, handle: &CacheHandle, key: &str) -> Result<Option<CacheEntry>, Error> {
        let cache_name = handle.name.clone();
        let key = key.to_string();
        let row = self
            .db
            .conn
            .call(move |conn| -> Result<Option<EntryRow>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT cache_name, key, status, headers_json, body, digest, stored_at, max_age_secs
                     FROM cache_entries WHERE cache_name = ?1 AND key = ?2",
                )?;
                let result = stmt.query_row(params![cache_name, key], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                });
                match result {
                    Ok(r) => Ok(Some(r)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        let Some((cache_name, key, status, headers_json, body, digest, stored_at, max_age)) = row else {
            return Ok(None);
        };

        if digest_of(&body) != digest {
            tracing::warn!(cache = %cache_name, key = %key, "cached body does not match digest, ignoring entry");
            return Ok(None);
        }

        let headers: BTreeMap<String, String> = serde_json::from_str(&headers_json)?;
        let status = u16::try_from(status).map_err(|_| Error::Serialization(format!("bad status {status}")))?;

        Ok(Some(CacheEntry {
            key,
            cache_name,
            response: StoredResponse { status, headers, body },
            stored_at: parse_timestamp(&stored_at)?,
            max_age_secs: max_age.map(|m| m.max(0) as u64),
        }))
    }

    /// Store `response` under `key`, stamping the current time as its freshness
    /// origin. Replaces any previous entry for the key.
    pub async fn put(
        &self, handle: &CacheHandle, key: &str, response: &StoredResponse, max_age_secs: Option<u64>,
    ) -> Result<(), Error> {
        let cache_name = handle.name.clone();
        let key = key.to_string();
        let headers_json = serde_json::to_string(&response.headers)?;
        let body = response.body.clone();
        let status = i64::from(response.status);
        let digest = digest_of(&body);
        let stored_at = self.clock.now().to_rfc3339();
        let max_age = max_age_secs.map(|m| m as i64);
        let quota = self.quota_bytes;

        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)",
                    params![cache_name, stored_at],
                )?;

                if let Some(quota) = quota {
                    let used: i64 = tx.query_row(
                        "SELECT COALESCE(SUM(body_size), 0) FROM cache_entries
                         WHERE NOT (cache_name = ?1 AND key = ?2)",
                        params![cache_name, key],
                        |row| row.get(0),
                    )?;
                    let needed = body.len() as u64;
                    let available = quota.saturating_sub(used.max(0) as u64);
                    if needed > available {
                        return Err(Error::QuotaExceeded { needed, available });
                    }
                }

                tx.execute(
                    "INSERT INTO cache_entries (
                        cache_name, key, status, headers_json, body, body_size, digest, stored_at, max_age_secs
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    ON CONFLICT(cache_name, key) DO UPDATE SET
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        body_size = excluded.body_size,
                        digest = excluded.digest,
                        stored_at = excluded.stored_at,
                        max_age_secs = excluded.max_age_secs",
                    params![
                        cache_name,
                        key,
                        status,
                        headers_json,
                        body,
                        body.len() as i64,
                        digest,
                        stored_at,
                        max_age,
                    ],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Remove one entry. Returns whether it existed.
    pub async fn delete(&self, handle: &CacheHandle, key: &str) -> Result<bool, Error> {
        let cache_name = handle.name.clone();
        let key = key.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute(
                    "DELETE FROM cache_entries WHERE cache_name = ?1 AND key = ?2",
                    params![cache_name, key],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Keys in the cache, in first-insertion order.
    pub async fn list_keys(&self, handle: &CacheHandle) -> Result<Vec<String>, Error> {
        let cache_name = handle.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT key FROM cache_entries WHERE cache_name = ?1 ORDER BY rowid")?;
                let keys = stmt
                    .query_map(params![cache_name], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    /// Names of every cache currently registered.
    pub async fn cache_names(&self) -> Result<Vec<String>, Error> {
        self.db
            .conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM caches ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Drop every cache whose name is not in `active`, with all of its entries.
    ///
    /// Returns the names that were purged.
    pub async fn purge_caches_not_in(&self, active: &[String]) -> Result<Vec<String>, Error> {
        let active = active.to_vec();
        let purged = self
            .db
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let tx = conn.transaction()?;
                let existing = {
                    let mut stmt = tx.prepare("SELECT name FROM caches")?;
                    let names = stmt
                        .query_map([], |row| row.get::<_, String>(0))?
                        .collect::<Result<Vec<String>, _>>()?;
                    names
                };
                let stale: Vec<String> = existing.into_iter().filter(|n| !active.contains(n)).collect();
                for name in &stale {
                    tx.execute("DELETE FROM cache_entries WHERE cache_name = ?1", params![name])?;
                    tx.execute("DELETE FROM caches WHERE name = ?1", params![name])?;
                }
                tx.commit()?;
                Ok(stale)
            })
            .await
            .map_err(Error::from)?;

        if !purged.is_empty() {
            tracing::info!(purged = ?purged, "purged caches from previous generations");
        }
        Ok(purged)
    }

    /// Drop every cache. Returns the number of caches removed.
    pub async fn clear_all(&self) -> Result<usize, Error> {
        Ok(self.purge_caches_not_in(&[]).await?.len())
    }

    /// Total body bytes held across all caches.
    pub async fn total_size(&self) -> Result<u64, Error> {
        self.db
            .conn
            .call(|conn| -> Result<u64, Error> {
                let size: i64 =
                    conn.query_row("SELECT COALESCE(SUM(body_size), 0) FROM cache_entries", [], |row| row.get(0))?;
                Ok(size.max(0) as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::names::{CacheKind, CacheNames};
    use crate::clock::{ManualClock, SystemClock};
    use chrono::Duration;

    async fn store() -> CacheStore {
        let db = StoreDb::open_in_memory().await.unwrap();
        CacheStore::new(db, Arc::new(SystemClock))
    }

    fn css(body: &str) -> StoredResponse {
        StoredResponse::new(200, body.as_bytes().to_vec()).with_header("content-type", "text/css")
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = store().await;
        let cache = store.open("static-v1.2.0").await.unwrap();
        let key = "https://app.example/assets/app.css";

        store.put(&cache, key, &css("body{}"), Some(60)).await.unwrap();

        let entry = store.get(&cache, key).await.unwrap().unwrap();
        assert_eq!(entry.response.body, b"body{}");
        assert_eq!(entry.response.content_type(), Some("text/css"));
        assert_eq!(entry.max_age_secs, Some(60));
        assert_eq!(entry.kind(), Some(CacheKind::Static));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = store().await;
        let cache = store.open("data-v1").await.unwrap();
        assert!(store.get(&cache, "https://app.example/nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entries_scoped_to_cache() {
        let store = store().await;
        let a = store.open("data-v1").await.unwrap();
        let b = store.open("images-v1").await.unwrap();
        store.put(&a, "k", &css("a"), None).await.unwrap();
        assert!(store.get(&b, "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_stamps_clock_time() {
        let db = StoreDb::open_in_memory().await.unwrap();
        let t0 = Utc::now() - Duration::days(3);
        let clock = Arc::new(ManualClock::new(t0));
        let store = CacheStore::new(db, clock.clone());
        let cache = store.open("static-v1").await.unwrap();

        // A Date header far in the past must not influence the stamp.
        let response = css("x").with_header("date", "Thu, 01 Jan 1970 00:00:00 GMT");
        store.put(&cache, "k", &response, Some(2)).await.unwrap();

        let entry = store.get(&cache, "k").await.unwrap().unwrap();
        assert_eq!(entry.stored_at.timestamp(), t0.timestamp());
        clock.advance(Duration::seconds(3));
        assert!(entry.is_expired(clock.now()));
    }

    #[tokio::test]
    async fn test_overwrite_keeps_key_order() {
        let store = store().await;
        let cache = store.open("data-v1").await.unwrap();
        store.put(&cache, "first", &css("1"), None).await.unwrap();
        store.put(&cache, "second", &css("2"), None).await.unwrap();
        store.put(&cache, "first", &css("1b"), None).await.unwrap();

        assert_eq!(store.list_keys(&cache).await.unwrap(), vec!["first", "second"]);
        let entry = store.get(&cache, "first").await.unwrap().unwrap();
        assert_eq!(entry.response.body, b"1b");
    }

    #[tokio::test]
    async fn test_delete() {
        let store = store().await;
        let cache = store.open("data-v1").await.unwrap();
        store.put(&cache, "k", &css("1"), None).await.unwrap();
        assert!(store.delete(&cache, "k").await.unwrap());
        assert!(!store.delete(&cache, "k").await.unwrap());
        assert!(store.list_keys(&cache).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_purge_caches_not_in() {
        let store = store().await;
        let old = CacheNames::for_version("1.2.0");
        let new = CacheNames::for_version("1.3.0");
        for name in old.all().iter().chain(new.all().iter()) {
            let cache = store.open(name).await.unwrap();
            store.put(&cache, "k", &css("x"), None).await.unwrap();
        }

        let mut purged = store.purge_caches_not_in(&new.all()).await.unwrap();
        purged.sort();
        let mut expected = old.all();
        expected.sort();
        assert_eq!(purged, expected);

        let mut remaining = store.cache_names().await.unwrap();
        remaining.sort();
        let mut active = new.all();
        active.sort();
        assert_eq!(remaining, active);
        assert_eq!(store.total_size().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_clear_all_and_total_size() {
        let store = store().await;
        let a = store.open("static-v1").await.unwrap();
        let b = store.open("images-v1").await.unwrap();
        store.put(&a, "a", &css("12345"), None).await.unwrap();
        store.put(&b, "b", &css("123"), None).await.unwrap();
        assert_eq!(store.total_size().await.unwrap(), 8);

        assert_eq!(store.clear_all().await.unwrap(), 2);
        assert_eq!(store.total_size().await.unwrap(), 0);
        assert!(store.cache_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_quota_exceeded_leaves_previous_entry() {
        let db = StoreDb::open_in_memory().await.unwrap();
        let store = CacheStore::new(db, Arc::new(SystemClock)).with_quota(Some(10));
        let cache = store.open("images-v1").await.unwrap();

        store.put(&cache, "small", &css("123456"), None).await.unwrap();
        let err = store.put(&cache, "big", &css("123456"), None).await.unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded { needed: 6, available: 4 }));
        assert!(store.get(&cache, "big").await.unwrap().is_none());

        // Replacing an entry only counts the difference.
        store.put(&cache, "small", &css("1234567890"), None).await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupted_body_reads_as_absent() {
        let store = store().await;
        let cache = store.open("data-v1").await.unwrap();
        store.put(&cache, "k", &css("original"), None).await.unwrap();

        store
            .db
            .conn
            .call(|conn| conn.execute("UPDATE cache_entries SET body = x'00'", []))
            .await
            .unwrap();

        assert!(store.get(&cache, "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_rejects_empty_name() {
        let store = store().await;
        assert!(matches!(store.open("  ").await, Err(Error::InvalidInput(_))));
    }
}
