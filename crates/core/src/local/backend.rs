//! Durable key-value backends for the local data store.

use async_trait::async_trait;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use crate::Error;
use crate::db::StoreDb;

/// Durable storage behind [`super::LocalDataStore`].
///
/// Values are JSON text. Implementations only need to make a single `write`
/// atomic; batching happens above this layer.
#[async_trait]
pub trait KvBackend: Send + Sync + 'static {
    async fn read(&self, key: &str) -> Result<Option<String>, Error>;

    async fn write(&self, key: &str, value: &str) -> Result<(), Error>;
}

#[async_trait]
impl KvBackend for StoreDb {
    async fn read(&self, key: &str) -> Result<Option<String>, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let result =
                    conn.query_row("SELECT value FROM kv_store WHERE key = ?1", params![key], |row| row.get(0));
                match result {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), Error> {
        let key = key.to_string();
        let value = value.to_string();
        let updated_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    params![key, value, updated_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_read_write() {
        let db = StoreDb::open_in_memory().await.unwrap();
        assert_eq!(db.read("waste-entries").await.unwrap(), None);

        db.write("waste-entries", "[]").await.unwrap();
        db.write("waste-entries", "[1]").await.unwrap();

        assert_eq!(db.read("waste-entries").await.unwrap().as_deref(), Some("[1]"));
    }
}
