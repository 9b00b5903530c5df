use super::{OffsetStore, RegistryError};
use async_trait::async_trait;
use duckdb::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// DuckDB-backed offset registry.
///
/// The stored value is a base-10 ASCII string, not a binary integer;
/// that textual encoding is part of the persisted-state contract.
pub struct DuckDbRegistry {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbRegistry {
    /// Open (or create) the registry database file. Fails if the file
    /// cannot be created or is locked by another process.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| RegistryError::Open(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory registry, for tests.
    pub fn in_memory() -> Result<Self, RegistryError> {
        let conn =
            Connection::open_in_memory().map_err(|e| RegistryError::Open(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn init_schema(&self) -> Result<(), RegistryError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "CREATE TABLE IF NOT EXISTS offsets (
                    source VARCHAR PRIMARY KEY,
                    byte_offset VARCHAR NOT NULL
                )",
                [],
            )
            .map_err(|e| RegistryError::Open(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| RegistryError::Open(e.to_string()))?
    }
}

#[async_trait]
impl OffsetStore for DuckDbRegistry {
    async fn get_offset(&self, source: &str) -> Result<u64, RegistryError> {
        let conn = self.conn.clone();
        let source = source.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let value: String = conn
                .query_row(
                    "SELECT byte_offset FROM offsets WHERE source = ?",
                    params![source],
                    |row| row.get(0),
                )
                .map_err(|e| match e {
                    duckdb::Error::QueryReturnedNoRows => RegistryError::NotFound(source.clone()),
                    other => RegistryError::Get(other.to_string()),
                })?;

            value
                .parse::<u64>()
                .map_err(|_| RegistryError::NotFound(source.clone()))
        })
        .await
        .map_err(|e| RegistryError::Get(e.to_string()))?
    }

    async fn update_offset(&self, source: &str, offset: u64) -> Result<(), RegistryError> {
        let conn = self.conn.clone();
        let source = source.to_string();
        let value = offset.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "INSERT INTO offsets (source, byte_offset) VALUES (?, ?)
                 ON CONFLICT (source) DO UPDATE SET byte_offset = EXCLUDED.byte_offset",
                params![source, value],
            )
            .map_err(|e| RegistryError::Update(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| RegistryError::Update(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> DuckDbRegistry {
        let registry = DuckDbRegistry::in_memory().unwrap();
        registry.init_schema().await.unwrap();
        registry
    }

    #[tokio::test]
    async fn missing_source_is_not_found() {
        let registry = setup().await;
        let err = registry.get_offset("/var/log/missing.log").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_then_get_round_trips() {
        let registry = setup().await;
        registry.update_offset("/var/log/a.log", 1234).await.unwrap();
        assert_eq!(registry.get_offset("/var/log/a.log").await.unwrap(), 1234);
    }

    #[tokio::test]
    async fn update_overwrites_existing_entry() {
        let registry = setup().await;
        registry.update_offset("/var/log/a.log", 10).await.unwrap();
        registry.update_offset("/var/log/a.log", 20).await.unwrap();
        assert_eq!(registry.get_offset("/var/log/a.log").await.unwrap(), 20);
    }

    #[tokio::test]
    async fn stores_offset_as_decimal_string() {
        let registry = setup().await;
        registry.update_offset("/var/log/a.log", 42).await.unwrap();

        let raw: String = {
            let conn = registry.conn.lock().unwrap();
            conn.query_row(
                "SELECT byte_offset FROM offsets WHERE source = ?",
                params!["/var/log/a.log"],
                |row| row.get(0),
            )
            .unwrap()
        };
        assert_eq!(raw, "42");
    }

    #[tokio::test]
    async fn unparseable_value_reads_as_not_found() {
        let registry = setup().await;
        {
            let conn = registry.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO offsets (source, byte_offset) VALUES (?, ?)",
                params!["/var/log/bad.log", "not-a-number"],
            )
            .unwrap();
        }

        let err = registry.get_offset("/var/log/bad.log").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn concurrent_updates_touch_disjoint_keys() {
        let registry = Arc::new(setup().await);

        let mut handles = Vec::new();
        for i in 0u64..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let source = format!("/var/log/worker-{i}.log");
                registry.update_offset(&source, i * 100).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0u64..8 {
            let source = format!("/var/log/worker-{i}.log");
            assert_eq!(registry.get_offset(&source).await.unwrap(), i * 100);
        }
    }
}
