// Credential persistence
// One record per user id, last write wins

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::types::CredentialRecord;

/// Key-value store for per-user credentials
///
/// A completed `put` must be visible to any `get` for the same key issued
/// after it returns.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert or overwrite the credential for `user_id`
    async fn put(&self, user_id: &str, record: CredentialRecord) -> Result<()>;

    /// Fetch the credential for `user_id`, `None` when the user never connected
    async fn get(&self, user_id: &str) -> Result<Option<CredentialRecord>>;
}

/// Process-local store backed by a concurrent map
#[derive(Default, Clone)]
pub struct MemoryCredentialStore {
    records: Arc<DashMap<String, CredentialRecord>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn put(&self, user_id: &str, record: CredentialRecord) -> Result<()> {
        self.records.insert(user_id.to_string(), record);
        Ok(())
    }

    async fn get(&self, user_id: &str) -> Result<Option<CredentialRecord>> {
        Ok(self.records.get(user_id).map(|entry| entry.value().clone()))
    }
}

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS notion_tokens (
    user_id TEXT PRIMARY KEY,
    access_token TEXT NOT NULL,
    workspace_id TEXT,
    workspace_name TEXT,
    bot_id TEXT,
    updated_at TEXT NOT NULL
)";

const UPSERT_SQL: &str = "INSERT INTO notion_tokens
    (user_id, access_token, workspace_id, workspace_name, bot_id, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
    ON CONFLICT(user_id) DO UPDATE SET
        access_token = excluded.access_token,
        workspace_id = excluded.workspace_id,
        workspace_name = excluded.workspace_name,
        bot_id = excluded.bot_id,
        updated_at = excluded.updated_at";

const SELECT_SQL: &str = "SELECT access_token, workspace_id, workspace_name, bot_id, updated_at
    FROM notion_tokens WHERE user_id = ?1";

/// SQLite-backed store; statements run on the blocking pool
#[derive(Clone)]
pub struct SqliteCredentialStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCredentialStore {
    /// Open (or create) the database file and ensure the table exists
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(CREATE_TABLE_SQL, [])
            .context("Failed to create notion_tokens table")?;
        tracing::info!("Table `notion_tokens` is ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| anyhow!("credential database lock poisoned"))?;
            f(&guard)
        })
        .await
        .context("Credential database task panicked")?
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn put(&self, user_id: &str, record: CredentialRecord) -> Result<()> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                UPSERT_SQL,
                params![
                    user_id,
                    record.access_token,
                    record.workspace_id,
                    record.workspace_name,
                    record.bot_id,
                    record.updated_at.to_rfc3339(),
                ],
            )
            .context("Failed to upsert credential")?;
            Ok(())
        })
        .await
    }

    async fn get(&self, user_id: &str) -> Result<Option<CredentialRecord>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(SELECT_SQL, params![user_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })
                .optional()
                .context("Failed to load credential")?;

            row.map(
                |(access_token, workspace_id, workspace_name, bot_id, updated_at)| -> Result<CredentialRecord> {
                    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
                        .map(|dt| dt.with_timezone(&Utc))
                        .with_context(|| format!("Failed to parse updated_at: {}", updated_at))?;
                    Ok(CredentialRecord {
                        access_token,
                        workspace_id,
                        workspace_name,
                        bot_id,
                        updated_at,
                    })
                },
            )
            .transpose()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_memory_store_get_missing() {
        let store = MemoryCredentialStore::new();
        assert!(store.get("nobody").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_overwrites() {
        let store = MemoryCredentialStore::new();
        store.put("u1", CredentialRecord::new("first")).await.unwrap();
        store.put("u1", CredentialRecord::new("second")).await.unwrap();

        let record = store.get("u1").await.unwrap().unwrap();
        assert_eq!(record.access_token, "second");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_store_roundtrip_and_overwrite() {
        let store = SqliteCredentialStore::open_in_memory().unwrap();
        assert!(store.get("u1").await.unwrap().is_none());

        let mut record = CredentialRecord::new("secret_abc");
        record.workspace_name = Some("Acme".to_string());
        store.put("u1", record.clone()).await.unwrap();

        let loaded = store.get("u1").await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "secret_abc");
        assert_eq!(loaded.workspace_name.as_deref(), Some("Acme"));
        assert_eq!(loaded.updated_at.timestamp(), record.updated_at.timestamp());

        store.put("u1", CredentialRecord::new("secret_xyz")).await.unwrap();
        let loaded = store.get("u1").await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "secret_xyz");
        assert!(loaded.workspace_name.is_none());
    }

    #[tokio::test]
    async fn test_sqlite_store_reopens_file() {
        let path = std::env::temp_dir().join(format!("notion-gateway-{}.db", uuid::Uuid::new_v4()));

        {
            let store = SqliteCredentialStore::open(&path).unwrap();
            store.put("u1", CredentialRecord::new("persisted")).await.unwrap();
        }

        let store = SqliteCredentialStore::open(&path).unwrap();
        let loaded = store.get("u1").await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "persisted");

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_do_not_cross_contaminate() {
        let stores: Vec<Arc<dyn CredentialStore>> = vec![
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(SqliteCredentialStore::open_in_memory().unwrap()),
        ];

        for store in stores {
            let mut handles = Vec::new();
            for i in 0..32 {
                let store = Arc::clone(&store);
                handles.push(tokio::spawn(async move {
                    let user = format!("u{}", i % 8);
                    let token = format!("token-for-{}-{}", user, i);
                    store.put(&user, CredentialRecord::new(token)).await
                }));
            }
            for handle in handles {
                handle.await.unwrap().unwrap();
            }

            for i in 0..8 {
                let user = format!("u{}", i);
                let record = store.get(&user).await.unwrap().unwrap();
                assert!(
                    record.access_token.starts_with(&format!("token-for-{}-", user)),
                    "{} got {}",
                    user,
                    record.access_token
                );
            }
        }
    }

    proptest! {
        #[test]
        fn prop_each_user_reads_its_own_last_write(
            writes in proptest::collection::vec(("[a-d]{1,2}", "[a-z0-9]{1,12}"), 1..40)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let store = MemoryCredentialStore::new();
            let mut expected = HashMap::new();

            rt.block_on(async {
                for (user, token) in &writes {
                    store.put(user, CredentialRecord::new(token.clone())).await.unwrap();
                    expected.insert(user.clone(), token.clone());
                }
            });

            for (user, token) in &expected {
                let record = rt.block_on(store.get(user)).unwrap().unwrap();
                prop_assert_eq!(&record.access_token, token);
            }
            prop_assert_eq!(store.len(), expected.len());
        }
    }
}
