// SPDX-License-Identifier: MPL-2.0

use crate::store::schema::SCHEMA;
use crate::store::{
    Callback, Document, DocumentStore, Listeners, StoreError, Subscription, increment_field,
    merge_fields,
};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Document store persisted in SQLite.
///
/// Each write is a read-modify-write inside one transaction, so increments
/// are atomic with respect to other writers on the same handle.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    listeners: Listeners,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Path(format!("failed to create data dir: {}", e)))?;
        }

        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened document database");
        Self::with_connection(conn)
    }

    /// Open the per-user database under the XDG data directory
    pub fn open_default(user_id: &str) -> Result<Self, StoreError> {
        Self::open(&Self::default_path(user_id)?)
    }

    /// Throwaway database, used by tests and previews
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            listeners: Listeners::default(),
        })
    }

    /// Run schema migrations
    fn migrate(conn: &Connection) -> Result<(), StoreError> {
        // Execute the schema (all CREATE IF NOT EXISTS)
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Path: ~/.local/share/reflections/{user_id}/documents.db
    pub fn default_path(user_id: &str) -> Result<PathBuf, StoreError> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| StoreError::Path("could not find data directory".to_string()))?;

        // Keep the id filesystem-safe
        let safe_id: String = user_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();

        Ok(data_dir.join("reflections").join(safe_id).join("documents.db"))
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.listeners.len()
    }

    /// Get current unix timestamp
    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    /// Run blocking database work off the async executor
    async fn blocking<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().expect("document db lock poisoned");
            work(&mut *conn)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("database task failed: {}", e)))?
    }

    fn read(
        conn: &Connection,
        collection: &str,
        id: &str,
    ) -> Result<(u64, Option<Document>), StoreError> {
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT body, version FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((body, version)) = row else {
            return Ok((0, None));
        };

        match serde_json::from_str::<serde_json::Value>(&body)? {
            serde_json::Value::Object(doc) => Ok((version.max(0) as u64, Some(doc))),
            _ => Err(StoreError::Malformed {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
        }
    }

    /// Read-modify-write one document in a transaction
    fn write(
        conn: &mut Connection,
        collection: &str,
        id: &str,
        apply: impl FnOnce(&mut Document),
    ) -> Result<(u64, Document), StoreError> {
        let tx = conn.transaction()?;
        let (version, existing) = Self::read(&tx, collection, id)?;
        let mut doc = existing.unwrap_or_default();
        apply(&mut doc);
        let version = version + 1;

        tx.execute(
            r#"
            INSERT INTO documents (collection, id, body, version, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(collection, id) DO UPDATE SET
                body = excluded.body,
                version = excluded.version,
                updated_at = excluded.updated_at
            "#,
            params![
                collection,
                id,
                serde_json::to_string(&doc)?,
                version as i64,
                Self::now()
            ],
        )?;

        tx.commit()?;
        Ok((version, doc))
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let (collection, id) = (collection.to_string(), id.to_string());
        let (_, doc) = self
            .blocking(move |conn| Self::read(conn, &collection, &id))
            .await?;
        Ok(doc)
    }

    async fn set(&self, collection: &str, id: &str, fields: Document) -> Result<(), StoreError> {
        let (c, i) = (collection.to_string(), id.to_string());
        let (version, doc) = self
            .blocking(move |conn| Self::write(conn, &c, &i, |doc| merge_fields(doc, fields)))
            .await?;
        self.listeners.notify(collection, id, version, Some(&doc));
        Ok(())
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<(), StoreError> {
        let (c, i, f) = (collection.to_string(), id.to_string(), field.to_string());
        let (version, doc) = self
            .blocking(move |conn| {
                Self::write(conn, &c, &i, |doc| {
                    increment_field(doc, &f, delta);
                })
            })
            .await?;
        self.listeners.notify(collection, id, version, Some(&doc));
        Ok(())
    }

    async fn subscribe(
        &self,
        collection: &str,
        id: &str,
        callback: Callback,
    ) -> Result<Subscription, StoreError> {
        let (listener, subscription) = self.listeners.register(collection, id, callback);
        let (c, i) = (collection.to_string(), id.to_string());
        let (version, doc) = self
            .blocking(move |conn| Self::read(conn, &c, &i))
            .await?;
        Listeners::deliver_initial(&listener, version, doc.as_ref());
        Ok(subscription)
    }
}
