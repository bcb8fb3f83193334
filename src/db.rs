//! Persistence gateways for task collections
//!
//! Collections are stored whole, as JSON, under a namespaced key.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::Context;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{Result, TaskError};
use crate::models::TaskCollection;

/// Key-value storage for task collections
pub trait PersistenceGateway: Send + Sync {
    /// Load the collection stored under `key`; `NotFound` on first use
    fn load(&self, key: &str) -> Result<TaskCollection>;

    /// Replace whatever is stored under `key`
    fn save(&self, key: &str, collection: &TaskCollection) -> Result<()>;
}

/// Thread-safe SQLite gateway
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(path).context("Failed to open database")?;
        Self::with_connection(conn)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> anyhow::Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init().context("Failed to initialize database schema")?;
        Ok(db)
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TaskError::Storage("database lock poisoned".to_string()))
    }

    /// Keys of every stored collection
    pub fn keys(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT key FROM collections ORDER BY key")?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}

impl PersistenceGateway for Database {
    fn load(&self, key: &str) -> Result<TaskCollection> {
        let conn = self.lock()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM collections WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(payload) => Ok(serde_json::from_str(&payload)?),
            None => Err(TaskError::not_found(format!("collection '{key}'"))),
        }
    }

    fn save(&self, key: &str, collection: &TaskCollection) -> Result<()> {
        let payload = serde_json::to_string(collection)?;
        let conn = self.lock()?;
        conn.execute(
            r#"INSERT INTO collections (key, payload, updated_at) VALUES (?1, ?2, ?3)
               ON CONFLICT(key) DO UPDATE SET payload = excluded.payload,
               updated_at = excluded.updated_at"#,
            params![key, payload, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

/// Process-local gateway, used for tests and ephemeral servers
#[derive(Default)]
pub struct MemoryGateway {
    collections: Mutex<HashMap<String, TaskCollection>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, TaskCollection>>> {
        self.collections
            .lock()
            .map_err(|_| TaskError::Storage("memory store lock poisoned".to_string()))
    }
}

impl PersistenceGateway for MemoryGateway {
    fn load(&self, key: &str) -> Result<TaskCollection> {
        self.lock()?
            .get(key)
            .cloned()
            .ok_or_else(|| TaskError::not_found(format!("collection '{key}'")))
    }

    fn save(&self, key: &str, collection: &TaskCollection) -> Result<()> {
        self.lock()?.insert(key.to_string(), collection.clone());
        Ok(())
    }
}
