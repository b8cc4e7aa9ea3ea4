//! Local persistence for conversations and messages
//!
//! Two independent key spaces live in a key/value store: one list of
//! conversations, and one message list per conversation id. Every write
//! replaces the whole entry. Nothing links a conversation-list write to its
//! message-list write; callers do both.
//!
//! When no store is available every read is empty and every write is a
//! no-op. Store failures are logged and degrade the same way, so nothing in
//! here ever fails the caller.

mod schema;

pub use schema::{messages_key, CONVERSATIONS_KEY, MESSAGES_KEY};

use crate::config::StoreLocation;
use crate::model::{Conversation, Message};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Malformed stored value: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Cannot create store directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// String key/value store with whole-value writes
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    fn remove(&self, key: &str) -> StorageResult<()>;
}

// ============================================================================
// SQLite-backed store
// ============================================================================

/// Thread-safe SQLite key/value store
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.run_migrations()?;
        Ok(store)
    }

    /// Open an in-memory store
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> StorageResult<()> {
        self.lock().execute_batch(schema::SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self.lock();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

// ============================================================================
// Persistence adapter
// ============================================================================

/// Reads and writes conversation and message lists
#[derive(Clone)]
pub struct ChatStore {
    backend: Option<Arc<dyn KeyValueStore>>,
}

impl ChatStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Open the configured store, degrading to [`ChatStore::unavailable`]
    /// when it cannot be opened
    pub fn open(location: &StoreLocation) -> Self {
        let opened = match location {
            StoreLocation::File(path) => {
                tracing::info!(path = %path.display(), "Opening chat store");
                SqliteStore::open(path)
            }
            StoreLocation::Memory => SqliteStore::open_in_memory(),
        };
        match opened {
            Ok(store) => Self::new(Arc::new(store)),
            Err(e) => {
                tracing::warn!(error = %e, "Chat store unavailable, history will not be kept");
                Self::unavailable()
            }
        }
    }

    /// Adapter with no backing store: reads are empty, writes do nothing
    pub fn unavailable() -> Self {
        Self { backend: None }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// All stored conversations, in stored order
    pub fn get_conversations(&self) -> Vec<Conversation> {
        self.read_list(CONVERSATIONS_KEY)
    }

    /// Insert the conversation, or replace the stored one with the same id
    pub fn save_conversation(&self, conversation: &Conversation) {
        let Some(backend) = &self.backend else {
            return;
        };
        let mut conversations = self.get_conversations();
        match conversations.iter_mut().find(|c| c.id == conversation.id) {
            Some(existing) => *existing = conversation.clone(),
            None => conversations.push(conversation.clone()),
        }
        if let Err(e) = write_json(backend.as_ref(), CONVERSATIONS_KEY, &conversations) {
            tracing::warn!(conv_id = %conversation.id, error = %e, "Failed to save conversation");
        }
    }

    /// Remove the conversation record and its message list
    pub fn delete_conversation(&self, id: &str) {
        let Some(backend) = &self.backend else {
            return;
        };
        let conversations: Vec<Conversation> = self
            .get_conversations()
            .into_iter()
            .filter(|c| c.id != id)
            .collect();
        if let Err(e) = write_json(backend.as_ref(), CONVERSATIONS_KEY, &conversations) {
            tracing::warn!(conv_id = %id, error = %e, "Failed to rewrite conversation list");
        }
        if let Err(e) = backend.remove(&messages_key(id)) {
            tracing::warn!(conv_id = %id, error = %e, "Failed to remove messages");
        }
    }

    /// Messages of a conversation, in chronological order
    pub fn get_messages(&self, conversation_id: &str) -> Vec<Message> {
        self.read_list(&messages_key(conversation_id))
    }

    /// Replace the message list of a conversation
    pub fn save_messages(&self, conversation_id: &str, messages: &[Message]) {
        let Some(backend) = &self.backend else {
            return;
        };
        if let Err(e) = write_json(backend.as_ref(), &messages_key(conversation_id), messages) {
            tracing::warn!(conv_id = %conversation_id, error = %e, "Failed to save messages");
        }
    }

    fn read_list<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let Some(backend) = &self.backend else {
            return Vec::new();
        };
        match read_json(backend.as_ref(), key) {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to read stored list");
                Vec::new()
            }
        }
    }
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::unavailable()
    }
}

fn read_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> StorageResult<Option<T>> {
    match store.get(key)? {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

fn write_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let text = serde_json::to_string(value)?;
    store.set(key, &text)
}
