//! Runtime configuration from environment variables

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5000/ask";
pub const DEFAULT_USER: &str = "teste";
pub const DEFAULT_REVEAL_INTERVAL: Duration = Duration::from_millis(50);

/// Where conversations are kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    Memory,
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Answer endpoint, receives `POST {question, metadata}`
    pub endpoint: String,
    /// Sent as `metadata.user`
    pub user: String,
    pub store: StoreLocation,
    /// Pause between reveal steps
    pub reveal_interval: Duration,
    /// No timeout when unset
    pub request_timeout: Option<Duration>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user: DEFAULT_USER.to_string(),
            store: StoreLocation::File(default_db_path()),
            reveal_interval: DEFAULT_REVEAL_INTERVAL,
            request_timeout: None,
        }
    }
}

impl ChatConfig {
    /// Read `NOVA_*` variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let store = match lookup("NOVA_DB_PATH").as_deref() {
            Some(":memory:") => StoreLocation::Memory,
            Some(path) if !path.is_empty() => StoreLocation::File(PathBuf::from(path)),
            _ => defaults.store,
        };

        let reveal_interval = lookup("NOVA_REVEAL_INTERVAL_MS")
            .and_then(|v| v.parse().ok())
            .map_or(defaults.reveal_interval, Duration::from_millis);

        let request_timeout = lookup("NOVA_REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs);

        Self {
            endpoint: lookup("NOVA_ENDPOINT")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.endpoint),
            user: lookup("NOVA_USER")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.user),
            store,
            reveal_interval,
            request_timeout,
        }
    }
}

fn default_db_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".nova-chat").join("chat.db")
}
