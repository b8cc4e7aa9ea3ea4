//! Local store schema and key layout

/// SQL schema for initialization
///
/// The store is a flat key/value table, mirroring browser local storage:
/// each key holds one JSON document that is always rewritten whole.
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// Key holding the JSON array of conversations
pub const CONVERSATIONS_KEY: &str = "chat-conversations";

/// Prefix of the per-conversation message list keys
pub const MESSAGES_KEY: &str = "chat-messages";

/// Key holding the messages of one conversation
pub fn messages_key(conversation_id: &str) -> String {
    format!("{MESSAGES_KEY}-{conversation_id}")
}
