//! Conversation and message records
//!
//! These are the shapes kept in memory by the state machine and written to
//! the local store. Field names serialize in camelCase so stored threads stay
//! readable by other clients of the same store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Title given to a conversation until it is renamed
pub const DEFAULT_TITLE: &str = "Nova Conversa";

/// Longest auto-derived title, in characters, before truncation
pub const MAX_AUTO_TITLE_CHARS: usize = 50;

/// Generate an opaque identifier for conversations and messages
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Derive a conversation title from the first message of a thread.
///
/// Text longer than [`MAX_AUTO_TITLE_CHARS`] characters is cut and gets an
/// ellipsis appended.
pub fn auto_title(text: &str) -> String {
    if text.chars().count() > MAX_AUTO_TITLE_CHARS {
        let head: String = text.chars().take(MAX_AUTO_TITLE_CHARS).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

// ============================================================================
// Conversation
// ============================================================================

/// A named, timestamped thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// A fresh conversation with the default title
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: generate_id(),
            title: DEFAULT_TITLE.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_TITLE
    }

    /// Copy of this conversation with a new title
    #[must_use]
    pub fn renamed(&self, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            updated_at: now,
            ..self.clone()
        }
    }
}

// ============================================================================
// Message
// ============================================================================

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Delivery status of a user message.
///
/// `Pending` only ever moves to `Sent` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Sent,
    Failed,
}

/// Classification of an assistant reply
///
/// Unrecognized values read as `Generic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Db,
    Docs,
    #[default]
    #[serde(other)]
    Generic,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Generic => write!(f, "generic"),
            Intent::Db => write!(f, "db"),
            Intent::Docs => write!(f, "docs"),
        }
    }
}

/// Tabular result of a database question
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DbResult {
    pub sql: Option<String>,
    pub params: Map<String, Value>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Documents consulted to answer a question
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocsResult {
    pub files: Vec<String>,
}

/// Structured payload of an answered question, keyed by intent
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyPayload {
    Generic,
    Db(DbResult),
    Docs(DocsResult),
}

impl ReplyPayload {
    pub fn intent(&self) -> Intent {
        match self {
            ReplyPayload::Generic => Intent::Generic,
            ReplyPayload::Db(_) => Intent::Db,
            ReplyPayload::Docs(_) => Intent::Docs,
        }
    }
}

/// Application-level error carried by an assistant reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyError {
    pub intent: Intent,
    pub message: String,
}

/// One entry of a conversation thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredMessage", into = "StoredMessage")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub reply: Option<ReplyPayload>,
    pub error: Option<ReplyError>,
    pub status: Option<MessageStatus>,
}

impl Message {
    /// A user message awaiting delivery
    pub fn user(content: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: generate_id(),
            role: Role::User,
            content: content.into(),
            created_at: now,
            reply: None,
            error: None,
            status: Some(MessageStatus::Pending),
        }
    }

    /// An answered assistant reply
    pub fn answer(
        id: impl Into<String>,
        content: impl Into<String>,
        payload: ReplyPayload,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: content.into(),
            created_at: now,
            reply: Some(payload),
            error: None,
            status: None,
        }
    }

    /// An assistant reply reporting an application-level error
    pub fn error_reply(id: impl Into<String>, error: ReplyError, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: error.message.clone(),
            created_at: now,
            reply: None,
            error: Some(error),
            status: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_failed(&self) -> bool {
        self.status == Some(MessageStatus::Failed)
    }

    /// Intent of the reply, if this is an assistant message
    pub fn intent(&self) -> Option<Intent> {
        self.reply
            .as_ref()
            .map(ReplyPayload::intent)
            .or_else(|| self.error.as_ref().map(|e| e.intent))
    }

    /// Copy of this message with a new delivery status
    #[must_use]
    pub fn with_status(&self, status: MessageStatus) -> Self {
        Self {
            status: Some(status),
            ..self.clone()
        }
    }

    /// Copy of this message with different text
    #[must_use]
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..self.clone()
        }
    }
}

// ============================================================================
// Stored form
// ============================================================================

/// A message as kept in the store.
///
/// Assistant replies carry `intent` at the top level. Answers add `metadata`
/// (possibly empty); error replies have no metadata and keep the error text
/// as their content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredMessage {
    id: String,
    role: Role,
    content: String,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    intent: Option<Intent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<StoredMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<MessageStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rows: Option<Vec<Vec<Value>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    files: Option<Vec<String>>,
}

impl StoredMetadata {
    fn into_payload(self, intent: Intent) -> ReplyPayload {
        match intent {
            Intent::Generic => ReplyPayload::Generic,
            Intent::Db => ReplyPayload::Db(DbResult {
                sql: self.sql,
                params: self.params.unwrap_or_default(),
                columns: self.columns.unwrap_or_default(),
                rows: self.rows.unwrap_or_default(),
            }),
            Intent::Docs => ReplyPayload::Docs(DocsResult {
                files: self.files.unwrap_or_default(),
            }),
        }
    }
}

impl From<ReplyPayload> for StoredMetadata {
    fn from(payload: ReplyPayload) -> Self {
        match payload {
            ReplyPayload::Generic => Self::default(),
            ReplyPayload::Db(result) => Self {
                sql: result.sql,
                params: (!result.params.is_empty()).then_some(result.params),
                columns: Some(result.columns),
                rows: Some(result.rows),
                files: None,
            },
            ReplyPayload::Docs(result) => Self {
                files: Some(result.files),
                ..Self::default()
            },
        }
    }
}

impl From<Message> for StoredMessage {
    fn from(message: Message) -> Self {
        let (intent, ok, error, metadata) = match (message.reply, message.error) {
            (_, Some(error)) => (Some(error.intent), Some(false), Some(error.message), None),
            (Some(payload), None) => (
                Some(payload.intent()),
                Some(true),
                None,
                Some(StoredMetadata::from(payload)),
            ),
            (None, None) => (None, None, None, None),
        };
        Self {
            id: message.id,
            role: message.role,
            content: message.content,
            created_at: message.created_at,
            intent,
            ok,
            error,
            metadata,
            status: message.status,
        }
    }
}

impl From<StoredMessage> for Message {
    fn from(stored: StoredMessage) -> Self {
        let (reply, error) = match (stored.role, stored.intent) {
            (Role::Assistant, Some(intent)) => {
                // Older records mark errors only by the missing metadata
                let failed = stored.ok == Some(false)
                    || stored.error.is_some()
                    || (stored.ok.is_none() && stored.metadata.is_none());
                if failed {
                    let message = stored.error.unwrap_or_else(|| stored.content.clone());
                    (None, Some(ReplyError { intent, message }))
                } else {
                    let metadata = stored.metadata.unwrap_or_default();
                    (Some(metadata.into_payload(intent)), None)
                }
            }
            _ => (None, None),
        };
        Self {
            id: stored.id,
            role: stored.role,
            content: stored.content,
            created_at: stored.created_at,
            reply,
            error,
            status: stored.status,
        }
    }
}
