//! Events that drive the chat state

use crate::client::AskResponse;
use crate::model::{Conversation, Message};
use chrono::{DateTime, Utc};

/// Events that trigger state transitions
///
/// Identifiers and timestamps are supplied by whoever raises the event, so
/// the transition itself stays deterministic.
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    NewChat {
        conversation: Conversation,
    },
    LoadConversation {
        id: String,
        /// Stored messages of that conversation
        messages: Vec<Message>,
    },
    Send {
        message: Message,
    },
    Retry {
        message_id: String,
    },
    Rename {
        id: String,
        title: String,
        at: DateTime<Utc>,
    },
    Delete {
        id: String,
    },

    // Remote service events
    AnswerReceived {
        user_message_id: String,
        response: AskResponse,
        reply_id: String,
        at: DateTime<Utc>,
    },
    SendFailed {
        user_message_id: String,
        error: String,
    },

    // Reveal events
    RevealStep {
        reply_id: String,
        prefix: String,
    },
    RevealFinished {
        reply_id: String,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Event::NewChat { .. } => "new_chat",
            Event::LoadConversation { .. } => "load",
            Event::Send { .. } => "send",
            Event::Retry { .. } => "retry",
            Event::Rename { .. } => "rename",
            Event::Delete { .. } => "delete",
            Event::AnswerReceived { .. } => "answer",
            Event::SendFailed { .. } => "fail",
            Event::RevealStep { .. } => "reveal_step",
            Event::RevealFinished { .. } => "settle",
        }
    }
}
