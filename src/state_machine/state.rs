//! Chat state types

use crate::model::{Conversation, Message, MessageStatus};

/// Everything the UI shows: the conversation list and the active thread
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatState {
    /// Most recently created first
    pub conversations: Vec<Conversation>,
    pub current_id: Option<String>,
    /// Settled messages of the current conversation, in order
    pub messages: Vec<Message>,
    pub exchange: Exchange,
    /// Transport error of the last failed send, until the next send
    pub last_error: Option<String>,
}

/// Progress of the outgoing question, if any
///
/// An exchange owns the thread it belongs to, so it can settle into its
/// conversation even after the user has switched to another one.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Exchange {
    #[default]
    Idle,

    /// Question sent, no reply yet
    AwaitingResponse {
        conversation_id: String,
        user_message_id: String,
        question: String,
        /// Thread including the pending user message
        thread: Vec<Message>,
    },

    /// Reply received and being disclosed step by step
    Revealing {
        conversation_id: String,
        question: String,
        /// Thread including the sent user message, without the reply
        thread: Vec<Message>,
        /// The complete reply
        reply: Message,
        /// The reply as currently disclosed
        streaming: Message,
    },
}

impl Exchange {
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            Exchange::Idle => None,
            Exchange::AwaitingResponse {
                conversation_id, ..
            }
            | Exchange::Revealing {
                conversation_id, ..
            } => Some(conversation_id),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Exchange::Idle)
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Exchange::Idle => "idle",
            Exchange::AwaitingResponse { .. } => "awaiting_response",
            Exchange::Revealing { .. } => "revealing",
        }
    }
}

impl ChatState {
    /// State seeded from the stored conversation list, nothing current yet
    pub fn with_conversations(conversations: Vec<Conversation>) -> Self {
        Self {
            conversations,
            ..Self::default()
        }
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn current(&self) -> Option<&Conversation> {
        self.current_id.as_deref().and_then(|id| self.conversation(id))
    }

    pub fn is_current(&self, id: &str) -> bool {
        self.current_id.as_deref() == Some(id)
    }

    /// A question is outstanding or its reply is being revealed
    pub fn is_loading(&self) -> bool {
        !self.exchange.is_idle()
    }

    /// Waiting on the remote service for the current conversation
    pub fn is_typing(&self) -> bool {
        matches!(
            &self.exchange,
            Exchange::AwaitingResponse { conversation_id, .. } if self.is_current(conversation_id)
        )
    }

    /// The reply being revealed in the current conversation
    pub fn streaming_message(&self) -> Option<&Message> {
        match &self.exchange {
            Exchange::Revealing {
                conversation_id,
                streaming,
                ..
            } if self.is_current(conversation_id) => Some(streaming),
            _ => None,
        }
    }

    /// What the active thread shows: settled messages, then the streaming slot
    pub fn thread(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().chain(self.streaming_message())
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Most recent failed user message in the active thread
    pub fn last_failed(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.status == Some(MessageStatus::Failed))
    }
}
