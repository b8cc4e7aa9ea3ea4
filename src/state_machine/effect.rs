//! Effects produced by state transitions

use crate::model::{Conversation, Message};

/// Side effects to run after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Write a conversation record (insert or replace)
    PersistConversation(Conversation),

    /// Remove a conversation record and its messages from the store
    DeleteConversation { id: String },

    /// Overwrite the stored message list of a conversation
    PersistMessages {
        conversation_id: String,
        messages: Vec<Message>,
    },

    /// Read a conversation's stored messages and load them
    LoadMessages { conversation_id: String },

    /// Start a fresh conversation
    CreateConversation,

    /// Ask the remote service
    RequestAnswer {
        user_message_id: String,
        question: String,
    },

    /// Begin disclosing a received reply
    StartReveal { reply_id: String, text: String },

    /// Stop the running reveal
    CancelReveal,

    /// Send this text again as a new message
    Resend { text: String },
}

impl Effect {
    pub fn persist_messages(conversation_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Effect::PersistMessages {
            conversation_id: conversation_id.into(),
            messages,
        }
    }
}
