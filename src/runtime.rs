//! Runtime driving the chat state machine
//!
//! A single task owns the [`ChatState`], applies events through the pure
//! transition function and carries out the resulting effects: storage
//! writes, the remote question, and the reveal timer. Observers read the
//! state through a `watch` channel; callers act through a [`ChatHandle`].

mod executor;

#[cfg(test)]
pub mod testing;

pub use executor::ChatRuntime;

use crate::state_machine::{ChatState, TransitionError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

/// What a caller asks the runtime to do
#[derive(Debug, Clone)]
pub enum Command {
    NewChat,
    Load { id: String },
    Send { text: String },
    Retry { message_id: String },
    Rename { id: String, title: String },
    Delete { id: String },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::NewChat => "new_chat",
            Command::Load { .. } => "load",
            Command::Send { .. } => "send",
            Command::Retry { .. } => "retry",
            Command::Rename { .. } => "rename",
            Command::Delete { .. } => "delete",
        }
    }
}

/// A command plus the channel its outcome is reported on
#[derive(Debug)]
pub(crate) struct CommandRequest {
    pub command: Command,
    pub reply: oneshot::Sender<Result<(), ChatError>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error(transparent)]
    Rejected(#[from] TransitionError),
    #[error("Chat runtime has stopped")]
    Stopped,
}

/// Cloneable handle to a running [`ChatRuntime`]
#[derive(Clone)]
pub struct ChatHandle {
    command_tx: mpsc::Sender<CommandRequest>,
    state_rx: watch::Receiver<ChatState>,
}

impl ChatHandle {
    pub(crate) fn new(
        command_tx: mpsc::Sender<CommandRequest>,
        state_rx: watch::Receiver<ChatState>,
    ) -> Self {
        Self {
            command_tx,
            state_rx,
        }
    }

    /// Start a fresh conversation and make it current
    pub async fn new_chat(&self) -> Result<(), ChatError> {
        self.request(Command::NewChat).await
    }

    /// Make a stored conversation current
    pub async fn load_conversation(&self, id: impl Into<String>) -> Result<(), ChatError> {
        self.request(Command::Load { id: id.into() }).await
    }

    /// Remove a conversation and its messages. Unknown ids are ignored.
    pub async fn delete_conversation(&self, id: impl Into<String>) -> Result<(), ChatError> {
        self.request(Command::Delete { id: id.into() }).await
    }

    pub async fn rename_conversation(
        &self,
        id: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<(), ChatError> {
        self.request(Command::Rename {
            id: id.into(),
            title: title.into(),
        })
        .await
    }

    /// Ask a question in the current conversation, creating one if needed.
    ///
    /// Returns once the question is on its way; the answer arrives through
    /// the state channel.
    pub async fn send_message(&self, text: impl Into<String>) -> Result<(), ChatError> {
        self.request(Command::Send { text: text.into() }).await
    }

    /// Ask again for a failed question or an error reply
    pub async fn retry_message(&self, message_id: impl Into<String>) -> Result<(), ChatError> {
        self.request(Command::Retry {
            message_id: message_id.into(),
        })
        .await
    }

    /// Latest published state
    pub fn state(&self) -> ChatState {
        self.state_rx.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state_rx.clone()
    }

    async fn request(&self, command: Command) -> Result<(), ChatError> {
        let (reply, outcome) = oneshot::channel();
        self.command_tx
            .send(CommandRequest { command, reply })
            .await
            .map_err(|_| ChatError::Stopped)?;
        outcome.await.map_err(|_| ChatError::Stopped)?
    }
}
