//! Chat runtime executor

use super::{ChatError, ChatHandle, Command, CommandRequest};

use crate::client::AnswerService;
use crate::model::{generate_id, Conversation, Message};
use crate::reveal::{reveal_stream, RevealPlan};
use crate::state_machine::{transition, ChatState, Effect, Event, TransitionError};
use crate::storage::ChatStore;
use chrono::Utc;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Owns the chat state and executes effects against real I/O
pub struct ChatRuntime<S>
where
    S: AnswerService + 'static,
{
    state: ChatState,
    store: ChatStore,
    service: Arc<S>,
    reveal_interval: Duration,
    command_rx: mpsc::Receiver<CommandRequest>,
    /// Events raised by spawned tasks (answers, reveal steps)
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    state_tx: watch::Sender<ChatState>,
    /// Token to cancel the running reveal
    reveal_cancel: Option<CancellationToken>,
}

impl<S> ChatRuntime<S>
where
    S: AnswerService + 'static,
{
    /// Build a runtime seeded from the store, with the first stored
    /// conversation already current
    pub fn new(store: ChatStore, service: S, reveal_interval: Duration) -> (Self, ChatHandle) {
        let state = restore(&store);
        let (command_tx, command_rx) = mpsc::channel(32);
        let (event_tx, event_rx) = mpsc::channel(64);
        let (state_tx, state_rx) = watch::channel(state.clone());

        let runtime = Self {
            state,
            store,
            service: Arc::new(service),
            reveal_interval,
            command_rx,
            event_rx,
            event_tx,
            state_tx,
            reveal_cancel: None,
        };
        (runtime, ChatHandle::new(command_tx, state_rx))
    }

    /// Build the runtime and run it on a background task
    pub fn spawn(store: ChatStore, service: S, reveal_interval: Duration) -> ChatHandle {
        let (runtime, handle) = Self::new(store, service, reveal_interval);
        tokio::spawn(runtime.run());
        handle
    }

    /// Process commands and events until every handle is dropped
    pub async fn run(mut self) {
        tracing::info!(
            endpoint = %self.service.endpoint(),
            conversations = self.state.conversations.len(),
            storage = self.store.is_available(),
            "Starting chat runtime"
        );

        loop {
            tokio::select! {
                request = self.command_rx.recv() => {
                    // Every handle dropped
                    let Some(request) = request else { break };
                    let outcome = self.handle_command(request.command);
                    // Caller may have gone away
                    let _ = request.reply.send(outcome);
                }
                Some(event) = self.event_rx.recv() => {
                    if let Err(e) = self.process_event(event) {
                        match e {
                            TransitionError::Stale(what) => {
                                tracing::debug!(event = what, "Dropping stale event");
                            }
                            other => tracing::warn!(error = %other, "Background event rejected"),
                        }
                    }
                }
            }
        }

        if let Some(token) = self.reveal_cancel.take() {
            token.cancel();
        }
        tracing::info!("Chat runtime stopped");
    }

    fn handle_command(&mut self, command: Command) -> Result<(), ChatError> {
        tracing::debug!(command = command.name(), "Handling command");
        let now = Utc::now();

        let event = match command {
            Command::NewChat => Event::NewChat {
                conversation: Conversation::new(now),
            },
            Command::Load { id } => {
                let messages = self.store.get_messages(&id);
                Event::LoadConversation { id, messages }
            }
            Command::Send { text } => {
                if self.state.current_id.is_none() {
                    self.process_event(Event::NewChat {
                        conversation: Conversation::new(now),
                    })?;
                }
                Event::Send {
                    message: Message::user(text, now),
                }
            }
            Command::Retry { message_id } => Event::Retry { message_id },
            Command::Rename { id, title } => Event::Rename { id, title, at: now },
            Command::Delete { id } => Event::Delete { id },
        };

        self.process_event(event).map_err(|e| {
            tracing::info!(error = %e, "Command rejected");
            ChatError::from(e)
        })
    }

    /// Apply an event and everything its effects raise synchronously.
    ///
    /// Only a rejection of the first event is returned; rejections of
    /// follow-up events are logged.
    fn process_event(&mut self, event: Event) -> Result<(), TransitionError> {
        let mut queue = VecDeque::from([event]);
        let mut first = true;

        while let Some(current) = queue.pop_front() {
            let name = current.name();
            let result = match transition(&self.state, current) {
                Ok(r) => r,
                Err(e) if first => return Err(e),
                Err(e) => {
                    tracing::warn!(event = name, error = %e, "Follow-up event rejected");
                    continue;
                }
            };
            first = false;

            self.state = result.new_state;
            tracing::debug!(
                event = name,
                exchange = self.state.exchange.name(),
                effects = result.effects.len(),
                "Transition"
            );

            for effect in result.effects {
                if let Some(generated) = self.execute_effect(effect) {
                    queue.push_back(generated);
                }
            }
            self.state_tx.send_replace(self.state.clone());
        }

        Ok(())
    }

    /// Carry out one effect, returning any event it raises immediately
    #[allow(clippy::too_many_lines)]
    fn execute_effect(&mut self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::PersistConversation(conversation) => {
                self.store.save_conversation(&conversation);
                None
            }

            Effect::DeleteConversation { id } => {
                tracing::info!(conv_id = %id, "Deleting conversation");
                self.store.delete_conversation(&id);
                None
            }

            Effect::PersistMessages {
                conversation_id,
                messages,
            } => {
                self.store.save_messages(&conversation_id, &messages);
                None
            }

            Effect::LoadMessages { conversation_id } => {
                let messages = self.store.get_messages(&conversation_id);
                Some(Event::LoadConversation {
                    id: conversation_id,
                    messages,
                })
            }

            Effect::CreateConversation => Some(Event::NewChat {
                conversation: Conversation::new(Utc::now()),
            }),

            Effect::Resend { text } => Some(Event::Send {
                message: Message::user(text, Utc::now()),
            }),

            Effect::RequestAnswer {
                user_message_id,
                question,
            } => {
                let service = Arc::clone(&self.service);
                let event_tx = self.event_tx.clone();

                tokio::spawn(async move {
                    let event = match service.ask(&question).await {
                        Ok(response) => Event::AnswerReceived {
                            user_message_id,
                            response,
                            reply_id: generate_id(),
                            at: Utc::now(),
                        },
                        Err(e) => Event::SendFailed {
                            user_message_id,
                            error: e.message,
                        },
                    };
                    let _ = event_tx.send(event).await;
                });

                // The event will come from the spawned task
                None
            }

            Effect::StartReveal { reply_id, text } => {
                if let Some(previous) = self.reveal_cancel.take() {
                    previous.cancel();
                }
                let cancel = CancellationToken::new();
                self.reveal_cancel = Some(cancel.clone());

                let event_tx = self.event_tx.clone();
                let interval = self.reveal_interval;

                tokio::spawn(async move {
                    let steps = reveal_stream(RevealPlan::new(text), interval, cancel.clone());
                    futures::pin_mut!(steps);
                    while let Some(prefix) = steps.next().await {
                        let step = Event::RevealStep {
                            reply_id: reply_id.clone(),
                            prefix,
                        };
                        if event_tx.send(step).await.is_err() {
                            return;
                        }
                    }
                    if !cancel.is_cancelled() {
                        let _ = event_tx
                            .send(Event::RevealFinished {
                                reply_id,
                                at: Utc::now(),
                            })
                            .await;
                    }
                });
                None
            }

            Effect::CancelReveal => {
                tracing::debug!("Cancelling reveal");
                if let Some(token) = self.reveal_cancel.take() {
                    token.cancel();
                }
                None
            }
        }
    }
}

/// Stored conversations, with the first one loaded
fn restore(store: &ChatStore) -> ChatState {
    let state = ChatState::with_conversations(store.get_conversations());
    let Some(id) = state.conversations.first().map(|c| c.id.clone()) else {
        return state;
    };

    let messages = store.get_messages(&id);
    match transition(&state, Event::LoadConversation { id, messages }) {
        Ok(result) => result.new_state,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to restore conversation");
            state
        }
    }
}
