//! Pure state transition function

use super::{ChatState, Effect, Event, Exchange};
use crate::client::AskResponse;
use crate::model::{auto_title, Conversation, Message, MessageStatus, Role};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ChatState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ChatState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("A question is already waiting for its answer")]
    Busy,
    #[error("No conversation is open")]
    NoConversation,
    #[error("Unknown conversation: {0}")]
    UnknownConversation(String),
    #[error("Nothing to retry for message {0}")]
    NothingToRetry(String),
    #[error("Event does not match the current exchange: {0}")]
    Stale(&'static str),
}

/// Pure transition function
///
/// Given the same state and event it always produces the same result; all
/// I/O is described by the returned effects.
pub fn transition(state: &ChatState, event: Event) -> Result<TransitionResult, TransitionError> {
    match event {
        Event::NewChat { conversation } => Ok(new_chat(state, conversation)),

        Event::LoadConversation { id, messages } => load_conversation(state, &id, messages),

        Event::Send { message } => send(state, message),

        Event::AnswerReceived {
            user_message_id,
            response,
            reply_id,
            at,
        } => answer_received(state, &user_message_id, response, reply_id, at),

        Event::RevealStep { reply_id, prefix } => match &state.exchange {
            Exchange::Revealing {
                conversation_id,
                question,
                thread,
                reply,
                ..
            } if reply.id == reply_id => {
                let mut next = state.clone();
                next.exchange = Exchange::Revealing {
                    conversation_id: conversation_id.clone(),
                    question: question.clone(),
                    thread: thread.clone(),
                    streaming: reply.with_content(prefix),
                    reply: reply.clone(),
                };
                Ok(TransitionResult::new(next))
            }
            _ => Err(TransitionError::Stale("reveal step")),
        },

        Event::RevealFinished { reply_id, at } => match &state.exchange {
            Exchange::Revealing {
                conversation_id,
                question,
                thread,
                reply,
                ..
            } if reply.id == reply_id => {
                let mut next = state.clone();
                let mut effects = Vec::new();
                finish_exchange(
                    &mut next,
                    conversation_id,
                    question,
                    thread.clone(),
                    reply.clone(),
                    at,
                    &mut effects,
                );
                Ok(TransitionResult::new(next).with_effects(effects))
            }
            _ => Err(TransitionError::Stale("reveal finished")),
        },

        Event::SendFailed {
            user_message_id,
            error,
        } => match &state.exchange {
            Exchange::AwaitingResponse {
                conversation_id,
                user_message_id: pending_id,
                thread,
                ..
            } if *pending_id == user_message_id => {
                let mut next = state.clone();
                let thread = with_status(thread, &user_message_id, MessageStatus::Failed);
                if next.is_current(conversation_id) {
                    next.messages.clone_from(&thread);
                }
                next.exchange = Exchange::Idle;
                next.last_error = Some(error);
                // The failed message stays in memory only
                Ok(TransitionResult::new(next))
            }
            _ => Err(TransitionError::Stale("send failed")),
        },

        Event::Retry { message_id } => retry(state, &message_id),

        Event::Rename { id, title, at } => {
            let mut next = state.clone();
            let updated = rename(&mut next, &id, title, at)
                .ok_or_else(|| TransitionError::UnknownConversation(id.clone()))?;
            Ok(TransitionResult::new(next).with_effect(Effect::PersistConversation(updated)))
        }

        Event::Delete { id } => Ok(delete(state, id)),
    }
}

// ============================================================================
// Conversation lifecycle
// ============================================================================

fn new_chat(state: &ChatState, conversation: Conversation) -> TransitionResult {
    let mut next = state.clone();
    let mut effects = interrupt_reveal(&mut next);

    effects.push(Effect::PersistConversation(conversation.clone()));
    next.current_id = Some(conversation.id.clone());
    next.messages.clear();
    next.conversations.insert(0, conversation);

    TransitionResult::new(next).with_effects(effects)
}

fn load_conversation(
    state: &ChatState,
    id: &str,
    messages: Vec<Message>,
) -> Result<TransitionResult, TransitionError> {
    if state.conversation(id).is_none() {
        return Err(TransitionError::UnknownConversation(id.to_string()));
    }

    let revealing_here = matches!(
        &state.exchange,
        Exchange::Revealing { conversation_id, .. } if conversation_id == id
    );
    let mut next = state.clone();
    let effects = interrupt_reveal(&mut next);

    next.current_id = Some(id.to_string());
    // In-memory threads are newer than what the caller read from the store
    next.messages = match &next.exchange {
        Exchange::AwaitingResponse {
            conversation_id,
            thread,
            ..
        } if conversation_id == id => thread.clone(),
        _ if revealing_here => effects
            .iter()
            .find_map(|e| match e {
                Effect::PersistMessages { messages, .. } => Some(messages.clone()),
                _ => None,
            })
            .unwrap_or(messages),
        _ => messages,
    };

    Ok(TransitionResult::new(next).with_effects(effects))
}

fn delete(state: &ChatState, id: String) -> TransitionResult {
    let mut next = state.clone();
    let mut effects = Vec::new();

    next.conversations.retain(|c| c.id != id);

    if next.exchange.conversation_id() == Some(id.as_str()) {
        if matches!(next.exchange, Exchange::Revealing { .. }) {
            effects.push(Effect::CancelReveal);
        }
        next.exchange = Exchange::Idle;
    }

    effects.push(Effect::DeleteConversation { id: id.clone() });

    if next.is_current(&id) {
        next.messages.clear();
        if let Some(first) = next.conversations.first() {
            let first_id = first.id.clone();
            next.current_id = Some(first_id.clone());
            effects.push(Effect::LoadMessages {
                conversation_id: first_id,
            });
        } else {
            next.current_id = None;
            effects.push(Effect::CreateConversation);
        }
    }

    TransitionResult::new(next).with_effects(effects)
}

/// Rename in place, returning the updated record
fn rename(
    state: &mut ChatState,
    id: &str,
    title: String,
    at: DateTime<Utc>,
) -> Option<Conversation> {
    let slot = state.conversations.iter_mut().find(|c| c.id == id)?;
    *slot = slot.renamed(title, at);
    Some(slot.clone())
}

// ============================================================================
// Exchanges
// ============================================================================

fn send(state: &ChatState, message: Message) -> Result<TransitionResult, TransitionError> {
    let Some(conversation_id) = state.current_id.clone() else {
        return Err(TransitionError::NoConversation);
    };
    if matches!(state.exchange, Exchange::AwaitingResponse { .. }) {
        return Err(TransitionError::Busy);
    }

    let mut next = state.clone();
    // A new question interrupts a running reveal
    let mut effects = interrupt_reveal(&mut next);

    let mut thread = next.messages.clone();
    thread.push(message.clone());
    next.messages.clone_from(&thread);
    next.last_error = None;
    next.exchange = Exchange::AwaitingResponse {
        conversation_id,
        user_message_id: message.id.clone(),
        question: message.content.clone(),
        thread,
    };

    effects.push(Effect::RequestAnswer {
        user_message_id: message.id,
        question: message.content,
    });
    Ok(TransitionResult::new(next).with_effects(effects))
}

fn answer_received(
    state: &ChatState,
    user_message_id: &str,
    response: AskResponse,
    reply_id: String,
    at: DateTime<Utc>,
) -> Result<TransitionResult, TransitionError> {
    let Exchange::AwaitingResponse {
        conversation_id,
        user_message_id: pending_id,
        question,
        thread,
    } = &state.exchange
    else {
        return Err(TransitionError::Stale("answer"));
    };
    if pending_id != user_message_id {
        return Err(TransitionError::Stale("answer"));
    }

    let mut next = state.clone();
    let thread = with_status(thread, user_message_id, MessageStatus::Sent);
    if next.is_current(conversation_id) {
        next.messages.clone_from(&thread);
    }

    match response {
        AskResponse::Answered { answer, payload } => {
            let reply = Message::answer(reply_id.clone(), answer.clone(), payload, at);
            next.exchange = Exchange::Revealing {
                conversation_id: conversation_id.clone(),
                question: question.clone(),
                thread,
                streaming: reply.with_content(""),
                reply,
            };
            Ok(TransitionResult::new(next).with_effect(Effect::StartReveal {
                reply_id,
                text: answer,
            }))
        }
        AskResponse::Rejected(error) => {
            let reply = Message::error_reply(reply_id, error, at);
            let mut effects = Vec::new();
            finish_exchange(
                &mut next,
                conversation_id,
                question,
                thread,
                reply,
                at,
                &mut effects,
            );
            Ok(TransitionResult::new(next).with_effects(effects))
        }
    }
}

fn retry(state: &ChatState, message_id: &str) -> Result<TransitionResult, TransitionError> {
    if matches!(state.exchange, Exchange::AwaitingResponse { .. }) {
        return Err(TransitionError::Busy);
    }
    let nothing = || TransitionError::NothingToRetry(message_id.to_string());

    // Like a new question, a retry settles a running reveal first
    let mut next = state.clone();
    let mut effects = interrupt_reveal(&mut next);

    let index = next
        .messages
        .iter()
        .position(|m| m.id == message_id)
        .ok_or_else(nothing)?;
    let target = &next.messages[index];

    // Failed question: drop it and ask again. Error reply: drop the reply
    // and the question right before it, then ask again.
    let (keep, text) = if target.role == Role::User && target.is_failed() {
        (index, target.content.clone())
    } else if target.role == Role::Assistant && target.is_error() && index > 0 {
        let question = &next.messages[index - 1];
        if question.role != Role::User {
            return Err(nothing());
        }
        (index - 1, question.content.clone())
    } else {
        return Err(nothing());
    };

    next.messages.truncate(keep);
    effects.push(Effect::Resend { text });
    Ok(TransitionResult::new(next).with_effects(effects))
}

/// Stop a running reveal and settle it with the complete reply.
///
/// An exchange still awaiting its answer is left in place.
fn interrupt_reveal(state: &mut ChatState) -> Vec<Effect> {
    if !matches!(state.exchange, Exchange::Revealing { .. }) {
        return Vec::new();
    }
    let Exchange::Revealing {
        conversation_id,
        question,
        thread,
        reply,
        ..
    } = std::mem::take(&mut state.exchange)
    else {
        return Vec::new();
    };

    let at = reply.created_at;
    let mut effects = vec![Effect::CancelReveal];
    finish_exchange(
        state,
        &conversation_id,
        &question,
        thread,
        reply,
        at,
        &mut effects,
    );
    effects
}

/// Append the reply, persist the thread, and name the conversation after its
/// first question if it still has the default title
fn finish_exchange(
    state: &mut ChatState,
    conversation_id: &str,
    question: &str,
    mut thread: Vec<Message>,
    reply: Message,
    at: DateTime<Utc>,
    effects: &mut Vec<Effect>,
) {
    thread.push(reply);
    if state.is_current(conversation_id) {
        state.messages.clone_from(&thread);
    }
    state.exchange = Exchange::Idle;
    effects.push(Effect::persist_messages(conversation_id, thread));

    let needs_title = state
        .conversation(conversation_id)
        .is_some_and(|c| c.has_default_title() && !question.is_empty());
    if needs_title {
        if let Some(updated) = rename(state, conversation_id, auto_title(question), at) {
            effects.push(Effect::PersistConversation(updated));
        }
    }
}

fn with_status(thread: &[Message], id: &str, status: MessageStatus) -> Vec<Message> {
    thread
        .iter()
        .map(|m| if m.id == id { m.with_status(status) } else { m.clone() })
        .collect()
}
