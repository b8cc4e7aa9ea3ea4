//! Property-based tests for the state machine
//!
//! Random sequences of user actions and remote outcomes are driven through
//! `transition`, with effects applied to an in-memory store the way the
//! runtime applies them. Key invariants are checked after every step.

use super::*;
use crate::client::AskResponse;
use crate::model::{Conversation, Intent, Message, MessageStatus, ReplyPayload, Role};
use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

// ============================================================================
// Actions
// ============================================================================

#[derive(Debug, Clone)]
enum Action {
    NewChat,
    Send(String),
    Answer(String),
    Reject,
    Fail,
    Step(usize),
    Finish,
    Retry(usize),
    Rename(usize, String),
    Delete(usize),
    Load(usize),
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        Just(Action::NewChat),
        "[a-z]{1,6}( [a-z]{1,6}){0,12}".prop_map(Action::Send),
        "[a-z]{1,6}( [a-z]{1,6}){0,25}".prop_map(Action::Answer),
        Just(Action::Reject),
        Just(Action::Fail),
        (1usize..5).prop_map(Action::Step),
        Just(Action::Finish),
        (0usize..6).prop_map(Action::Retry),
        ((0usize..4), "[A-Z][a-z]{2,8}").prop_map(|(i, t)| Action::Rename(i, t)),
        (0usize..4).prop_map(Action::Delete),
        (0usize..4).prop_map(Action::Load),
    ]
}

// ============================================================================
// Harness
// ============================================================================

/// Applies events and their effects, and records what was persisted
#[derive(Default)]
struct Harness {
    state: ChatState,
    clock: i64,
    stored_conversations: Vec<Conversation>,
    stored_messages: HashMap<String, Vec<Message>>,
    /// Complete text of every reply handed to the reducer
    full_replies: HashMap<String, String>,
    /// Last status seen per message id
    statuses: HashMap<String, MessageStatus>,
    /// Most recent question handed to the remote service
    asked: Option<Asked>,
}

struct Asked {
    conversation_id: String,
    user_message_id: String,
    failed: bool,
}

impl Harness {
    fn now(&mut self) -> DateTime<Utc> {
        self.clock += 1;
        Utc.timestamp_opt(1_700_000_000 + self.clock, 0).unwrap()
    }

    fn dispatch(&mut self, event: Event) -> Result<(), TransitionError> {
        let is_send = matches!(event, Event::Send { .. });
        let is_failure = matches!(event, Event::SendFailed { .. });
        let result = transition(&self.state, event)?;
        self.state = result.new_state;

        if let Exchange::AwaitingResponse {
            conversation_id,
            user_message_id,
            ..
        } = &self.state.exchange
        {
            if is_send {
                self.asked = Some(Asked {
                    conversation_id: conversation_id.clone(),
                    user_message_id: user_message_id.clone(),
                    failed: false,
                });
            }
        }
        if is_failure {
            if let Some(asked) = &mut self.asked {
                asked.failed = true;
            }
        }

        for effect in result.effects {
            self.run_effect(effect);
        }
        Ok(())
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::PersistConversation(conv) => {
                match self.stored_conversations.iter_mut().find(|c| c.id == conv.id) {
                    Some(existing) => *existing = conv,
                    None => self.stored_conversations.push(conv),
                }
            }
            Effect::DeleteConversation { id } => {
                self.stored_conversations.retain(|c| c.id != id);
                self.stored_messages.remove(&id);
            }
            Effect::PersistMessages {
                conversation_id,
                messages,
            } => {
                for m in messages.iter().filter(|m| m.role == Role::Assistant && !m.is_error()) {
                    let full = self.full_replies.get(&m.id).expect("persisted unknown reply");
                    assert_eq!(&m.content, full, "persisted an intermediate reveal step");
                }
                self.stored_messages.insert(conversation_id, messages);
            }
            Effect::LoadMessages { conversation_id } => {
                let messages = self
                    .stored_messages
                    .get(&conversation_id)
                    .cloned()
                    .unwrap_or_default();
                self.dispatch(Event::LoadConversation {
                    id: conversation_id,
                    messages,
                })
                .expect("load after delete");
            }
            Effect::CreateConversation => {
                let conversation = Conversation::new(self.now());
                self.dispatch(Event::NewChat { conversation })
                    .expect("new chat never fails");
            }
            Effect::Resend { text } => {
                let message = Message::user(text, self.now());
                self.dispatch(Event::Send { message }).expect("resend after retry");
            }
            Effect::RequestAnswer { .. } | Effect::StartReveal { .. } | Effect::CancelReveal => {}
        }
    }

    fn pending_user_id(&self) -> Option<String> {
        match &self.state.exchange {
            Exchange::AwaitingResponse {
                user_message_id, ..
            } => Some(user_message_id.clone()),
            _ => None,
        }
    }

    fn revealing(&self) -> Option<(String, String)> {
        match &self.state.exchange {
            Exchange::Revealing { reply, .. } => Some((reply.id.clone(), reply.content.clone())),
            _ => None,
        }
    }

    fn conversation_at(&self, index: usize) -> Option<String> {
        let len = self.state.conversations.len();
        (len > 0).then(|| self.state.conversations[index % len].id.clone())
    }

    fn act(&mut self, action: Action) {
        let _ = match action {
            Action::NewChat => {
                let conversation = Conversation::new(self.now());
                self.dispatch(Event::NewChat { conversation })
            }
            Action::Send(text) => {
                if self.state.current_id.is_none() {
                    let conversation = Conversation::new(self.now());
                    let _ = self.dispatch(Event::NewChat { conversation });
                }
                let message = Message::user(text, self.now());
                self.dispatch(Event::Send { message })
            }
            Action::Answer(text) => match self.pending_user_id() {
                Some(user_message_id) => {
                    let reply_id = format!("reply-{}", self.clock);
                    self.full_replies.insert(reply_id.clone(), text.clone());
                    let at = self.now();
                    self.dispatch(Event::AnswerReceived {
                        user_message_id,
                        response: AskResponse::answered(text, ReplyPayload::Generic),
                        reply_id,
                        at,
                    })
                }
                None => Ok(()),
            },
            Action::Reject => match self.pending_user_id() {
                Some(user_message_id) => {
                    let at = self.now();
                    self.dispatch(Event::AnswerReceived {
                        user_message_id,
                        response: AskResponse::rejected(Intent::Generic, "down"),
                        reply_id: format!("error-{}", self.clock),
                        at,
                    })
                }
                None => Ok(()),
            },
            Action::Fail => match self.pending_user_id() {
                Some(user_message_id) => self.dispatch(Event::SendFailed {
                    user_message_id,
                    error: "connection refused".to_string(),
                }),
                None => Ok(()),
            },
            Action::Step(words) => match self.revealing() {
                Some((reply_id, full)) => {
                    let prefix = full.split(' ').take(words).collect::<Vec<_>>().join(" ");
                    self.dispatch(Event::RevealStep { reply_id, prefix })
                }
                None => Ok(()),
            },
            Action::Finish => match self.revealing() {
                Some((reply_id, _)) => {
                    let at = self.now();
                    self.dispatch(Event::RevealFinished { reply_id, at })
                }
                None => Ok(()),
            },
            Action::Retry(index) => {
                let len = self.state.messages.len();
                if len == 0 {
                    Ok(())
                } else {
                    let message_id = self.state.messages[index % len].id.clone();
                    self.dispatch(Event::Retry { message_id })
                }
            }
            Action::Rename(index, title) => match self.conversation_at(index) {
                Some(id) => {
                    let at = self.now();
                    self.dispatch(Event::Rename { id, title, at })
                }
                None => Ok(()),
            },
            Action::Delete(index) => match self.conversation_at(index) {
                Some(id) => self.dispatch(Event::Delete { id }),
                None => Ok(()),
            },
            Action::Load(index) => match self.conversation_at(index) {
                Some(id) => {
                    let messages = self.stored_messages.get(&id).cloned().unwrap_or_default();
                    self.dispatch(Event::LoadConversation { id, messages })
                }
                None => Ok(()),
            },
        };
    }

    fn check_invariants(&mut self) {
        let state = &self.state;

        // Message ids are unique within the active thread
        let ids: HashSet<_> = state.thread().map(|m| m.id.as_str()).collect();
        assert_eq!(ids.len(), state.thread().count(), "duplicate message id");

        // The current conversation is one we know about
        if let Some(id) = &state.current_id {
            assert!(state.conversation(id).is_some(), "current conversation missing");
        }

        // Stored and in-memory conversation lists agree, and no message list
        // outlives its conversation
        let in_memory: HashSet<_> = state.conversations.iter().map(|c| &c.id).collect();
        let stored: HashSet<_> = self.stored_conversations.iter().map(|c| &c.id).collect();
        assert_eq!(in_memory, stored);
        for id in self.stored_messages.keys() {
            assert!(in_memory.contains(id), "orphaned message list");
        }

        // Only the outstanding question is pending
        for m in &state.messages {
            if m.status == Some(MessageStatus::Pending) {
                assert_eq!(Some(m.id.clone()), self.pending_user_id());
            }
        }

        // A question is never dropped: it is still outstanding, settled into
        // its stored thread, failed, or gone with its conversation
        if let Some(asked) = &self.asked {
            if !asked.failed && state.conversation(&asked.conversation_id).is_some() {
                let outstanding = match &state.exchange {
                    Exchange::AwaitingResponse {
                        user_message_id, ..
                    } => *user_message_id == asked.user_message_id,
                    Exchange::Revealing { thread, .. } => {
                        thread.iter().any(|m| m.id == asked.user_message_id)
                    }
                    Exchange::Idle => false,
                };
                let stored = self
                    .stored_messages
                    .get(&asked.conversation_id)
                    .is_some_and(|thread| {
                        thread.iter().any(|m| {
                            m.id == asked.user_message_id && m.status == Some(MessageStatus::Sent)
                        })
                    });
                assert!(outstanding || stored, "question {} was lost", asked.user_message_id);
            }
        }

        // Pending only moves to sent or failed, never back
        for m in state.thread() {
            if let Some(status) = m.status {
                if let Some(previous) = self.statuses.insert(m.id.clone(), status) {
                    let allowed = previous == status || previous == MessageStatus::Pending;
                    assert!(allowed, "{previous:?} -> {status:?} for {}", m.id);
                }
            }
        }
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_invariants_hold(actions in proptest::collection::vec(arb_action(), 1..60)) {
        let mut harness = Harness::default();
        for action in actions {
            harness.act(action);
            harness.check_invariants();
        }
    }

    #[test]
    fn prop_transition_is_deterministic(actions in proptest::collection::vec(arb_action(), 1..30)) {
        let mut harness = Harness::default();
        for action in actions {
            harness.act(action);
        }
        let state = harness.state.clone();
        let conversation = Conversation::new(Utc.timestamp_opt(1_800_000_000, 0).unwrap());
        let a = transition(&state, Event::NewChat { conversation: conversation.clone() }).unwrap();
        let b = transition(&state, Event::NewChat { conversation }).unwrap();
        prop_assert_eq!(a.new_state, b.new_state);
        prop_assert_eq!(a.effects, b.effects);
    }

    #[test]
    fn prop_delete_is_idempotent(
        actions in proptest::collection::vec(arb_action(), 1..30),
        index in 0usize..4,
    ) {
        let mut harness = Harness::default();
        for action in actions {
            harness.act(action);
        }
        if let Some(id) = harness.conversation_at(index) {
            let once = transition(&harness.state, Event::Delete { id: id.clone() }).unwrap();
            let twice = transition(&once.new_state, Event::Delete { id }).unwrap();
            prop_assert_eq!(&once.new_state, &twice.new_state);
        }
    }

    #[test]
    fn prop_settled_reply_is_complete(answer in "[a-z]{1,6}( [a-z]{1,6}){0,40}", steps in 0usize..8) {
        let mut harness = Harness::default();
        harness.act(Action::Send("question".to_string()));
        harness.act(Action::Answer(answer.clone()));
        for i in 0..steps {
            harness.act(Action::Step(i + 1));
        }
        harness.act(Action::Finish);

        prop_assert!(!harness.state.is_loading());
        let last = harness.state.messages.last().unwrap();
        prop_assert_eq!(&last.content, &answer);
    }
}
