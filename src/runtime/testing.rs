//! Mock implementations for testing
//!
//! These mocks enable runtime tests without a network or a disk.

use crate::client::{AnswerService, AskError, AskResponse};
use crate::model::{Intent, ReplyPayload};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Mock Answer Service
// ============================================================================

/// Answer service that returns queued responses
pub struct MockAnswerService {
    responses: Mutex<VecDeque<Result<AskResponse, AskError>>>,
    /// Every question asked, in order
    pub questions: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl MockAnswerService {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            questions: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Wait this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queue_answer(&self, answer: &str, payload: ReplyPayload) {
        self.queue(Ok(AskResponse::answered(answer, payload)));
    }

    pub fn queue_rejection(&self, intent: Intent, message: &str) {
        self.queue(Ok(AskResponse::rejected(intent, message)));
    }

    pub fn queue_error(&self, error: AskError) {
        self.queue(Err(error));
    }

    pub fn recorded_questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }

    fn queue(&self, response: Result<AskResponse, AskError>) {
        self.responses.lock().unwrap().push_back(response);
    }
}

impl Default for MockAnswerService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnswerService for MockAnswerService {
    async fn ask(&self, question: &str) -> Result<AskResponse, AskError> {
        self.questions.lock().unwrap().push(question.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AskError::network("No mock response queued")))
    }

    fn endpoint(&self) -> &str {
        "mock://answers"
    }
}

// ============================================================================
// Test Chat Builder
// ============================================================================

use crate::runtime::{ChatHandle, ChatRuntime};
use crate::state_machine::ChatState;
use crate::storage::{ChatStore, SqliteStore};
use std::sync::Arc;
use tokio::sync::watch;

/// Running chat over an in-memory store and a mock service
pub struct TestChat {
    pub handle: ChatHandle,
    pub service: Arc<MockAnswerService>,
    pub store: ChatStore,
    state_rx: watch::Receiver<ChatState>,
}

impl TestChat {
    pub fn builder() -> TestChatBuilder {
        TestChatBuilder::new()
    }

    /// Wait until the published state satisfies `predicate`
    pub async fn wait_until(&mut self, predicate: impl FnMut(&ChatState) -> bool) -> bool {
        tokio::time::timeout(Duration::from_secs(30), self.state_rx.wait_for(predicate))
            .await
            .is_ok_and(|r| r.is_ok())
    }

    /// Wait until no question is outstanding and no reply is being revealed
    pub async fn wait_idle(&mut self) -> bool {
        self.wait_until(|s| !s.is_loading()).await
    }

    pub fn state(&self) -> ChatState {
        self.handle.state()
    }

    pub fn current_id(&self) -> String {
        self.state().current_id.expect("no current conversation")
    }
}

pub struct TestChatBuilder {
    service: MockAnswerService,
    store: Option<ChatStore>,
    reveal_interval: Duration,
}

impl TestChatBuilder {
    pub fn new() -> Self {
        Self {
            service: MockAnswerService::new(),
            store: None,
            reveal_interval: Duration::from_millis(50),
        }
    }

    pub fn service(mut self, service: MockAnswerService) -> Self {
        self.service = service;
        self
    }

    /// Start from an existing store instead of an empty one
    pub fn store(mut self, store: ChatStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn reveal_interval(mut self, interval: Duration) -> Self {
        self.reveal_interval = interval;
        self
    }

    pub fn build(self) -> TestChat {
        let store = self.store.unwrap_or_else(|| {
            ChatStore::new(Arc::new(SqliteStore::open_in_memory().expect("in-memory sqlite")))
        });
        let service = Arc::new(self.service);
        let handle = ChatRuntime::spawn(store.clone(), Arc::clone(&service), self.reveal_interval);
        let state_rx = handle.subscribe();

        TestChat {
            handle,
            service,
            store,
            state_rx,
        }
    }
}

impl Default for TestChatBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Conversation, DbResult, Message, MessageStatus, Role, DEFAULT_TITLE};
    use crate::runtime::ChatError;
    use crate::state_machine::TransitionError;
    use chrono::Utc;

    fn contents(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.content.as_str()).collect()
    }

    #[tokio::test]
    async fn test_mock_service_records_and_drains_queue() {
        let mock = MockAnswerService::new();
        mock.queue_answer("pong", ReplyPayload::Generic);

        let first = mock.ask("ping").await.unwrap();
        assert!(matches!(first, AskResponse::Answered { ref answer, .. } if answer == "pong"));
        assert!(mock.ask("again").await.is_err());
        assert_eq!(mock.recorded_questions(), vec!["ping", "again"]);
    }

    /// new chat → send "ping" → "pong" is revealed, settled and persisted
    #[tokio::test(start_paused = true)]
    async fn test_ping_pong_is_persisted() {
        let mut chat = TestChat::builder().build();
        chat.service.queue_answer("pong", ReplyPayload::Generic);

        chat.handle.new_chat().await.unwrap();
        chat.handle.send_message("ping").await.unwrap();
        assert!(chat.state().is_loading());
        assert!(chat.wait_idle().await);

        let state = chat.state();
        let id = chat.current_id();
        let stored = chat.store.get_messages(&id);
        assert_eq!(contents(&stored), vec!["ping", "pong"]);
        assert_eq!(stored[0].role, Role::User);
        assert_eq!(stored[0].status, Some(MessageStatus::Sent));
        assert_eq!(stored[1].role, Role::Assistant);
        assert_eq!(stored, state.messages);
        assert_eq!(chat.store.get_conversations()[0].title, "ping");
        assert_eq!(chat.service.recorded_questions(), vec!["ping"]);
    }

    /// Network failure, then retry on the failed message
    #[tokio::test(start_paused = true)]
    async fn test_retry_after_network_failure() {
        let mut chat = TestChat::builder().build();
        chat.service.queue_error(AskError::network("Connection failed"));

        chat.handle.new_chat().await.unwrap();
        chat.handle.send_message("ping").await.unwrap();
        assert!(chat.wait_idle().await);

        let state = chat.state();
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].status, Some(MessageStatus::Failed));
        assert_eq!(state.last_error.as_deref(), Some("Connection failed"));
        assert!(chat.store.get_messages(&chat.current_id()).is_empty());

        chat.service.queue_answer("pong", ReplyPayload::Generic);
        let failed_id = state.messages[0].id.clone();
        chat.handle.retry_message(failed_id).await.unwrap();
        assert!(chat.wait_idle().await);

        let state = chat.state();
        assert_eq!(contents(&state.messages), vec!["ping", "pong"]);
        assert_eq!(state.messages[0].status, Some(MessageStatus::Sent));
        assert!(state.last_error.is_none());
        assert_eq!(chat.store.get_messages(&chat.current_id()), state.messages);
        assert_eq!(chat.service.recorded_questions(), vec!["ping", "ping"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_reply_is_persisted_and_retryable() {
        let mut chat = TestChat::builder().build();
        chat.service.queue_rejection(Intent::Db, "relation does not exist");
        chat.handle.send_message("how many orders?").await.unwrap();
        assert!(chat.wait_idle().await);

        let state = chat.state();
        assert_eq!(state.messages.len(), 2);
        assert!(state.messages[1].is_error());
        assert_eq!(chat.store.get_messages(&chat.current_id()).len(), 2);

        chat.service.queue_answer(
            "3 rows found",
            ReplyPayload::Db(DbResult::default()),
        );
        chat.handle
            .retry_message(state.messages[1].id.clone())
            .await
            .unwrap();
        assert!(chat.wait_idle().await);
        assert_eq!(
            contents(&chat.state().messages),
            vec!["how many orders?", "3 rows found"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_without_conversation_creates_one() {
        let mut chat = TestChat::builder().build();
        chat.service.queue_answer("hi", ReplyPayload::Generic);

        chat.handle.send_message("Hello world").await.unwrap();
        assert!(chat.wait_idle().await);

        let state = chat.state();
        assert_eq!(state.conversations.len(), 1);
        assert_eq!(state.current().unwrap().title, "Hello world");
        assert_eq!(contents(&state.messages), vec!["Hello world", "hi"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_awaiting_is_busy() {
        let service = MockAnswerService::new().with_delay(Duration::from_secs(5));
        service.queue_answer("first answer", ReplyPayload::Generic);
        let mut chat = TestChat::builder().service(service).build();

        chat.handle.send_message("first").await.unwrap();
        let second = chat.handle.send_message("second").await;
        assert_eq!(second, Err(ChatError::Rejected(TransitionError::Busy)));

        assert!(chat.wait_idle().await);
        assert_eq!(contents(&chat.state().messages), vec!["first", "first answer"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_send_interrupts_reveal() {
        let answer = "one two three four five six seven eight nine ten eleven twelve";
        let mut chat = TestChat::builder()
            .reveal_interval(Duration::from_secs(1))
            .build();
        chat.service.queue_answer(answer, ReplyPayload::Generic);
        chat.service.queue_answer("done", ReplyPayload::Generic);

        chat.handle.send_message("first").await.unwrap();
        assert!(
            chat.wait_until(|s| s
                .streaming_message()
                .is_some_and(|m| !m.content.is_empty()))
                .await
        );
        let partial = chat.state().streaming_message().unwrap().content.clone();
        assert_ne!(partial, answer);

        chat.handle.send_message("second").await.unwrap();
        assert!(chat.wait_idle().await);

        let state = chat.state();
        assert_eq!(contents(&state.messages), vec!["first", answer, "second", "done"]);
        assert_eq!(chat.store.get_messages(&chat.current_id()), state.messages);
    }

    #[tokio::test(start_paused = true)]
    async fn test_answer_settles_into_conversation_left_behind() {
        let service = MockAnswerService::new().with_delay(Duration::from_secs(1));
        service.queue_answer("pong", ReplyPayload::Generic);
        let mut chat = TestChat::builder().service(service).build();

        chat.handle.send_message("ping").await.unwrap();
        let first = chat.current_id();
        chat.handle.new_chat().await.unwrap();
        assert!(!chat.state().is_typing());

        assert!(chat.wait_idle().await);
        assert!(chat.state().messages.is_empty());
        assert_eq!(contents(&chat.store.get_messages(&first)), vec!["ping", "pong"]);

        chat.handle.load_conversation(first.clone()).await.unwrap();
        assert_eq!(contents(&chat.state().messages), vec!["ping", "pong"]);
        assert_eq!(chat.state().current().unwrap().title, "ping");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_current_loads_remaining_conversation() {
        let mut chat = TestChat::builder().build();
        chat.service.queue_answer("pong", ReplyPayload::Generic);

        chat.handle.send_message("ping").await.unwrap();
        assert!(chat.wait_idle().await);
        let older = chat.current_id();

        chat.handle.new_chat().await.unwrap();
        let newer = chat.current_id();
        chat.handle.delete_conversation(newer.clone()).await.unwrap();

        let state = chat.state();
        assert_eq!(state.current_id.as_deref(), Some(older.as_str()));
        assert_eq!(contents(&state.messages), vec!["ping", "pong"]);
        assert_eq!(chat.store.get_conversations().len(), 1);

        // Deleting again changes nothing
        chat.handle.delete_conversation(newer).await.unwrap();
        assert_eq!(chat.state(), state);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_only_conversation_starts_fresh_one() {
        let chat = TestChat::builder().build();
        chat.handle.new_chat().await.unwrap();
        let only = chat.current_id();

        chat.handle.delete_conversation(only.clone()).await.unwrap();

        let state = chat.state();
        assert_eq!(state.conversations.len(), 1);
        assert_ne!(state.conversations[0].id, only);
        assert_eq!(state.current().unwrap().title, DEFAULT_TITLE);
        assert!(state.messages.is_empty());
        assert!(chat.store.get_messages(&only).is_empty());
        let stored: Vec<_> = chat.store.get_conversations().into_iter().map(|c| c.id).collect();
        assert_eq!(stored, vec![state.conversations[0].id.clone()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rename_is_persisted_and_unknown_id_rejected() {
        let chat = TestChat::builder().build();
        chat.handle.new_chat().await.unwrap();
        let id = chat.current_id();

        chat.handle.rename_conversation(id.clone(), "Budget").await.unwrap();
        assert_eq!(chat.state().current().unwrap().title, "Budget");
        assert_eq!(chat.store.get_conversations()[0].title, "Budget");

        let missing = chat.handle.rename_conversation("missing", "x").await;
        assert_eq!(
            missing,
            Err(ChatError::Rejected(TransitionError::UnknownConversation(
                "missing".to_string()
            )))
        );
        let load = chat.handle.load_conversation("missing").await;
        assert!(matches!(load, Err(ChatError::Rejected(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_restores_first_stored_conversation() {
        let store = ChatStore::new(Arc::new(SqliteStore::open_in_memory().unwrap()));
        let now = Utc::now();
        let first = Conversation::new(now).renamed("Kept", now);
        let second = Conversation::new(now);
        store.save_conversation(&first);
        store.save_conversation(&second);
        store.save_messages(&first.id, &[Message::user("stored", now)]);

        let chat = TestChat::builder().store(store).build();
        let state = chat.state();
        assert_eq!(state.conversations.len(), 2);
        assert_eq!(state.current_id.as_deref(), Some(first.id.as_str()));
        assert_eq!(contents(&state.messages), vec!["stored"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_store_still_chats() {
        let mut chat = TestChat::builder().store(ChatStore::unavailable()).build();
        chat.service.queue_answer("pong", ReplyPayload::Generic);

        chat.handle.send_message("ping").await.unwrap();
        assert!(chat.wait_idle().await);
        assert_eq!(contents(&chat.state().messages), vec!["ping", "pong"]);
        assert!(chat.store.get_conversations().is_empty());
    }

    #[tokio::test]
    async fn test_handle_reports_stopped_runtime() {
        let (runtime, handle) = ChatRuntime::new(
            ChatStore::unavailable(),
            MockAnswerService::new(),
            Duration::from_millis(1),
        );
        drop(runtime);
        assert_eq!(handle.new_chat().await, Err(ChatError::Stopped));
    }
}
