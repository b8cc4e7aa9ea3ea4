//! Nova chat client core
//!
//! Conversation and message state for a question-answering chat: a pure
//! state machine, a runtime that executes its effects, a local store for
//! history, and the HTTP client for the answer endpoint.

pub mod client;
pub mod config;
pub mod display;
pub mod export;
pub mod model;
pub mod reveal;
pub mod runtime;
pub mod state_machine;
pub mod storage;

pub use client::{AnswerService, HttpAnswerClient, LoggingService};
pub use config::ChatConfig;
pub use runtime::{ChatError, ChatHandle, ChatRuntime};
pub use state_machine::ChatState;
pub use storage::ChatStore;
