//! Wire types for the answer endpoint

use crate::model::{DbResult, DocsResult, Intent, ReplyError, ReplyPayload};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error text used when a reply carries neither an answer nor an error
pub const UNKNOWN_ERROR: &str = "Erro desconhecido";

/// Request body: `{question, metadata: {user}}`
#[derive(Debug, Clone, Serialize)]
pub struct AskRequest<'a> {
    pub question: &'a str,
    pub metadata: AskMetadata<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskMetadata<'a> {
    pub user: &'a str,
}

/// Response body as sent by the endpoint
///
/// Every field is optional on the wire; [`AskReply::into_response`] turns it
/// into the tagged [`AskResponse`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AskReply {
    #[serde(default)]
    pub intent: Intent,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub rows: Option<Vec<Vec<Value>>>,
    #[serde(default)]
    pub files: Option<Vec<String>>,
}

impl AskReply {
    /// Normalize a successfully received reply.
    ///
    /// A reply without a non-empty answer is an application-level error.
    pub fn into_response(self) -> AskResponse {
        let Some(answer) = self.answer.filter(|a| !a.is_empty()) else {
            return AskResponse::Rejected(ReplyError {
                intent: self.intent,
                message: self.error.unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
            });
        };

        let payload = match self.intent {
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
        };

        AskResponse::Answered { answer, payload }
    }
}

/// Normalized outcome of one exchange
#[derive(Debug, Clone, PartialEq)]
pub enum AskResponse {
    /// The question was answered
    Answered {
        answer: String,
        payload: ReplyPayload,
    },
    /// The endpoint reported an error, or answered with nothing
    Rejected(ReplyError),
}

impl AskResponse {
    pub fn answered(answer: impl Into<String>, payload: ReplyPayload) -> Self {
        AskResponse::Answered {
            answer: answer.into(),
            payload,
        }
    }

    pub fn rejected(intent: Intent, message: impl Into<String>) -> Self {
        AskResponse::Rejected(ReplyError {
            intent,
            message: message.into(),
        })
    }

    /// Response standing in for a non-success HTTP status
    pub fn http_error(status: reqwest::StatusCode) -> Self {
        let reason = status.canonical_reason().unwrap_or_default();
        Self::rejected(
            Intent::Generic,
            format!("Erro HTTP {}: {reason}", status.as_u16()),
        )
    }

    pub fn intent(&self) -> Intent {
        match self {
            AskResponse::Answered { payload, .. } => payload.intent(),
            AskResponse::Rejected(error) => error.intent,
        }
    }
}
