//! VK API error types.
//!
//! The API answers almost every failure with HTTP 200 and an
//! `{"error": {"error_code": N, "error_msg": "..."}}` body. The codes the
//! relay reacts to:
//!
//! - **6** too many requests per second: retriable after a pause
//! - **10** internal server error: retriable after a pause
//! - **901** the user has not allowed messages from the community: permanent,
//!   and expected often enough that it is not an error worth alerting on
//!
//! Everything else, network failures included, is treated as permanent.

use thiserror::Error;

use crate::delivery::{TransportError, TransportErrorKind};
use crate::store::BackendError;

pub const ERR_TOO_MANY_REQUESTS: i64 = 6;
pub const ERR_SERVER: i64 = 10;
pub const ERR_MESSAGES_DENY_SEND: i64 = 901;

#[derive(Debug, Error)]
pub enum VkError {
    /// The request never produced a response.
    #[error("{method}: request failed: {source}")]
    Http {
        method: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status.
    #[error("{method}: unexpected HTTP status {status}")]
    Status { method: String, status: u16 },

    /// The response body was not the expected JSON.
    #[error("{method}: malformed response: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    /// The API returned an error object.
    #[error("{method}: API error {code}: {message}")]
    Api {
        method: String,
        code: i64,
        message: String,
    },

    /// Neither `response` nor `error` was present.
    #[error("{method}: response has no payload")]
    EmptyResponse { method: String },

    /// The client could not be constructed.
    #[error("building HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl VkError {
    /// The API error code, if the API returned one.
    pub fn code(&self) -> Option<i64> {
        match self {
            VkError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Classifies the error for retry decisions.
    pub fn kind(&self) -> TransportErrorKind {
        match self.code() {
            Some(ERR_TOO_MANY_REQUESTS) => TransportErrorKind::RateLimited,
            Some(ERR_SERVER) => TransportErrorKind::Server,
            Some(ERR_MESSAGES_DENY_SEND) => TransportErrorKind::RecipientDenied,
            _ => TransportErrorKind::Other,
        }
    }
}

impl From<VkError> for TransportError {
    fn from(e: VkError) -> Self {
        let error = TransportError::new(e.kind(), e.to_string());
        match e.code() {
            Some(code) => error.with_code(code),
            None => error,
        }
    }
}

impl From<VkError> for BackendError {
    fn from(e: VkError) -> Self {
        BackendError::new(e.to_string())
    }
}
