//! Outbound message delivery.
//!
//! The [`MessagingTransport`] trait is the seam between the relay and the chat
//! platform. [`DeliveryDriver`] sits on top of it and owns the retry policy:
//! which transport failures are worth another attempt, how long to pause, and
//! what to log when delivery gives up.

use std::future::Future;

use thiserror::Error;

use crate::types::{MessageId, RecipientId};

pub mod driver;
pub mod keyboard;
pub mod retry;

pub use driver::{DeliveryDriver, EditError};
pub use keyboard::{Button, ButtonColor, Keyboard};
pub use retry::{RetryConfig, RetryResult, retry_with_pause};

/// Classification of a transport failure, used for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The platform is throttling us. Safe to retry after a pause.
    RateLimited,

    /// The platform had an internal failure. Safe to retry after a pause.
    Server,

    /// The recipient does not accept messages from the community.
    ///
    /// Expected for users who blocked the bot; not worth an error log.
    RecipientDenied,

    /// Anything else, including network failures and malformed responses.
    Other,
}

impl TransportErrorKind {
    /// Returns true if another attempt may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            TransportErrorKind::RateLimited | TransportErrorKind::Server
        )
    }
}

/// A failed transport call.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,

    /// Platform error code, when the platform supplied one.
    pub code: Option<i64>,

    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }
}

/// A chat message about to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub peer: RecipientId,
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

impl OutgoingMessage {
    pub fn new(peer: RecipientId, text: impl Into<String>, keyboard: Option<Keyboard>) -> Self {
        Self {
            peer,
            text: text.into(),
            keyboard,
        }
    }
}

/// The chat platform's message API.
///
/// Implementations send every message with mentions disabled and link
/// previews turned off.
pub trait MessagingTransport: Send + Sync {
    /// Sends a message and returns the id the platform assigned to it.
    fn send_message(
        &self,
        message: &OutgoingMessage,
    ) -> impl Future<Output = Result<MessageId, TransportError>> + Send;

    /// Replaces the text of a previously sent message.
    fn edit_message(
        &self,
        peer: RecipientId,
        id: MessageId,
        text: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Fetches the current text of a message, or `None` if the platform
    /// no longer has it.
    fn fetch_message(
        &self,
        id: MessageId,
    ) -> impl Future<Output = Result<Option<String>, TransportError>> + Send;
}
