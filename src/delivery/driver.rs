//! Sends and edits chat messages on top of a [`MessagingTransport`].

use thiserror::Error;
use tracing::{debug, error, info};

use super::retry::{RetryConfig, RetryResult, retry_with_pause};
use super::{Keyboard, MessagingTransport, OutgoingMessage, TransportError, TransportErrorKind};
use crate::types::{MessageId, RecipientId};

/// Why appending to an existing message failed.
#[derive(Debug, Error)]
pub enum EditError {
    #[error("fetching message {id}: {source}")]
    Fetch {
        id: MessageId,
        #[source]
        source: TransportError,
    },

    #[error("message {0} no longer exists")]
    NotFound(MessageId),

    #[error("editing message {id}: {source}")]
    Edit {
        id: MessageId,
        #[source]
        source: TransportError,
    },
}

/// Delivery policy over a transport.
pub struct DeliveryDriver<T> {
    transport: T,
    retry: RetryConfig,
}

impl<T: MessagingTransport> DeliveryDriver<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            retry: RetryConfig::DEFAULT,
        }
    }

    /// Sends a message, retrying throttling and server failures.
    ///
    /// Returns the new message id, or `None` if the message was not
    /// delivered. Failures are logged here and never propagate: a message
    /// that could not be delivered must not fail the webhook that caused it.
    pub async fn send(
        &self,
        peer: RecipientId,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Option<MessageId> {
        let message = OutgoingMessage::new(peer, text, keyboard);

        match retry_with_pause(self.retry, || self.transport.send_message(&message)).await {
            RetryResult::Success(id) => {
                debug!(recipient = %peer, message_id = %id, "Message sent");
                Some(id)
            }
            RetryResult::ExhaustedRetries {
                last_error,
                attempts,
            } => {
                error!(
                    recipient = %peer,
                    attempts,
                    error = %last_error,
                    "Giving up on message after retries"
                );
                None
            }
            RetryResult::PermanentError(e) if e.kind == TransportErrorKind::RecipientDenied => {
                info!(recipient = %peer, error = %e, "Recipient does not accept messages");
                None
            }
            RetryResult::PermanentError(e) => {
                error!(recipient = %peer, code = ?e.code, error = %e, "Message send failed");
                None
            }
        }
    }

    /// Appends a line to an existing message.
    ///
    /// The current text is fetched first and the edit replaces it with
    /// `existing + "\n" + appended`. Nothing here is retried; the caller
    /// decides what to do with a failed edit.
    pub async fn edit(
        &self,
        peer: RecipientId,
        id: MessageId,
        appended: &str,
    ) -> Result<(), EditError> {
        let existing = self
            .transport
            .fetch_message(id)
            .await
            .map_err(|source| EditError::Fetch { id, source })?
            .ok_or(EditError::NotFound(id))?;

        let text = format!("{existing}\n{appended}");
        self.transport
            .edit_message(peer, id, &text)
            .await
            .map_err(|source| EditError::Edit { id, source })?;

        debug!(recipient = %peer, message_id = %id, "Message edited");
        Ok(())
    }
}
