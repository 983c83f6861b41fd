//! Logical names of the values persisted per recipient.

use std::fmt;

/// Prefix applied to every key written to the durable store, so relay data
/// never collides with unrelated values stored under the same user.
pub const KEY_PREFIX: &str = "relay_";

/// A value the relay keeps per recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Process-wide HMAC secret (only stored under [`crate::types::RecipientId::SYSTEM`]).
    Secret,
    /// Per-recipient salt mixed into the webhook token.
    Salt,
    /// Id of the pipeline whose message is currently being extended.
    PipelineLastId,
    /// Chat message that represents the tracked pipeline.
    PipelineMessageId,
}

impl StoreKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::Secret => "secret",
            StoreKey::Salt => "salt",
            StoreKey::PipelineLastId => "pipeline_last_id",
            StoreKey::PipelineMessageId => "pipeline_message_id",
        }
    }

    /// The key as written to the durable store.
    pub fn remote_name(&self) -> String {
        format!("{KEY_PREFIX}{}", self.as_str())
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
