//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different ID types (e.g., using a
//! pipeline id where a chat message id is expected) and make the code more
//! self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A conversation that receives notifications.
///
/// On the messaging platform this is the peer id of a user who talked to the
/// community. Peer ids above [`RecipientId::SYSTEM`] belong to group chats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipientId(pub i64);

impl RecipientId {
    /// Reserved identity under which process-wide values (the HMAC secret)
    /// are persisted. No real user has this id.
    pub const SYSTEM: RecipientId = RecipientId(2_000_000_000);

    /// Returns true for peers that are group chats rather than users.
    pub fn is_group_chat(&self) -> bool {
        self.0 > Self::SYSTEM.0
    }
}

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RecipientId {
    fn from(n: i64) -> Self {
        RecipientId(n)
    }
}

impl FromStr for RecipientId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(RecipientId)
    }
}

/// A chat message id on the messaging platform.
///
/// The platform uses `0` to mean "no message"; that value is never wrapped
/// here; absence is `Option::None` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(i64);

impl MessageId {
    /// Wraps a raw id, returning `None` for the zero sentinel.
    pub fn new(raw: i64) -> Option<Self> {
        (raw != 0).then_some(MessageId(raw))
    }

    /// Parses a stored id. Empty, malformed and zero values yield `None`.
    pub fn parse_stored(stored: &str) -> Option<Self> {
        stored.trim().parse().ok().and_then(Self::new)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A CI pipeline id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(pub u64);

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PipelineId {
    fn from(n: u64) -> Self {
        PipelineId(n)
    }
}
