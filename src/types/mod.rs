//! Core domain types shared across the relay.

pub mod ids;

pub use ids::{MessageId, PipelineId, RecipientId};
