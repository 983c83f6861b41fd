//! GitLab Chat Relay - forwards GitLab webhook activity to VK community
//! conversations.
//!
//! Each recipient gets its own authenticated webhook URL. Events are
//! formatted into chat messages, and CI pipeline and job updates for one
//! pipeline are coalesced into a single message that is edited in place.

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod delivery;
pub mod notify;
pub mod server;
pub mod settings;
pub mod store;
pub mod types;
pub mod vk;
pub mod webhooks;

#[cfg(test)]
pub mod test_utils;
