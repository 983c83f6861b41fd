//! VK community API: the production messaging transport and durable store.

pub mod client;
pub mod error;
pub mod groups;
pub mod messages;
pub mod storage;

pub use client::VkClient;
pub use error::VkError;
pub use groups::{CallbackServer, REQUIRED_PERMISSIONS, TokenPermissions};
