//! Webhook handling for GitLab events.
//!
//! This module provides:
//! - Token derivation and verification for webhook URLs (HMAC-SHA256)
//! - Typed event records and the payload parser

pub mod events;
pub mod parser;
pub mod signature;

pub use events::{CiStatus, EventType, GitLabEvent, HEADER_EVENT, HEADER_TOKEN, NULL_SHA};
pub use parser::{ParseError, parse_event};
pub use signature::{compute_token, token_payload, verify_token};
