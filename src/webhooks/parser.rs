//! GitLab webhook payload parser.
//!
//! # Parsing Strategy
//!
//! 1. The event type is determined from the `X-Gitlab-Event` header
//! 2. The payload is decoded into the struct for that event type
//! 3. Unknown event types become [`GitLabEvent::Unknown`], provided the body is
//!    still well-formed JSON
//! 4. Malformed payloads return `Err` with details

use thiserror::Error;

use super::events::{
    EventType, GitLabEvent, IssueEvent, JobEvent, MergeRequestEvent, NoteEvent, PipelineEvent,
    PushEvent, TagPushEvent, WikiPageEvent,
};

/// Error type for webhook parsing failures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON deserialization failed.
    #[error("malformed {event_type} payload: {source}")]
    Json {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Parses a webhook payload into a typed event.
///
/// # Examples
///
/// ```
/// use gitlab_chat_relay::webhooks::{GitLabEvent, parse_event};
///
/// let payload = br#"{"build_status": "running", "pipeline_id": 42}"#;
/// let event = parse_event("Job Hook", payload).unwrap();
/// assert!(matches!(event, GitLabEvent::Job(_)));
///
/// let event = parse_event("Deployment Hook", b"{}").unwrap();
/// assert!(matches!(event, GitLabEvent::Unknown { .. }));
/// ```
pub fn parse_event(event_type: &str, payload: &[u8]) -> Result<GitLabEvent, ParseError> {
    let json_err = |source: serde_json::Error| ParseError::Json {
        event_type: event_type.to_string(),
        source,
    };

    let event = match EventType::from_header(event_type) {
        EventType::Push => GitLabEvent::Push(decode::<PushEvent>(payload).map_err(json_err)?),
        EventType::TagPush => {
            GitLabEvent::TagPush(decode::<TagPushEvent>(payload).map_err(json_err)?)
        }
        EventType::Issue | EventType::ConfidentialIssue => {
            GitLabEvent::Issue(decode::<IssueEvent>(payload).map_err(json_err)?)
        }
        EventType::MergeRequest => {
            GitLabEvent::MergeRequest(decode::<MergeRequestEvent>(payload).map_err(json_err)?)
        }
        EventType::Note | EventType::ConfidentialNote => {
            GitLabEvent::Note(decode::<NoteEvent>(payload).map_err(json_err)?)
        }
        EventType::WikiPage => {
            GitLabEvent::WikiPage(decode::<WikiPageEvent>(payload).map_err(json_err)?)
        }
        EventType::Job | EventType::Build => {
            GitLabEvent::Job(decode::<JobEvent>(payload).map_err(json_err)?)
        }
        EventType::Pipeline => {
            GitLabEvent::Pipeline(decode::<PipelineEvent>(payload).map_err(json_err)?)
        }
        EventType::Other(tag) => {
            // Still require a JSON body so garbage is rejected uniformly.
            decode::<serde_json::Value>(payload).map_err(json_err)?;
            GitLabEvent::Unknown { event_type: tag }
        }
    };

    Ok(event)
}

fn decode<T: serde::de::DeserializeOwned>(payload: &[u8]) -> Result<T, serde_json::Error> {
    serde_json::from_slice(payload)
}
