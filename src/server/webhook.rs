//! Webhook endpoint handler.
//!
//! Accepts GitLab webhook deliveries for one recipient, checks the
//! recipient's token, and relays the event before answering. GitLab treats
//! any non-2xx answer as a failed delivery, so transport failures are logged
//! and still answered with 200.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_LENGTH;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use thiserror::Error;
use tracing::{debug, warn};

use super::AppState;
use crate::auth::AuthError;
use crate::delivery::MessagingTransport;
use crate::store::{KvBackend, StoreError};
use crate::types::RecipientId;
use crate::webhooks::{HEADER_EVENT, HEADER_TOKEN, ParseError, parse_event};

/// Largest accepted webhook body.
pub const MAX_BODY_BYTES: usize = 5_000_000;

/// Errors that can occur when processing a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid recipient id {0:?}")]
    InvalidRecipient(String),

    #[error("invalid token")]
    Forbidden,

    #[error("payload larger than {MAX_BODY_BYTES} bytes")]
    PayloadTooLarge,

    #[error("reading body: {0}")]
    Body(#[source] axum::BoxError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("authentication: {0}")]
    Auth(#[from] AuthError),

    #[error("state store: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::Forbidden => StatusCode::FORBIDDEN,
            WebhookError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            WebhookError::InvalidRecipient(_)
            | WebhookError::Body(_)
            | WebhookError::Parse(_)
            | WebhookError::Auth(_)
            | WebhookError::Store(_) => StatusCode::BAD_REQUEST,
        };

        // The reason stays in the logs; GitLab only shows the status text.
        (status, status.canonical_reason().unwrap_or_default()).into_response()
    }
}

/// Webhook handler.
///
/// # Response
///
/// - 200 OK: Event relayed (or its delivery failed and was logged)
/// - 400 Bad Request: Non-integer id, undecodable body, or state store failure
/// - 403 Forbidden: Token does not validate for this recipient
/// - 413 Payload Too Large: Body over [`MAX_BODY_BYTES`]
pub async fn webhook_handler<T, B>(
    State(app_state): State<AppState<T, B>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<&'static str, WebhookError>
where
    T: MessagingTransport,
    B: KvBackend,
{
    let recipient: RecipientId = id
        .parse()
        .map_err(|_| WebhookError::InvalidRecipient(id.clone()))?;
    let event_type = header_str(&headers, HEADER_EVENT);

    debug!(recipient = %recipient, event = %event_type, "Received webhook");

    let token = header_str(&headers, HEADER_TOKEN);
    let valid = app_state
        .auth()
        .check_token(token, recipient)
        .await
        .inspect_err(|e| warn!(recipient = %recipient, error = %e, "Token check failed"))?;
    if !valid {
        warn!(recipient = %recipient, "Invalid webhook token");
        return Err(WebhookError::Forbidden);
    }

    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > MAX_BODY_BYTES as u64) {
        warn!(recipient = %recipient, declared, "Webhook body too large");
        return Err(WebhookError::PayloadTooLarge);
    }

    let payload = Limited::new(body, MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| {
            if e.is::<LengthLimitError>() {
                warn!(recipient = %recipient, "Webhook body too large");
                WebhookError::PayloadTooLarge
            } else {
                WebhookError::Body(e)
            }
        })?
        .to_bytes();

    let event = parse_event(event_type, &payload).inspect_err(
        |e| warn!(recipient = %recipient, event = %event_type, error = %e, "Undecodable webhook"),
    )?;

    app_state
        .relay()
        .handle(recipient, &event)
        .await
        .inspect_err(|e| warn!(recipient = %recipient, error = %e, "Webhook handling failed"))?;

    Ok("OK")
}

/// Returns a header value, or the empty string when it is absent or not text.
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}
