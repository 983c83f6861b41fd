//! VK Callback API endpoint.
//!
//! VK posts community events here as JSON with a `type`, the community id,
//! the secret registered with the callback server, and an event `object`.
//! Anything other than a confirmation must be answered with the literal
//! `ok`, otherwise VK retries the event and eventually disables the server.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::AppState;
use crate::delivery::MessagingTransport;
use crate::settings::IncomingMessage;
use crate::store::KvBackend;

/// Purpose string the callback secret is derived under.
pub const CALLBACK_SECRET_PURPOSE: &str = "vk_callback";

const ACK: &str = "ok";

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("invalid callback body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("callback secret mismatch")]
    Forbidden,

    #[error("confirmation code not yet known")]
    NotReady,
}

impl IntoResponse for CallbackError {
    fn into_response(self) -> Response {
        let status = match self {
            CallbackError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            CallbackError::Forbidden => StatusCode::FORBIDDEN,
            CallbackError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, status.canonical_reason().unwrap_or_default()).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct CallbackRequest {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    group_id: i64,
    #[serde(default)]
    secret: String,
    #[serde(default)]
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct MessageNew {
    message: IncomingMessage,
}

/// Callback handler.
///
/// # Response
///
/// - 200 with the confirmation code for `confirmation`
/// - 200 `ok` for every other event, whether or not handling succeeded
/// - 400 Bad Request: body is not a callback request
/// - 403 Forbidden: secret does not match
/// - 503 Service Unavailable: confirmation requested before registration fetched the code
pub async fn callback_handler<T, B>(
    State(app_state): State<AppState<T, B>>,
    body: Bytes,
) -> Result<String, CallbackError>
where
    T: MessagingTransport,
    B: KvBackend,
{
    let request: CallbackRequest = serde_json::from_slice(&body)?;

    if !app_state
        .auth()
        .verify_derived(&request.secret, CALLBACK_SECRET_PURPOSE)
    {
        warn!(group_id = request.group_id, kind = %request.kind, "Callback secret mismatch");
        return Err(CallbackError::Forbidden);
    }

    match request.kind.as_str() {
        "confirmation" => {
            let code = app_state.confirmation().get().ok_or(CallbackError::NotReady)?;
            info!(group_id = request.group_id, "Answered callback confirmation");
            Ok(code.clone())
        }
        "message_new" => {
            match serde_json::from_value::<MessageNew>(request.object) {
                Ok(event) => {
                    if let Err(e) = app_state.settings().reply(&event.message).await {
                        error!(peer = event.message.peer_id, error = %e, "Settings reply failed");
                    }
                }
                Err(e) => warn!(error = %e, "Undecodable message_new object"),
            }
            Ok(ACK.to_string())
        }
        other => {
            debug!(kind = %other, "Ignoring callback event");
            Ok(ACK.to_string())
        }
    }
}
