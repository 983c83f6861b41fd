//! Minimal VK API client.
//!
//! Every method is a form-encoded POST to `{api_base}/{method}` carrying the
//! community access token and the API version. Responses are wrapped in an
//! envelope holding either `response` or `error`.

use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use super::error::VkError;

/// Per-request timeout. Sends run under the state store lock, so a send that
/// exhausts its retries holds the lock for up to three of these plus the pauses.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct Envelope<R> {
    response: Option<R>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error_code: i64,
    #[serde(default)]
    error_msg: String,
}

/// Parameters of one API call.
pub type Params = Vec<(&'static str, String)>;

#[derive(Clone)]
pub struct VkClient {
    http: reqwest::Client,
    api_base: String,
    access_token: String,
    api_version: String,
}

impl VkClient {
    pub fn new(
        api_base: &str,
        access_token: &str,
        api_version: &str,
    ) -> Result<Self, VkError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            )),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(VkError::Client)?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            access_token: access_token.trim().to_string(),
            api_version: api_version.to_string(),
        })
    }

    /// Calls an API method and decodes its `response` payload.
    pub async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        mut params: Params,
    ) -> Result<R, VkError> {
        params.push(("access_token", self.access_token.clone()));
        params.push(("v", self.api_version.clone()));

        let response = self
            .http
            .post(format!("{}/{}", self.api_base, method))
            .form(&params)
            .send()
            .await
            .map_err(|source| VkError::Http {
                method: method.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(VkError::Status {
                method: method.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|source| VkError::Http {
            method: method.to_string(),
            source,
        })?;
        trace!(method, body = %String::from_utf8_lossy(&body), "VK API response");

        decode_envelope(method, &body)
    }
}

fn decode_envelope<R: DeserializeOwned>(method: &str, body: &[u8]) -> Result<R, VkError> {
    let envelope: Envelope<R> =
        serde_json::from_slice(body).map_err(|source| VkError::Decode {
            method: method.to_string(),
            source,
        })?;

    match envelope {
        Envelope {
            error: Some(error), ..
        } => Err(VkError::Api {
            method: method.to_string(),
            code: error.error_code,
            message: error.error_msg,
        }),
        Envelope {
            response: Some(response),
            ..
        } => Ok(response),
        Envelope { .. } => Err(VkError::EmptyResponse {
            method: method.to_string(),
        }),
    }
}
