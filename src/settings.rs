//! The settings conversation.
//!
//! Users talk to the community to get their webhook URL and token. Replies
//! carry a keyboard with two commands: show the settings, and reset the
//! token. Any other message is answered with the settings as well.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::auth::{AuthError, TokenAuthority};
use crate::config::endpoint;
use crate::delivery::{Button, ButtonColor, DeliveryDriver, Keyboard, MessagingTransport};
use crate::store::KvBackend;
use crate::types::{MessageId, RecipientId};

pub const GET_SETTING: &str = "get_setting";
pub const RESET_TOKEN: &str = "reset_token";
/// Sent by clients that cannot render the button that was pressed.
pub const NOT_SUPPORTED_BUTTON: &str = "not_supported_button";

/// JSON payload attached to keyboard buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ButtonPayload {
    pub button_type: String,
    pub command: String,
    pub payload: String,
}

/// Serialized payload for a button that issues `command`.
pub fn command_payload(command: &str) -> String {
    serde_json::json!({ "command": command }).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GetSetting,
    ResetToken,
    NotSupportedButton,
    /// Plain text or an unrecognized payload.
    Other,
}

impl Command {
    /// Interprets a message payload. Missing or malformed payloads are [`Command::Other`].
    pub fn from_payload(payload: &str) -> Self {
        let parsed: ButtonPayload = match serde_json::from_str(payload) {
            Ok(parsed) => parsed,
            Err(_) => return Command::Other,
        };

        match parsed.command.as_str() {
            GET_SETTING => Command::GetSetting,
            RESET_TOKEN => Command::ResetToken,
            NOT_SUPPORTED_BUTTON => Command::NotSupportedButton,
            _ => Command::Other,
        }
    }
}

/// An incoming community message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IncomingMessage {
    pub peer_id: i64,
    pub from_id: i64,
    pub text: String,
    pub payload: String,
}

/// What happened to an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Group chat messages are not answered.
    Ignored,
    /// A reply was attempted; `None` if it was not delivered.
    Sent(Option<MessageId>),
}

/// The keyboard attached to every settings reply.
pub fn settings_keyboard() -> Keyboard {
    Keyboard::one_time()
        .row([Button::text(
            "Webhook settings",
            command_payload(GET_SETTING),
        )])
        .row([Button::text(
            "Reset access token",
            command_payload(RESET_TOKEN),
        )
        .with_color(ButtonColor::Negative)])
}

/// The webhook URL for a recipient.
pub fn webhook_url(base: &Url, recipient: RecipientId) -> Url {
    let id = recipient.to_string();
    endpoint(base, ["webhook", id.as_str()])
}

pub fn settings_text(url: &Url, token: &str) -> String {
    format!("URL: {url}\nSecret Token: {token}\n")
}

/// Answers settings requests.
pub struct Settings<T, B> {
    auth: Arc<TokenAuthority<B>>,
    driver: Arc<DeliveryDriver<T>>,
    public_base: Url,
}

impl<T, B> Settings<T, B>
where
    T: MessagingTransport,
    B: KvBackend,
{
    pub fn new(auth: Arc<TokenAuthority<B>>, driver: Arc<DeliveryDriver<T>>, public_base: Url) -> Self {
        Self {
            auth,
            driver,
            public_base,
        }
    }

    pub async fn reply(&self, message: &IncomingMessage) -> Result<Reply, AuthError> {
        let peer = RecipientId(message.peer_id);
        if peer.is_group_chat() {
            debug!(peer = %peer, "Ignoring group chat message");
            return Ok(Reply::Ignored);
        }

        let user = RecipientId(message.from_id);
        let text = match Command::from_payload(&message.payload) {
            Command::NotSupportedButton => {
                info!(user = %user, "Client does not support the button");
                "Your client does not support this button".to_string()
            }
            Command::GetSetting => {
                info!(user = %user, "Settings requested");
                format!("Your webhook settings\n\n{}", self.settings_for(user).await?)
            }
            Command::ResetToken => {
                info!(user = %user, "Token reset requested");
                self.auth.regenerate_token(user).await?;
                format!(
                    "Token reset. New webhook settings:\n\n{}",
                    self.settings_for(user).await?
                )
            }
            Command::Other => {
                format!("Your webhook settings\n\n{}", self.settings_for(user).await?)
            }
        };

        let sent = self.driver.send(peer, &text, Some(settings_keyboard())).await;
        Ok(Reply::Sent(sent))
    }

    async fn settings_for(&self, user: RecipientId) -> Result<String, AuthError> {
        let token = self.auth.generate_token(user).await?;
        Ok(settings_text(&webhook_url(&self.public_base, user), &token))
    }
}
