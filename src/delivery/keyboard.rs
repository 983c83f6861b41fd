//! Chat keyboards attached to outgoing messages.
//!
//! Serializes to the platform's keyboard JSON:
//!
//! ```json
//! {"one_time":false,"inline":true,"buttons":[[{"action":{"type":"open_link","link":"...","label":"Open"}}]]}
//! ```

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Keyboard {
    one_time: bool,
    inline: bool,
    buttons: Vec<Vec<Button>>,
}

impl Keyboard {
    /// A keyboard rendered inside the message it is attached to.
    pub fn inline() -> Self {
        Self {
            one_time: false,
            inline: true,
            buttons: Vec::new(),
        }
    }

    /// A reply keyboard that hides after the user presses a button.
    pub fn one_time() -> Self {
        Self {
            one_time: true,
            inline: false,
            buttons: Vec::new(),
        }
    }

    /// Inline keyboard with a single link button.
    pub fn link(url: impl Into<String>, label: impl Into<String>) -> Self {
        Self::inline().row([Button::open_link(url, label)])
    }

    /// Appends a row of buttons.
    pub fn row(mut self, buttons: impl IntoIterator<Item = Button>) -> Self {
        self.buttons.push(buttons.into_iter().collect());
        self
    }

    pub fn rows(&self) -> &[Vec<Button>] {
        &self.buttons
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<ButtonColor>,
}

impl Button {
    pub fn open_link(url: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action: Action::OpenLink {
                link: url.into(),
                label: label.into(),
            },
            color: None,
        }
    }

    /// A button that sends `payload` back to the bot when pressed.
    pub fn text(label: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            action: Action::Text {
                label: label.into(),
                payload: payload.into(),
            },
            color: None,
        }
    }

    pub fn with_color(mut self, color: ButtonColor) -> Self {
        self.color = Some(color);
        self
    }

    pub fn label(&self) -> &str {
        match &self.action {
            Action::OpenLink { label, .. } | Action::Text { label, .. } => label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Action {
    OpenLink { link: String, label: String },
    Text { label: String, payload: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonColor {
    Primary,
    Secondary,
    Negative,
    Positive,
}
