//! `messages.*` methods, exposed as a [`MessagingTransport`].

use serde::Deserialize;

use super::client::{Params, VkClient};
use crate::delivery::{MessagingTransport, OutgoingMessage, TransportError};
use crate::types::{MessageId, RecipientId};

#[derive(Debug, Deserialize)]
struct MessagesById {
    #[serde(default)]
    items: Vec<MessageItem>,
}

#[derive(Debug, Deserialize)]
struct MessageItem {
    #[serde(default)]
    text: String,
}

fn send_params(message: &OutgoingMessage) -> Result<Params, serde_json::Error> {
    let mut params: Params = vec![
        ("peer_id", message.peer.to_string()),
        ("random_id", "0".to_string()),
        ("message", message.text.clone()),
        ("disable_mentions", "1".to_string()),
        ("dont_parse_links", "1".to_string()),
    ];
    if let Some(keyboard) = &message.keyboard {
        params.push(("keyboard", keyboard.to_json()?));
    }
    Ok(params)
}

fn edit_params(peer: RecipientId, id: MessageId, text: &str) -> Params {
    vec![
        ("peer_id", peer.to_string()),
        ("message_id", id.to_string()),
        ("message", text.to_string()),
        ("disable_mentions", "1".to_string()),
        ("dont_parse_links", "1".to_string()),
    ]
}

impl MessagingTransport for VkClient {
    async fn send_message(&self, message: &OutgoingMessage) -> Result<MessageId, TransportError> {
        let params = send_params(message)
            .map_err(|e| TransportError::other(format!("encoding keyboard: {e}")))?;

        let raw: i64 = self.call("messages.send", params).await?;
        MessageId::new(raw).ok_or_else(|| TransportError::other("messages.send returned no message id"))
    }

    async fn edit_message(
        &self,
        peer: RecipientId,
        id: MessageId,
        text: &str,
    ) -> Result<(), TransportError> {
        let _: i64 = self
            .call("messages.edit", edit_params(peer, id, text))
            .await?;
        Ok(())
    }

    async fn fetch_message(&self, id: MessageId) -> Result<Option<String>, TransportError> {
        let found: MessagesById = self
            .call("messages.getById", vec![("message_ids", id.to_string())])
            .await?;
        Ok(found.items.into_iter().next().map(|item| item.text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{Keyboard, TransportErrorKind};
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> VkClient {
        VkClient::new(&server.base_url(), "tok", "5.131").unwrap()
    }

    #[test]
    fn send_disables_mentions_and_previews() {
        let message = OutgoingMessage::new(RecipientId(5), "hi", None);
        let params = send_params(&message).unwrap();

        assert!(params.contains(&("peer_id", "5".to_string())));
        assert!(params.contains(&("disable_mentions", "1".to_string())));
        assert!(params.contains(&("dont_parse_links", "1".to_string())));
        assert!(!params.iter().any(|(k, _)| *k == "keyboard"));
    }

    #[test]
    fn send_encodes_keyboard() {
        let message = OutgoingMessage::new(RecipientId(5), "hi", Some(Keyboard::link("https://x", "Open")));
        let params = send_params(&message).unwrap();

        let (_, keyboard) = params.iter().find(|(k, _)| *k == "keyboard").unwrap();
        let value: serde_json::Value = serde_json::from_str(keyboard).unwrap();
        assert_eq!(value["inline"], json!(true));
    }

    #[tokio::test]
    async fn send_returns_message_id() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/messages.send")
                .body_includes("peer_id=5")
                .body_includes("dont_parse_links=1");
            then.status(200).json_body(json!({"response": 321}));
        });

        let id = client(&server)
            .send_message(&OutgoingMessage::new(RecipientId(5), "hi", None))
            .await
            .unwrap();

        assert_eq!(id.get(), 321);
        mock.assert();
    }

    #[tokio::test]
    async fn send_classifies_api_errors() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/messages.send");
            then.status(200)
                .json_body(json!({"error": {"error_code": 6, "error_msg": "Too many requests per second"}}));
        });

        let err = client(&server)
            .send_message(&OutgoingMessage::new(RecipientId(5), "hi", None))
            .await
            .unwrap_err();

        assert_eq!(err.kind, TransportErrorKind::RateLimited);
        assert_eq!(err.code, Some(6));
    }

    #[tokio::test]
    async fn zero_message_id_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/messages.send");
            then.status(200).json_body(json!({"response": 0}));
        });

        let err = client(&server)
            .send_message(&OutgoingMessage::new(RecipientId(5), "hi", None))
            .await
            .unwrap_err();

        assert_eq!(err.kind, TransportErrorKind::Other);
    }

    #[tokio::test]
    async fn fetch_returns_text_or_none() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/messages.getById")
                .body_includes("message_ids=7");
            then.status(200)
                .json_body(json!({"response": {"count": 1, "items": [{"id": 7, "text": "line one"}]}}));
        });
        server.mock(|when, then| {
            when.method(POST)
                .path("/messages.getById")
                .body_includes("message_ids=8");
            then.status(200)
                .json_body(json!({"response": {"count": 0, "items": []}}));
        });

        let client = client(&server);
        assert_eq!(
            client.fetch_message(MessageId::new(7).unwrap()).await.unwrap().as_deref(),
            Some("line one")
        );
        assert_eq!(client.fetch_message(MessageId::new(8).unwrap()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn edit_posts_full_text() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/messages.edit")
                .body_includes("message_id=7")
                .body_includes("peer_id=5");
            then.status(200).json_body(json!({"response": 1}));
        });

        client(&server)
            .edit_message(RecipientId(5), MessageId::new(7).unwrap(), "a\nb")
            .await
            .unwrap();

        mock.assert();
    }
}
