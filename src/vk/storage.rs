//! `storage.*` methods, exposed as a [`KvBackend`].
//!
//! VK keeps small string values per (community, user). Values written for
//! a user id that never talked to the community are still retrievable, which
//! is what lets the process secret live under a reserved id.

use serde::Deserialize;

use super::client::VkClient;
use crate::store::{BackendError, KvBackend};
use crate::types::RecipientId;

#[derive(Debug, Deserialize)]
struct StorageEntry {
    key: String,
    #[serde(default)]
    value: String,
}

impl KvBackend for VkClient {
    async fn get(&self, recipient: RecipientId, key: &str) -> Result<String, BackendError> {
        let entries: Vec<StorageEntry> = self
            .call(
                "storage.get",
                vec![
                    ("keys", key.to_string()),
                    ("user_id", recipient.to_string()),
                ],
            )
            .await?;

        Ok(entries
            .into_iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.value)
            .unwrap_or_default())
    }

    async fn set(&self, recipient: RecipientId, key: &str, value: &str) -> Result<(), BackendError> {
        let _: i64 = self
            .call(
                "storage.set",
                vec![
                    ("key", key.to_string()),
                    ("value", value.to_string()),
                    ("user_id", recipient.to_string()),
                ],
            )
            .await?;
        Ok(())
    }
}
