//! `groups.*` methods used at startup: token permissions and Callback API
//! server registration.

use serde::Deserialize;

use super::client::VkClient;
use super::error::VkError;

/// Permission bit for community messages.
pub const PERMISSION_MESSAGES: i64 = 1 << 12;
/// Permission bit for community management (needed for callback servers).
pub const PERMISSION_MANAGE: i64 = 1 << 18;
/// Every bit the relay needs.
pub const REQUIRED_PERMISSIONS: i64 = PERMISSION_MESSAGES | PERMISSION_MANAGE;

/// Title shown for the callback server in the community settings.
/// VK caps titles at 14 characters.
pub const CALLBACK_SERVER_TITLE: &str = "GitLab relay";

#[derive(Debug, Clone, Deserialize)]
pub struct TokenPermissions {
    pub mask: i64,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Permission {
    pub name: String,
    #[serde(default)]
    pub setting: i64,
}

impl TokenPermissions {
    pub fn has_required(&self) -> bool {
        self.mask & REQUIRED_PERMISSIONS == REQUIRED_PERMISSIONS
    }

    /// Names of the granted permissions, for diagnostics.
    pub fn names(&self) -> Vec<&str> {
        self.permissions.iter().map(|p| p.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackServer {
    pub id: i64,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct Group {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct ConfirmationCode {
    code: String,
}

#[derive(Debug, Deserialize)]
struct CallbackServers {
    #[serde(default)]
    items: Vec<CallbackServer>,
}

#[derive(Debug, Deserialize)]
struct AddedServer {
    server_id: i64,
}

impl VkClient {
    pub async fn token_permissions(&self) -> Result<TokenPermissions, VkError> {
        self.call("groups.getTokenPermissions", Vec::new()).await
    }

    /// Id of the community the access token belongs to.
    pub async fn group_id(&self) -> Result<i64, VkError> {
        let groups: Vec<Group> = self.call("groups.getById", Vec::new()).await?;
        groups
            .into_iter()
            .next()
            .map(|group| group.id)
            .ok_or_else(|| VkError::EmptyResponse {
                method: "groups.getById".to_string(),
            })
    }

    pub async fn callback_confirmation_code(&self, group_id: i64) -> Result<String, VkError> {
        let code: ConfirmationCode = self
            .call(
                "groups.getCallbackConfirmationCode",
                vec![("group_id", group_id.to_string())],
            )
            .await?;
        Ok(code.code)
    }

    pub async fn callback_servers(&self, group_id: i64) -> Result<Vec<CallbackServer>, VkError> {
        let servers: CallbackServers = self
            .call(
                "groups.getCallbackServers",
                vec![("group_id", group_id.to_string())],
            )
            .await?;
        Ok(servers.items)
    }

    /// Registers a callback server and returns its id.
    pub async fn add_callback_server(
        &self,
        group_id: i64,
        url: &str,
        secret_key: &str,
    ) -> Result<i64, VkError> {
        let added: AddedServer = self
            .call(
                "groups.addCallbackServer",
                vec![
                    ("group_id", group_id.to_string()),
                    ("url", url.to_string()),
                    ("title", CALLBACK_SERVER_TITLE.to_string()),
                    ("secret_key", secret_key.to_string()),
                ],
            )
            .await?;
        Ok(added.server_id)
    }

    /// Rewrites an existing server's secret so it matches this process.
    pub async fn edit_callback_server(
        &self,
        group_id: i64,
        server_id: i64,
        url: &str,
        secret_key: &str,
    ) -> Result<(), VkError> {
        let _: i64 = self
            .call(
                "groups.editCallbackServer",
                vec![
                    ("group_id", group_id.to_string()),
                    ("server_id", server_id.to_string()),
                    ("url", url.to_string()),
                    ("title", CALLBACK_SERVER_TITLE.to_string()),
                    ("secret_key", secret_key.to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    /// Subscribes a callback server to incoming messages.
    pub async fn enable_message_events(&self, group_id: i64, server_id: i64, api_version: &str) -> Result<(), VkError> {
        let _: i64 = self
            .call(
                "groups.setCallbackSettings",
                vec![
                    ("group_id", group_id.to_string()),
                    ("server_id", server_id.to_string()),
                    ("api_version", api_version.to_string()),
                    ("message_new", "1".to_string()),
                ],
            )
            .await?;
        Ok(())
    }
}
