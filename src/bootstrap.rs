//! Process startup.
//!
//! Startup checks the access token, loads the process secret, and starts the
//! HTTP server. Callback API registration runs next to the server because VK
//! confirms a new callback URL by calling it, so the server must already be
//! answering when the registration request goes out.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

use crate::auth::{AuthError, TokenAuthority, load_or_create_secret};
use crate::config::{Config, ConfigError, endpoint, public_base};
use crate::delivery::DeliveryDriver;
use crate::server::{AppState, build_router};
use crate::store::StateStore;
use crate::vk::{VkClient, VkError};

/// Errors that stop the process before or while serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("VK API: {0}")]
    Vk(#[from] VkError),

    #[error("access token lacks the messages and manage permissions (granted: {granted:?})")]
    MissingPermissions { granted: Vec<String> },

    #[error("loading webhook secret: {0}")]
    Secret(#[from] AuthError),

    #[error("callback registration failed: {0}")]
    Callback(#[source] VkError),

    #[error("binding {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server: {0}")]
    Serve(#[source] std::io::Error),
}

/// Verifies the access token can send messages and manage the community.
pub async fn check_permissions(client: &VkClient) -> Result<(), StartupError> {
    let permissions = client.token_permissions().await?;
    if !permissions.has_required() {
        return Err(StartupError::MissingPermissions {
            granted: permissions.names().into_iter().map(str::to_string).collect(),
        });
    }
    Ok(())
}

/// Registers `callback_url` with the community and subscribes it to messages.
///
/// The confirmation code is published into `confirmation` before the server
/// is added, since VK calls the URL back during `addCallbackServer`. An
/// existing server with the same URL is reused and its secret rewritten.
/// Returns the server id.
pub async fn register_callback(
    client: &VkClient,
    callback_url: &Url,
    secret_key: &str,
    api_version: &str,
    confirmation: &OnceLock<String>,
) -> Result<i64, VkError> {
    let group_id = client.group_id().await?;

    let code = client.callback_confirmation_code(group_id).await?;
    if let Err(code) = confirmation.set(code) {
        if confirmation.get() != Some(&code) {
            warn!(group_id, "Confirmation code changed after it was published");
        }
    }

    let url = callback_url.as_str();
    let existing = client
        .callback_servers(group_id)
        .await?
        .into_iter()
        .find(|server| server.url == url);

    let server_id = match existing {
        Some(server) => {
            client
                .edit_callback_server(group_id, server.id, url, secret_key)
                .await?;
            info!(group_id, server_id = server.id, url, "Updated callback server");
            server.id
        }
        None => {
            let server_id = client.add_callback_server(group_id, url, secret_key).await?;
            info!(group_id, server_id, url, "Added callback server");
            server_id
        }
    };

    client
        .enable_message_events(group_id, server_id, api_version)
        .await?;
    Ok(server_id)
}

/// Runs the relay until `shutdown` is cancelled or callback registration fails.
pub async fn run(config: Config, shutdown: CancellationToken) -> Result<(), StartupError> {
    let base = public_base(&config.domain)?;
    let client = VkClient::new(&config.api_base, &config.access_token, &config.api_version)?;

    check_permissions(&client).await?;

    let store = Arc::new(StateStore::new(client.clone()));
    let secret = load_or_create_secret(&store).await?;
    let auth = Arc::new(TokenAuthority::new(store.clone(), secret));
    let driver = Arc::new(DeliveryDriver::new(client.clone()));
    let state = AppState::new(store, driver, auth, base.clone());

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: config.addr,
            source,
        })?;
    info!(addr = %config.addr, base = %base, "Listening");

    let registration = {
        let state = state.clone();
        let shutdown = shutdown.clone();
        let callback_url = endpoint(&base, ["callback"]);
        let api_version = config.api_version.clone();
        tokio::spawn(async move {
            let result = register_callback(
                &client,
                &callback_url,
                state.callback_secret(),
                &api_version,
                state.confirmation(),
            )
            .await;
            if let Err(e) = &result {
                error!(error = %e, "Callback registration failed, shutting down");
                shutdown.cancel();
            }
            result
        })
    };

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(StartupError::Serve)?;

    if !registration.is_finished() {
        registration.abort();
        return Ok(());
    }
    match registration.await {
        Ok(Err(e)) => Err(StartupError::Callback(e)),
        Ok(Ok(_)) => Ok(()),
        Err(e) => {
            warn!(error = %e, "Callback registration task did not complete");
            Ok(())
        }
    }
}
