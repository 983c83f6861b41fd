//! HTTP server for the relay.
//!
//! # Endpoints
//!
//! - `POST /webhook/{id}` - Accepts GitLab webhook deliveries for recipient `id`
//! - `POST /callback` - VK Callback API: confirmation and incoming messages
//! - `GET /health` - Returns 200 if server is running

use std::sync::{Arc, OnceLock};

use tower_http::trace::TraceLayer;
use url::Url;

use crate::auth::TokenAuthority;
use crate::delivery::{DeliveryDriver, MessagingTransport};
use crate::notify::Relay;
use crate::settings::Settings;
use crate::store::{KvBackend, StateStore};

pub mod callback;
pub mod health;
pub mod webhook;

pub use callback::{CALLBACK_SECRET_PURPOSE, CallbackError, callback_handler};
pub use health::health_handler;
pub use webhook::{MAX_BODY_BYTES, WebhookError, webhook_handler};

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor.
pub struct AppState<T, B> {
    inner: Arc<AppStateInner<T, B>>,
}

struct AppStateInner<T, B> {
    relay: Relay<T, B>,
    auth: Arc<TokenAuthority<B>>,
    settings: Settings<T, B>,

    /// Secret VK sends with every callback request.
    callback_secret: String,

    /// Set once the community's confirmation code is known.
    confirmation: OnceLock<String>,
}

// Not derived: the derive would demand `T: Clone` and `B: Clone`.
impl<T, B> Clone for AppState<T, B> {
    fn clone(&self) -> Self {
        AppState {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, B> AppState<T, B>
where
    T: MessagingTransport,
    B: KvBackend,
{
    pub fn new(
        store: Arc<StateStore<B>>,
        driver: Arc<DeliveryDriver<T>>,
        auth: Arc<TokenAuthority<B>>,
        public_base: Url,
    ) -> Self {
        let callback_secret = auth.derive(CALLBACK_SECRET_PURPOSE);
        AppState {
            inner: Arc::new(AppStateInner {
                relay: Relay::new(store, driver.clone()),
                settings: Settings::new(auth.clone(), driver, public_base),
                auth,
                callback_secret,
                confirmation: OnceLock::new(),
            }),
        }
    }

    pub fn relay(&self) -> &Relay<T, B> {
        &self.inner.relay
    }

    pub fn auth(&self) -> &TokenAuthority<B> {
        &self.inner.auth
    }

    pub fn settings(&self) -> &Settings<T, B> {
        &self.inner.settings
    }

    /// The secret to register with the callback server.
    pub fn callback_secret(&self) -> &str {
        &self.inner.callback_secret
    }

    /// The community's callback confirmation code, published at registration.
    pub fn confirmation(&self) -> &OnceLock<String> {
        &self.inner.confirmation
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router<T, B>(app_state: AppState<T, B>) -> axum::Router
where
    T: MessagingTransport + 'static,
    B: KvBackend + 'static,
{
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook/{id}", post(webhook_handler::<T, B>))
        .route("/callback", post(callback_handler::<T, B>))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
