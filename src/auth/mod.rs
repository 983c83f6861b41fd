//! Per-recipient webhook authentication.
//!
//! Every recipient gets a webhook URL `/webhook/{id}` and a secret token to
//! paste into GitLab. The token is derived, never stored: it is the HMAC of
//! `"{id}_{salt}"` under a process-wide secret. The salt is created lazily
//! the first time a token is needed, and replacing it revokes every URL that
//! was handed out before.
//!
//! The process secret lives in the durable store under
//! [`RecipientId::SYSTEM`] and is created on first boot.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::store::{KvBackend, StateStore, StoreError, StoreGuard, StoreKey};
use crate::types::RecipientId;
use crate::webhooks::{compute_token, token_payload, verify_token};

pub mod random;

pub use random::{RandomError, random_alphanumeric};

/// Length of the process-wide HMAC secret.
pub const SECRET_LEN: usize = 32;

/// Length of a recipient's salt.
pub const SALT_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("state store: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Random(#[from] RandomError),
}

/// Loads the process secret, creating and persisting it if this is the first boot.
pub async fn load_or_create_secret<B: KvBackend>(store: &StateStore<B>) -> Result<String, AuthError> {
    let mut guard = store.lock().await;

    let secret = guard.get(RecipientId::SYSTEM, StoreKey::Secret).await?;
    if !secret.is_empty() {
        return Ok(secret);
    }

    let secret = random_alphanumeric(SECRET_LEN)?;
    guard
        .set(RecipientId::SYSTEM, StoreKey::Secret, &secret)
        .await?;
    info!("Generated new webhook secret");
    Ok(secret)
}

/// Issues and checks webhook tokens.
pub struct TokenAuthority<B> {
    store: Arc<StateStore<B>>,
    secret: Vec<u8>,
}

impl<B: KvBackend> TokenAuthority<B> {
    pub fn new(store: Arc<StateStore<B>>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            store,
            secret: secret.into(),
        }
    }

    /// Returns the token for a recipient, creating its salt if needed.
    pub async fn generate_token(&self, recipient: RecipientId) -> Result<String, AuthError> {
        let mut guard = self.store.lock().await;
        let salt = salt_for(&mut guard, recipient).await?;
        Ok(compute_token(&self.secret, &token_payload(recipient, &salt)))
    }

    /// Checks a token presented by GitLab.
    pub async fn check_token(
        &self,
        candidate: &str,
        recipient: RecipientId,
    ) -> Result<bool, AuthError> {
        let mut guard = self.store.lock().await;
        let salt = salt_for(&mut guard, recipient).await?;
        Ok(verify_token(
            candidate,
            &self.secret,
            &token_payload(recipient, &salt),
        ))
    }

    /// Replaces the recipient's salt and returns the new token.
    ///
    /// Every previously issued token for this recipient stops validating.
    pub async fn regenerate_token(&self, recipient: RecipientId) -> Result<String, AuthError> {
        let salt = random_alphanumeric(SALT_LEN)?;

        let mut guard = self.store.lock().await;
        guard.set(recipient, StoreKey::Salt, &salt).await?;
        info!(recipient = %recipient, "Rotated webhook salt");

        Ok(compute_token(&self.secret, &token_payload(recipient, &salt)))
    }

    /// Derives a recipient-independent value from the process secret.
    pub fn derive(&self, purpose: &str) -> String {
        compute_token(&self.secret, purpose)
    }

    /// Checks a value produced by [`TokenAuthority::derive`] in constant time.
    pub fn verify_derived(&self, candidate: &str, purpose: &str) -> bool {
        verify_token(candidate, &self.secret, purpose)
    }
}

async fn salt_for<B: KvBackend>(
    guard: &mut StoreGuard<'_, B>,
    recipient: RecipientId,
) -> Result<String, AuthError> {
    let salt = guard.get(recipient, StoreKey::Salt).await?;
    if !salt.is_empty() {
        return Ok(salt);
    }

    let salt = random_alphanumeric(SALT_LEN)?;
    guard.set(recipient, StoreKey::Salt, &salt).await?;
    Ok(salt)
}
