//! Per-recipient state store.
//!
//! Values live in a durable remote key-value store (the messaging platform's
//! per-user storage). This module fronts it with a process-local read-through
//! cache so that hot values (salts, pipeline tracking) do not cost a remote
//! round trip on every webhook.
//!
//! # Locking
//!
//! One async mutex guards the cache for all recipients. [`StateStore::lock`]
//! hands out a [`StoreGuard`] so a caller can hold the lock across a whole
//! get-or-create or compare-and-set sequence. A single lock serializes every
//! recipient; sharding the cache by recipient id is the way out if webhook
//! volume ever makes that a bottleneck.
//!
//! # Consistency
//!
//! The relay assumes it is the only writer. A cached entry therefore always
//! equals the last value the relay wrote. Writes go to the backend first and
//! only touch the cache once the backend accepted them.

use std::collections::HashMap;
use std::future::Future;

use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::types::RecipientId;

pub mod keys;

pub use keys::{KEY_PREFIX, StoreKey};

/// Failure reported by a durable backend.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors surfaced by the state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be read.
    #[error("reading {key} for recipient {recipient}: {source}")]
    Read {
        recipient: RecipientId,
        key: StoreKey,
        #[source]
        source: BackendError,
    },

    /// The backend rejected a write. The cache was left untouched.
    #[error("writing {key} for recipient {recipient}: {source}")]
    Write {
        recipient: RecipientId,
        key: StoreKey,
        #[source]
        source: BackendError,
    },
}

/// Durable key-value storage addressed by recipient and key name.
///
/// Key names arrive already namespaced with [`KEY_PREFIX`]. A key that was
/// never written reads as the empty string.
pub trait KvBackend: Send + Sync {
    fn get(
        &self,
        recipient: RecipientId,
        key: &str,
    ) -> impl Future<Output = Result<String, BackendError>> + Send;

    fn set(
        &self,
        recipient: RecipientId,
        key: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

type Cache = HashMap<(RecipientId, StoreKey), String>;

/// Read-through cache in front of a [`KvBackend`].
pub struct StateStore<B> {
    backend: B,
    cache: Mutex<Cache>,
}

impl<B: KvBackend> StateStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the durable backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Acquires the store lock.
    ///
    /// Hold the guard for the full duration of any read-decide-write sequence
    /// that must not interleave with another task's.
    pub async fn lock(&self) -> StoreGuard<'_, B> {
        StoreGuard {
            backend: &self.backend,
            cache: self.cache.lock().await,
        }
    }

    /// Reads a value, consulting the cache first.
    pub async fn get(&self, recipient: RecipientId, key: StoreKey) -> Result<String, StoreError> {
        self.lock().await.get(recipient, key).await
    }

    /// Writes a value through to the backend.
    pub async fn set(
        &self,
        recipient: RecipientId,
        key: StoreKey,
        value: &str,
    ) -> Result<(), StoreError> {
        self.lock().await.set(recipient, key, value).await
    }
}

/// Exclusive access to the store for a sequence of operations.
pub struct StoreGuard<'a, B> {
    backend: &'a B,
    cache: MutexGuard<'a, Cache>,
}

impl<B: KvBackend> StoreGuard<'_, B> {
    /// Reads a value. A cache miss falls through to the backend and populates
    /// the cache before returning.
    pub async fn get(&mut self, recipient: RecipientId, key: StoreKey) -> Result<String, StoreError> {
        if let Some(value) = self.cache.get(&(recipient, key)) {
            return Ok(value.clone());
        }

        let value = self
            .backend
            .get(recipient, &key.remote_name())
            .await
            .map_err(|source| StoreError::Read {
                recipient,
                key,
                source,
            })?;

        debug!(recipient = %recipient, key = %key, "Cached value from durable store");
        self.cache.insert((recipient, key), value.clone());
        Ok(value)
    }

    /// Writes a value. Writing the value already cached is a no-op.
    ///
    /// The cache is updated only after the backend accepted the write.
    pub async fn set(
        &mut self,
        recipient: RecipientId,
        key: StoreKey,
        value: &str,
    ) -> Result<(), StoreError> {
        if self
            .cache
            .get(&(recipient, key))
            .is_some_and(|cached| cached == value)
        {
            return Ok(());
        }

        if let Err(source) = self.backend.set(recipient, &key.remote_name(), value).await {
            warn!(recipient = %recipient, key = %key, error = %source, "Durable store write failed");
            return Err(StoreError::Write {
                recipient,
                key,
                source,
            });
        }

        self.cache.insert((recipient, key), value.to_string());
        Ok(())
    }
}
