//! Turning decoded webhook events into chat messages.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::delivery::{DeliveryDriver, MessagingTransport};
use crate::store::{KvBackend, StateStore, StoreError};
use crate::types::RecipientId;
use crate::webhooks::GitLabEvent;

pub mod coalesce;
pub mod format;

pub use coalesce::{ActiveMessage, CoalesceOutcome, Route, coalesce, route};
pub use format::{Dispatch, Link, Notification, PipelineUpdate, UpdateSource, base_ref, classify};

/// Routes events for a recipient to the delivery driver.
pub struct Relay<T, B> {
    store: Arc<StateStore<B>>,
    driver: Arc<DeliveryDriver<T>>,
}

impl<T, B> Relay<T, B>
where
    T: MessagingTransport,
    B: KvBackend,
{
    pub fn new(store: Arc<StateStore<B>>, driver: Arc<DeliveryDriver<T>>) -> Self {
        Self { store, driver }
    }

    /// Delivers one event to one recipient.
    ///
    /// Only state store failures are returned. A message the platform
    /// refused has already been logged by the driver.
    pub async fn handle(&self, recipient: RecipientId, event: &GitLabEvent) -> Result<(), StoreError> {
        if let GitLabEvent::Unknown { event_type } = event {
            warn!(recipient = %recipient, event = %event_type, "Unknown event");
        }

        match classify(event) {
            Dispatch::Suppressed => {
                debug!(recipient = %recipient, "Event suppressed");
            }
            Dispatch::Direct(notification) => {
                self.driver
                    .send(recipient, &notification.text, notification.keyboard())
                    .await;
            }
            Dispatch::Pipeline(update) => {
                let outcome = coalesce(&self.store, &self.driver, recipient, &update).await?;
                debug!(recipient = %recipient, pipeline = %update.pipeline_id, ?outcome, "Pipeline update delivered");
            }
        }

        Ok(())
    }
}
