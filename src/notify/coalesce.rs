//! Pipeline message coalescing.
//!
//! A CI pipeline produces a burst of job and pipeline status changes. Rather
//! than one chat message per change, the relay keeps one message per
//! pipeline and appends each update to it as a new line.
//!
//! Per recipient, the store remembers the pipeline currently being tracked
//! (`pipeline_last_id`) and the message that represents it
//! (`pipeline_message_id`). An update for pipeline `P` is handled as:
//!
//! | Tracked pipeline | Update                 | Action                                  |
//! |------------------|------------------------|-----------------------------------------|
//! | `P`              | pipeline `failed`      | new message with the pipeline link      |
//! | `P`              | anything else          | append to the tracked message           |
//! | not `P`          | anything               | new message, start tracking `P`         |
//!
//! Appending is itself a two-state machine over [`ActiveMessage`]: with an
//! active message the update is edited in, and if that edit fails (or there
//! is no active message) a fresh message is sent and tracked instead.
//!
//! Starting a new pipeline clears the message id, moves the pipeline id, and
//! only then records the new message id. If any of those writes fails, the
//! stored pair is at worst a pipeline with no active message, which resends
//! on the next update.
//!
//! The store lock is held across the whole transition, sends and edits
//! included, so two deliveries for the same pipeline cannot both decide to
//! create its message. The wait on that lock is therefore bounded by the
//! driver's retry pauses plus the transport's own request timeout per attempt.

use tracing::{debug, warn};

use super::format::PipelineUpdate;
use crate::delivery::{DeliveryDriver, MessagingTransport};
use crate::store::{KvBackend, StateStore, StoreError, StoreKey};
use crate::types::{MessageId, PipelineId, RecipientId};

/// What the relay does with a pipeline update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The update belongs to a pipeline that is not tracked yet.
    StartPipeline,
    /// The tracked pipeline failed; report it in its own message.
    ReportFailure,
    /// Add the update to the tracked pipeline's message.
    Append,
}

/// Whether the tracked pipeline has a message to append to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveMessage {
    NoActiveMessage,
    HasActiveMessage(MessageId),
}

impl ActiveMessage {
    /// Interprets the stored message id. Empty, zero and garbage all mean
    /// there is nothing to append to.
    pub fn from_stored(stored: &str) -> Self {
        match MessageId::parse_stored(stored) {
            Some(id) => ActiveMessage::HasActiveMessage(id),
            None => ActiveMessage::NoActiveMessage,
        }
    }
}

/// The result of coalescing one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoalesceOutcome {
    /// A new pipeline message was sent. Tracking moved to the new pipeline
    /// only if the message was delivered.
    Started(Option<MessageId>),
    /// The update was appended to the tracked message.
    Edited(MessageId),
    /// Appending was not possible; a replacement message was sent.
    Resent(Option<MessageId>),
    /// A pipeline failure was reported in a separate message.
    FailureReported(Option<MessageId>),
}

/// Chooses the route for an update given the tracked pipeline id as stored.
pub fn route(tracked_pipeline: &str, update: &PipelineUpdate) -> Route {
    if !is_tracked(tracked_pipeline, update.pipeline_id) {
        Route::StartPipeline
    } else if update.is_pipeline_failure() {
        Route::ReportFailure
    } else {
        Route::Append
    }
}

fn is_tracked(tracked_pipeline: &str, pipeline: PipelineId) -> bool {
    tracked_pipeline == pipeline.to_string()
}

/// Delivers a pipeline update and advances the recipient's tracking state.
///
/// Returns an error only when the store could not be read or written.
/// Delivery failures are absorbed by the driver.
pub async fn coalesce<T, B>(
    store: &StateStore<B>,
    driver: &DeliveryDriver<T>,
    recipient: RecipientId,
    update: &PipelineUpdate,
) -> Result<CoalesceOutcome, StoreError>
where
    T: MessagingTransport,
    B: KvBackend,
{
    let mut guard = store.lock().await;
    let text = &update.notification.text;

    let tracked = guard.get(recipient, StoreKey::PipelineLastId).await?;

    match route(&tracked, update) {
        Route::StartPipeline => {
            debug!(recipient = %recipient, pipeline = %update.pipeline_id, "Starting pipeline message");

            let sent = driver.send(recipient, text, None).await;
            if let Some(id) = sent {
                // Detach the old message before moving to the new pipeline,
                // so a failed write never pairs a pipeline with another's message.
                guard.set(recipient, StoreKey::PipelineMessageId, "").await?;
                guard
                    .set(
                        recipient,
                        StoreKey::PipelineLastId,
                        &update.pipeline_id.to_string(),
                    )
                    .await?;
                guard
                    .set(recipient, StoreKey::PipelineMessageId, &id.to_string())
                    .await?;
            }
            Ok(CoalesceOutcome::Started(sent))
        }

        Route::ReportFailure => {
            let sent = driver
                .send(recipient, text, update.notification.keyboard())
                .await;
            Ok(CoalesceOutcome::FailureReported(sent))
        }

        Route::Append => {
            let stored = guard.get(recipient, StoreKey::PipelineMessageId).await?;

            if let ActiveMessage::HasActiveMessage(id) = ActiveMessage::from_stored(&stored) {
                match driver.edit(recipient, id, text).await {
                    Ok(()) => return Ok(CoalesceOutcome::Edited(id)),
                    Err(e) => {
                        warn!(
                            recipient = %recipient,
                            pipeline = %update.pipeline_id,
                            error = %e,
                            "Could not append to pipeline message, sending a new one"
                        );
                    }
                }
            }

            let sent = driver.send(recipient, text, None).await;
            if let Some(id) = sent {
                guard
                    .set(recipient, StoreKey::PipelineMessageId, &id.to_string())
                    .await?;
            }
            Ok(CoalesceOutcome::Resent(sent))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{TransportError, TransportErrorKind};
    use crate::notify::format::{Link, Notification, UpdateSource};
    use crate::test_utils::{MemoryBackend, RecordingTransport, arb_ci_status, arb_pipeline_id};
    use crate::webhooks::CiStatus;
    use proptest::prelude::*;

    const PEER: RecipientId = RecipientId(314);

    struct Harness {
        store: StateStore<MemoryBackend>,
        driver: DeliveryDriver<RecordingTransport>,
        transport: RecordingTransport,
    }

    impl Harness {
        fn new() -> Self {
            let transport = RecordingTransport::new();
            Self {
                store: StateStore::new(MemoryBackend::new()),
                driver: DeliveryDriver::new(transport.clone()),
                transport,
            }
        }

        async fn run(&self, update: &PipelineUpdate) -> CoalesceOutcome {
            coalesce(&self.store, &self.driver, PEER, update).await.unwrap()
        }

        async fn tracked(&self) -> (String, String) {
            (
                self.store.get(PEER, StoreKey::PipelineLastId).await.unwrap(),
                self.store
                    .get(PEER, StoreKey::PipelineMessageId)
                    .await
                    .unwrap(),
            )
        }
    }

    fn job(pipeline: u64, text: &str) -> PipelineUpdate {
        PipelineUpdate {
            pipeline_id: PipelineId(pipeline),
            source: UpdateSource::Job,
            notification: Notification::new(text, None),
        }
    }

    fn pipeline(id: u64, status: CiStatus) -> PipelineUpdate {
        PipelineUpdate {
            pipeline_id: PipelineId(id),
            notification: Notification::new(
                format!("pipeline #{id} {status}"),
                Some(Link::new(format!("https://g/p/pipelines/{id}"), "Open pipeline")),
            ),
            source: UpdateSource::Pipeline { status },
        }
    }

    // ─── Routing ──────────────────────────────────────────────────────────────

    #[test]
    fn untracked_pipeline_starts_new_message() {
        assert_eq!(route("", &job(1, "x")), Route::StartPipeline);
        assert_eq!(route("2", &job(1, "x")), Route::StartPipeline);
        assert_eq!(
            route("2", &pipeline(1, CiStatus::Failed)),
            Route::StartPipeline
        );
    }

    #[test]
    fn tracked_pipeline_appends_unless_failed() {
        assert_eq!(route("1", &job(1, "x")), Route::Append);
        assert_eq!(route("1", &pipeline(1, CiStatus::Success)), Route::Append);
        assert_eq!(
            route("1", &pipeline(1, CiStatus::Failed)),
            Route::ReportFailure
        );
    }

    #[test]
    fn failed_job_on_tracked_pipeline_appends() {
        assert_eq!(route("1", &job(1, "🗙 test rspec failed")), Route::Append);
    }

    #[test]
    fn active_message_from_stored() {
        assert_eq!(ActiveMessage::from_stored(""), ActiveMessage::NoActiveMessage);
        assert_eq!(ActiveMessage::from_stored("0"), ActiveMessage::NoActiveMessage);
        assert_eq!(
            ActiveMessage::from_stored("12"),
            ActiveMessage::HasActiveMessage(MessageId::new(12).unwrap())
        );
    }

    // ─── Transitions ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn same_pipeline_updates_edit_one_message() {
        let h = Harness::new();

        let CoalesceOutcome::Started(Some(id)) = h.run(&job(10, "⌚ build compile running")).await
        else {
            panic!("expected a started message");
        };
        assert_eq!(h.tracked().await, ("10".to_string(), id.to_string()));

        assert_eq!(
            h.run(&job(10, "✅ build compile success")).await,
            CoalesceOutcome::Edited(id)
        );
        assert_eq!(
            h.run(&pipeline(10, CiStatus::Success)).await,
            CoalesceOutcome::Edited(id)
        );

        assert_eq!(h.transport.sent().len(), 1);
        assert_eq!(h.transport.edits().len(), 2);
        assert_eq!(
            h.transport.text_of(id).as_deref(),
            Some("⌚ build compile running\n✅ build compile success\npipeline #10 success")
        );
        assert_eq!(h.tracked().await, ("10".to_string(), id.to_string()));
    }

    #[tokio::test]
    async fn new_pipeline_message_carries_no_link() {
        let h = Harness::new();

        h.run(&pipeline(5, CiStatus::Running)).await;

        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].keyboard, None);
    }

    #[tokio::test]
    async fn new_pipeline_retracks() {
        let h = Harness::new();

        let CoalesceOutcome::Started(Some(first)) = h.run(&job(1, "a")).await else {
            panic!("expected first message");
        };
        let CoalesceOutcome::Started(Some(second)) = h.run(&job(2, "b")).await else {
            panic!("expected second message");
        };

        assert_ne!(first, second);
        assert_eq!(h.tracked().await, ("2".to_string(), second.to_string()));
        assert!(h.transport.edits().is_empty());
        assert_eq!(h.transport.text_of(first).as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn failed_pipeline_sends_linked_message_without_retracking() {
        let h = Harness::new();
        let CoalesceOutcome::Started(Some(id)) = h.run(&job(8, "⌚ test rspec running")).await
        else {
            panic!("expected a started message");
        };

        let outcome = h.run(&pipeline(8, CiStatus::Failed)).await;

        let CoalesceOutcome::FailureReported(Some(failure)) = outcome else {
            panic!("expected failure report, got {outcome:?}");
        };
        assert_ne!(failure, id);
        let sent = h.transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[1].keyboard,
            Some(crate::delivery::Keyboard::link(
                "https://g/p/pipelines/8",
                "Open pipeline"
            ))
        );
        assert!(h.transport.edits().is_empty());
        assert_eq!(h.tracked().await, ("8".to_string(), id.to_string()));
    }

    #[tokio::test]
    async fn failed_edit_falls_back_to_send_and_retracks_message() {
        let h = Harness::new();
        let CoalesceOutcome::Started(Some(id)) = h.run(&job(3, "a")).await else {
            panic!("expected a started message");
        };
        h.transport.fail_edits(Some(TransportErrorKind::Other));

        let outcome = h.run(&job(3, "b")).await;

        let CoalesceOutcome::Resent(Some(replacement)) = outcome else {
            panic!("expected resend, got {outcome:?}");
        };
        assert_ne!(replacement, id);
        assert_eq!(h.transport.edit_calls(), 1);
        assert_eq!(h.tracked().await, ("3".to_string(), replacement.to_string()));
    }

    #[tokio::test]
    async fn vanished_message_falls_back_to_send() {
        let h = Harness::new();
        let CoalesceOutcome::Started(Some(id)) = h.run(&job(3, "a")).await else {
            panic!("expected a started message");
        };
        h.transport.forget(id);

        let outcome = h.run(&job(3, "b")).await;

        assert!(matches!(outcome, CoalesceOutcome::Resent(Some(_))));
        assert_eq!(h.transport.edit_calls(), 0);
    }

    #[tokio::test]
    async fn tracked_pipeline_without_message_sends() {
        let h = Harness::new();
        h.store
            .set(PEER, StoreKey::PipelineLastId, "4")
            .await
            .unwrap();

        let outcome = h.run(&job(4, "a")).await;

        let CoalesceOutcome::Resent(Some(id)) = outcome else {
            panic!("expected resend, got {outcome:?}");
        };
        assert_eq!(h.transport.edit_calls(), 0);
        assert_eq!(h.tracked().await, ("4".to_string(), id.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn undelivered_start_leaves_tracking_untouched() {
        let h = Harness::new();
        let CoalesceOutcome::Started(Some(id)) = h.run(&job(1, "a")).await else {
            panic!("expected a started message");
        };
        h.transport.script_send(Err(TransportError::new(
            TransportErrorKind::RecipientDenied,
            "denied",
        )));

        assert_eq!(h.run(&job(2, "b")).await, CoalesceOutcome::Started(None));
        assert_eq!(h.tracked().await, ("1".to_string(), id.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn undelivered_fallback_keeps_old_message_id() {
        let h = Harness::new();
        let CoalesceOutcome::Started(Some(id)) = h.run(&job(1, "a")).await else {
            panic!("expected a started message");
        };
        h.transport.fail_edits(Some(TransportErrorKind::Server));
        h.transport.script_send(Err(TransportError::new(TransportErrorKind::Other, "boom")));

        assert_eq!(h.run(&job(1, "b")).await, CoalesceOutcome::Resent(None));
        assert_eq!(h.tracked().await, ("1".to_string(), id.to_string()));
    }

    #[tokio::test]
    async fn store_write_failure_is_reported() {
        let h = Harness::new();
        h.store.backend().fail_writes(true);

        let err = coalesce(&h.store, &h.driver, PEER, &job(1, "a"))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Write { .. }));
        assert_eq!(h.transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn failed_message_id_write_never_appends_to_previous_pipeline() {
        let h = Harness::new();
        let CoalesceOutcome::Started(Some(first)) = h.run(&job(1, "pipeline one")).await else {
            panic!("expected a started message");
        };

        h.store.backend().fail_writes_to(Some("relay_pipeline_message_id"));
        let err = coalesce(&h.store, &h.driver, PEER, &job(2, "pipeline two start"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Write { key: StoreKey::PipelineMessageId, .. }
        ));
        h.store.backend().fail_writes_to(None);

        let outcome = h.run(&job(2, "pipeline two job")).await;

        assert!(matches!(outcome, CoalesceOutcome::Started(Some(id)) if id != first));
        assert_eq!(h.transport.edit_calls(), 0);
        assert_eq!(h.transport.text_of(first).as_deref(), Some("pipeline one"));
    }

    #[tokio::test]
    async fn failed_pipeline_id_write_leaves_no_active_message() {
        let h = Harness::new();
        let CoalesceOutcome::Started(Some(first)) = h.run(&job(1, "pipeline one")).await else {
            panic!("expected a started message");
        };

        h.store.backend().fail_writes_to(Some("relay_pipeline_last_id"));
        coalesce(&h.store, &h.driver, PEER, &job(2, "pipeline two start"))
            .await
            .unwrap_err();
        h.store.backend().fail_writes_to(None);
        assert_eq!(h.tracked().await, ("1".to_string(), String::new()));

        let outcome = h.run(&job(1, "pipeline one late job")).await;

        assert!(matches!(outcome, CoalesceOutcome::Resent(Some(_))));
        assert_eq!(h.transport.edit_calls(), 0);
        assert_eq!(h.transport.text_of(first).as_deref(), Some("pipeline one"));
    }

    #[tokio::test]
    async fn store_read_failure_sends_nothing() {
        let h = Harness::new();
        h.store.backend().fail_reads(true);

        let err = coalesce(&h.store, &h.driver, PEER, &job(1, "a"))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Read { .. }));
        assert_eq!(h.transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_updates_for_one_pipeline_create_one_message() {
        let h = std::sync::Arc::new(Harness::new());

        let tasks: Vec<_> = (0..8)
            .map(|n| {
                let h = h.clone();
                tokio::spawn(async move { h.run(&job(42, &format!("job {n}"))).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(h.transport.sent().len(), 1);
        assert_eq!(h.transport.edits().len(), 7);
    }

    // ─── Properties ───────────────────────────────────────────────────────────

    proptest! {
        #[test]
        fn route_depends_only_on_tracking_and_failure(
            tracked in arb_pipeline_id(),
            incoming in arb_pipeline_id(),
            status in arb_ci_status(),
        ) {
            let update = pipeline(incoming.0, status.clone());
            let expected = if tracked != incoming {
                Route::StartPipeline
            } else if status == CiStatus::Failed {
                Route::ReportFailure
            } else {
                Route::Append
            };
            prop_assert_eq!(route(&tracked.to_string(), &update), expected);
        }

        #[test]
        fn sequence_of_same_pipeline_jobs_sends_once(
            id in arb_pipeline_id(),
            count in 1usize..10,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let (sent, edits) = runtime.block_on(async {
                let h = Harness::new();
                for n in 0..count {
                    h.run(&job(id.0, &format!("job {n}"))).await;
                }
                (h.transport.sent().len(), h.transport.edits().len())
            });
            prop_assert_eq!(sent, 1);
            prop_assert_eq!(edits, count - 1);
        }
    }
}
