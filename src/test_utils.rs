//! Shared test fakes and arbitrary generators for property-based testing.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use proptest::prelude::*;

use crate::delivery::{
    MessagingTransport, OutgoingMessage, TransportError, TransportErrorKind,
};
use crate::store::{BackendError, KvBackend};
use crate::types::{MessageId, PipelineId, RecipientId};
use crate::webhooks::CiStatus;

// ─── Generators ───────────────────────────────────────────────────────────────

pub fn arb_pipeline_id() -> impl Strategy<Value = PipelineId> {
    (1u64..1_000_000).prop_map(PipelineId)
}

pub fn arb_recipient() -> impl Strategy<Value = RecipientId> {
    (1i64..2_000_000_000).prop_map(RecipientId)
}

pub fn arb_ci_status() -> impl Strategy<Value = CiStatus> {
    prop_oneof![
        Just(CiStatus::Created),
        Just(CiStatus::Pending),
        Just(CiStatus::Running),
        Just(CiStatus::Canceled),
        Just(CiStatus::Failed),
        Just(CiStatus::Success),
        "[a-z_]{1,12}".prop_map(CiStatus::from),
    ]
}

// ─── In-memory durable store ──────────────────────────────────────────────────

#[derive(Default)]
struct MemoryState {
    values: HashMap<(RecipientId, String), String>,
    fail_reads: bool,
    fail_writes: bool,
    fail_writes_to: Option<String>,
}

/// [`KvBackend`] over a shared map, with switches to make calls fail.
///
/// Clones share state, so a test can keep a handle after moving one into a
/// store.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
    reads: Arc<AtomicU64>,
    writes: Arc<AtomicU64>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a value without counting it as a write.
    pub fn insert(&self, recipient: RecipientId, key: &str, value: &str) {
        self.lock()
            .values
            .insert((recipient, key.to_string()), value.to_string());
    }

    pub fn value(&self, recipient: RecipientId, key: &str) -> Option<String> {
        self.lock().values.get(&(recipient, key.to_string())).cloned()
    }

    /// Number of successful backend reads.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of successful backend writes.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Fails writes to one key only; `None` lifts it.
    pub fn fail_writes_to(&self, key: Option<&str>) {
        self.lock().fail_writes_to = key.map(str::to_string);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }
}

impl KvBackend for MemoryBackend {
    async fn get(&self, recipient: RecipientId, key: &str) -> Result<String, BackendError> {
        let state = self.lock();
        if state.fail_reads {
            return Err(BackendError::new("scripted read failure"));
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(state
            .values
            .get(&(recipient, key.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn set(&self, recipient: RecipientId, key: &str, value: &str) -> Result<(), BackendError> {
        let mut state = self.lock();
        if state.fail_writes || state.fail_writes_to.as_deref() == Some(key) {
            return Err(BackendError::new("scripted write failure"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        state
            .values
            .insert((recipient, key.to_string()), value.to_string());
        Ok(())
    }
}

// ─── Recording transport ──────────────────────────────────────────────────────

/// An edit the transport received.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEdit {
    pub peer: RecipientId,
    pub id: MessageId,
    pub text: String,
}

struct TransportState {
    next_id: i64,
    messages: HashMap<MessageId, String>,
    sent: Vec<OutgoingMessage>,
    send_calls: usize,
    send_script: VecDeque<Result<MessageId, TransportError>>,
    edits: Vec<RecordedEdit>,
    edit_calls: usize,
    fail_edits: Option<TransportErrorKind>,
    fail_fetches: Option<TransportErrorKind>,
}

impl Default for TransportState {
    fn default() -> Self {
        Self {
            next_id: 100,
            messages: HashMap::new(),
            sent: Vec::new(),
            send_calls: 0,
            send_script: VecDeque::new(),
            edits: Vec::new(),
            edit_calls: 0,
            fail_edits: None,
            fail_fetches: None,
        }
    }
}

/// [`MessagingTransport`] that keeps messages in memory and records calls.
///
/// Sends succeed with increasing ids unless a result was scripted with
/// [`RecordingTransport::script_send`]; scripted results are consumed in
/// order before falling back to the default.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    state: Arc<Mutex<TransportState>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_send(&self, result: Result<MessageId, TransportError>) {
        self.lock().send_script.push_back(result);
    }

    /// Messages that were successfully delivered, in order.
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.lock().sent.clone()
    }

    /// Number of send attempts, failed ones included.
    pub fn send_calls(&self) -> usize {
        self.lock().send_calls
    }

    /// Edits that were applied, in order.
    pub fn edits(&self) -> Vec<RecordedEdit> {
        self.lock().edits.clone()
    }

    /// Number of edit attempts, failed ones included.
    pub fn edit_calls(&self) -> usize {
        self.lock().edit_calls
    }

    pub fn text_of(&self, id: MessageId) -> Option<String> {
        self.lock().messages.get(&id).cloned()
    }

    /// Drops a message so later fetches report it missing.
    pub fn forget(&self, id: MessageId) {
        self.lock().messages.remove(&id);
    }

    pub fn fail_edits(&self, kind: Option<TransportErrorKind>) {
        self.lock().fail_edits = kind;
    }

    pub fn fail_fetches(&self, kind: Option<TransportErrorKind>) {
        self.lock().fail_fetches = kind;
    }

    /// Total outbound calls of any kind.
    pub fn total_calls(&self) -> usize {
        let state = self.lock();
        state.send_calls + state.edit_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TransportState> {
        self.state.lock().unwrap()
    }
}

impl MessagingTransport for RecordingTransport {
    async fn send_message(&self, message: &OutgoingMessage) -> Result<MessageId, TransportError> {
        let mut state = self.lock();
        state.send_calls += 1;

        let id = match state.send_script.pop_front() {
            Some(Err(e)) => return Err(e),
            Some(Ok(id)) => id,
            None => {
                state.next_id += 1;
                MessageId::new(state.next_id).unwrap()
            }
        };

        state.messages.insert(id, message.text.clone());
        state.sent.push(message.clone());
        Ok(id)
    }

    async fn edit_message(
        &self,
        peer: RecipientId,
        id: MessageId,
        text: &str,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.edit_calls += 1;

        if let Some(kind) = state.fail_edits {
            return Err(TransportError::new(kind, "scripted edit failure"));
        }

        state.messages.insert(id, text.to_string());
        state.edits.push(RecordedEdit {
            peer,
            id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn fetch_message(&self, id: MessageId) -> Result<Option<String>, TransportError> {
        let state = self.lock();
        if let Some(kind) = state.fail_fetches {
            return Err(TransportError::new(kind, "scripted fetch failure"));
        }
        Ok(state.messages.get(&id).cloned())
    }
}
