//! Per-document editing sessions.
//!
//! A [`DocumentSession`] is opened when a document is opened and torn down
//! when it is closed. It owns the document snapshot, the debounce timer and
//! the in-flight save for that document, and serializes both writers (the
//! interactive editor and the AI content generator) through one task that
//! processes each command to completion before taking the next.
//!
//! The handle is cheap to clone. When the last handle is dropped the task
//! flushes any pending save before it exits.

pub mod coordinator;
pub mod merge;
pub mod registry;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use uuid::Uuid;

pub use coordinator::{
    MergeCoordinator, SaveRequest, SaveState, WriteSource, DEFAULT_DEBOUNCE, MAX_DEBOUNCE,
};
pub use registry::SessionRegistry;

use crate::ai::{normalize_patch, AiAction, GenerationRequest, GenerationResponse, NormalizedPatch};
use crate::config::Config;
use crate::error::{PersistenceError, SessionError, TransitionError};
use crate::gateway::{AiContentSource, PersistenceGateway};
use crate::models::{
    DataIntegrityWarning, Document, DocumentDraft, DocumentPatch, DocumentType, FieldEdit,
    PaymentState, PaymentStatus,
};
use crate::workflow::{can_undo, StatusMachine, StatusTransition};

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Quiet period after the last user edit before a save.
    pub debounce: Duration,
    /// How long a payment can be undone after it is recorded.
    pub undo_window: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            undo_window: crate::workflow::DEFAULT_UNDO_WINDOW,
        }
    }
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            debounce: config.debounce,
            undo_window: config.undo_window,
        }
    }
}

/// Notifications published by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Saved { id: Uuid, revision: u64 },
    /// Non-fatal: the snapshot is kept and the next save will include it.
    SaveFailed { revision: u64, error: String },
    Transitioned { from: PaymentState, to: PaymentState },
}

/// Outcome of merging an AI patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
    pub changed: Vec<String>,
    pub warnings: Vec<DataIntegrityWarning>,
    /// Whether the merge started a save right away.
    pub saving: bool,
}

/// Outcome of a round-trip through the AI content generator.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub message: String,
    pub action: AiAction,
    pub report: Option<MergeReport>,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub draft: DocumentDraft,
    pub revision: u64,
    pub dirty: bool,
    pub state: SaveState,
    pub last_source: Option<WriteSource>,
}

type FlushReply = oneshot::Sender<Result<Option<Uuid>, PersistenceError>>;

enum Command {
    Edit {
        edit: FieldEdit,
        reply: oneshot::Sender<()>,
    },
    AiPatch {
        patch: NormalizedPatch,
        reply: oneshot::Sender<MergeReport>,
    },
    AiResponse {
        response: GenerationResponse,
        reply: oneshot::Sender<Option<MergeReport>>,
    },
    Transition {
        transition: StatusTransition,
        reply: oneshot::Sender<Result<PaymentStatus, TransitionError>>,
    },
    CanUndo {
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Flush {
        reply: FlushReply,
    },
    Close {
        reply: FlushReply,
    },
}

struct SaveDone {
    revision: u64,
    result: Result<Document, PersistenceError>,
}

/// Handle to an open document.
#[derive(Clone)]
pub struct DocumentSession {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
}

impl DocumentSession {
    /// Open a new, empty document. Nothing is stored until the first save.
    pub fn create(
        doc_type: DocumentType,
        gateway: Arc<dyn PersistenceGateway>,
        config: SessionConfig,
    ) -> Self {
        Self::spawn(DocumentDraft::new(doc_type), gateway, config)
    }

    /// Open an existing document, hydrated from the gateway.
    pub async fn open(
        id: Uuid,
        gateway: Arc<dyn PersistenceGateway>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let document = gateway
            .get(id)
            .await?
            .ok_or(PersistenceError::NotFound(id))?;
        Ok(Self::spawn(document.into(), gateway, config))
    }

    fn spawn(draft: DocumentDraft, gateway: Arc<dyn PersistenceGateway>, config: SessionConfig) -> Self {
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (done_tx, done_rx) = mpsc::channel(4);

        tracing::debug!(
            "Opening {} session for {:?}",
            draft.doc_type,
            draft.id
        );

        let worker = SessionWorker {
            coordinator: MergeCoordinator::new(draft, config.debounce),
            machine: StatusMachine::new(config.undo_window),
            gateway,
            events: events.clone(),
            done_tx,
            flush_waiters: Vec::new(),
        };
        tokio::spawn(worker.run(command_rx, done_rx));

        Self { commands, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Apply a user edit. The snapshot updates immediately; the save is debounced.
    pub async fn apply_user_edit(&self, edit: FieldEdit) -> Result<(), SessionError> {
        self.call(|reply| Command::Edit { edit, reply }).await
    }

    /// Merge an AI patch and save immediately.
    pub async fn apply_ai_patch(&self, patch: DocumentPatch) -> Result<MergeReport, SessionError> {
        let patch = NormalizedPatch {
            patch,
            warnings: Vec::new(),
        };
        self.call(|reply| Command::AiPatch { patch, reply }).await
    }

    /// Apply a generator response. Returns `None` if it carried no document update.
    pub async fn apply_ai_response(
        &self,
        response: GenerationResponse,
    ) -> Result<Option<MergeReport>, SessionError> {
        self.call(|reply| Command::AiResponse { response, reply })
            .await
    }

    /// Ask `source` for content and merge whatever it proposes.
    pub async fn generate(
        &self,
        source: &dyn AiContentSource,
        prompt: impl Into<String>,
        external_context: Option<String>,
    ) -> Result<GenerationOutcome, SessionError> {
        let snapshot = self.snapshot().await?;
        let request = GenerationRequest {
            prompt: prompt.into(),
            document_type: snapshot.draft.doc_type,
            current_context: snapshot.draft.content,
            external_context,
        };

        let response = source.generate(request).await?;
        let message = response.message.clone();
        let action = response.action;
        let report = self.apply_ai_response(response).await?;

        Ok(GenerationOutcome {
            message,
            action,
            report,
        })
    }

    pub async fn mark_as_paid(&self) -> Result<PaymentStatus, SessionError> {
        self.transition(StatusTransition::MarkAsPaid).await
    }

    /// Undo a payment. Outside the undo window this returns the unchanged status.
    pub async fn undo_payment(&self) -> Result<PaymentStatus, SessionError> {
        self.transition(StatusTransition::UndoPayment).await
    }

    pub async fn void_receipt(&self) -> Result<PaymentStatus, SessionError> {
        self.transition(StatusTransition::VoidReceipt).await
    }

    pub async fn transition(
        &self,
        transition: StatusTransition,
    ) -> Result<PaymentStatus, SessionError> {
        let result = self
            .call(|reply| Command::Transition { transition, reply })
            .await?;
        Ok(result?)
    }

    /// Live check, evaluated against the current time on every call.
    pub async fn can_undo(&self) -> Result<bool, SessionError> {
        self.call(|reply| Command::CanUndo { reply }).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.call(|reply| Command::Snapshot { reply }).await
    }

    /// Save any pending changes now and wait for the store to settle.
    ///
    /// Returns the document id, or `None` if the document has never been saved.
    pub async fn flush(&self) -> Result<Option<Uuid>, SessionError> {
        Ok(self.call(|reply| Command::Flush { reply }).await??)
    }

    /// Flush and stop the session. Other handles see [`SessionError::Closed`] afterwards.
    pub async fn close(self) -> Result<Option<Uuid>, SessionError> {
        Ok(self.call(|reply| Command::Close { reply }).await??)
    }

    async fn call<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }
}

struct SessionWorker {
    coordinator: MergeCoordinator,
    machine: StatusMachine,
    gateway: Arc<dyn PersistenceGateway>,
    events: broadcast::Sender<SessionEvent>,
    done_tx: mpsc::Sender<SaveDone>,
    flush_waiters: Vec<FlushReply>,
}

impl SessionWorker {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut done_rx: mpsc::Receiver<SaveDone>,
    ) {
        loop {
            let deadline = self.coordinator.next_deadline();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if let Some(reply) = self.handle(command) {
                            let result = self.drain(&mut done_rx).await;
                            let _ = reply.send(result);
                            break;
                        }
                    }
                    None => {
                        if let Err(e) = self.drain(&mut done_rx).await {
                            tracing::warn!("Flush on teardown failed: {}", e);
                        }
                        break;
                    }
                },
                Some(done) = done_rx.recv() => {
                    let _ = self.on_save_done(done);
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(request) = self.coordinator.on_timer(Instant::now()) {
                        self.start_save(request);
                    }
                }
            }
        }

        tracing::debug!("Session for {:?} closed", self.coordinator.snapshot().id);
    }

    /// Process one command. Returns the reply channel when the command asks
    /// the session to close.
    fn handle(&mut self, command: Command) -> Option<FlushReply> {
        let now = Instant::now();
        match command {
            Command::Edit { edit, reply } => {
                self.coordinator.apply_user_edit(edit, now);
                let _ = reply.send(());
            }
            Command::AiPatch { patch, reply } => {
                let _ = reply.send(self.merge_ai_patch(patch, now));
            }
            Command::AiResponse { response, reply } => {
                let report = match (response.action, response.data) {
                    (AiAction::UpdateDocument, Some(data)) => {
                        let patch = normalize_patch(&data, &self.coordinator.snapshot().content);
                        Some(self.merge_ai_patch(patch, now))
                    }
                    _ => None,
                };
                let _ = reply.send(report);
            }
            Command::Transition { transition, reply } => {
                let _ = reply.send(self.transition(transition));
            }
            Command::CanUndo { reply } => {
                let _ = reply.send(can_undo(&self.coordinator.snapshot().status, Utc::now()));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(SessionSnapshot {
                    draft: self.coordinator.snapshot().clone(),
                    revision: self.coordinator.revision(),
                    dirty: self.coordinator.is_dirty(),
                    state: self.coordinator.state(),
                    last_source: self.coordinator.last_source(),
                });
            }
            Command::Flush { reply } => {
                if let Some(request) = self.coordinator.request_save() {
                    self.start_save(request);
                }
                if self.coordinator.is_saving() {
                    self.flush_waiters.push(reply);
                } else {
                    let _ = reply.send(Ok(self.coordinator.snapshot().id));
                }
            }
            Command::Close { reply } => return Some(reply),
        }
        None
    }

    fn merge_ai_patch(&mut self, normalized: NormalizedPatch, now: Instant) -> MergeReport {
        let NormalizedPatch {
            mut patch,
            mut warnings,
        } = normalized;

        if let Some(items) = patch.items.as_mut() {
            merge::resolve_unit_prices(items, &self.coordinator.snapshot().content);
        }

        let status = patch
            .payment_status
            .take()
            .and_then(|target| self.status_from_patch(target, &mut warnings));

        let (changed, request) = self.coordinator.apply_ai_patch(patch, status, now);
        let saving = request.is_some();
        if let Some(request) = request {
            self.start_save(request);
        }

        tracing::info!(
            "Merged AI patch: {} field(s) changed, {} warning(s)",
            changed.len(),
            warnings.len()
        );

        MergeReport {
            changed: changed.into_iter().map(String::from).collect(),
            warnings,
            saving,
        }
    }

    /// Route a payment status proposed by the generator through the status machine.
    fn status_from_patch(
        &self,
        target: PaymentState,
        warnings: &mut Vec<DataIntegrityWarning>,
    ) -> Option<PaymentStatus> {
        let snapshot = self.coordinator.snapshot();
        if snapshot.status.state == target {
            return None;
        }

        let rejected = |reason: String| DataIntegrityWarning::RejectedTransition {
            requested: target.to_string(),
            reason,
        };

        let Some(transition) = StatusTransition::toward(target) else {
            warnings.push(rejected("status can only be set by a status transition".to_string()));
            return None;
        };

        match self
            .machine
            .apply(transition, snapshot.doc_type, &snapshot.status, Utc::now())
        {
            Ok(status) if status.state == target => {
                self.publish(SessionEvent::Transitioned {
                    from: snapshot.status.state,
                    to: status.state,
                });
                Some(status)
            }
            Ok(_) => {
                warnings.push(rejected("undo window has expired".to_string()));
                None
            }
            Err(e) => {
                warnings.push(rejected(e.to_string()));
                None
            }
        }
    }

    fn transition(&mut self, transition: StatusTransition) -> Result<PaymentStatus, TransitionError> {
        let snapshot = self.coordinator.snapshot();
        let from = snapshot.status.state;

        let status = self
            .machine
            .apply(transition, snapshot.doc_type, &snapshot.status, Utc::now())
            .inspect_err(|e| tracing::warn!("Rejected {:?}: {}", transition, e))?;

        if status.state != from {
            tracing::info!("Payment status {} -> {}", from, status.state);
            self.publish(SessionEvent::Transitioned {
                from,
                to: status.state,
            });
        }
        if let Some(request) = self.coordinator.apply_status(status.clone()) {
            self.start_save(request);
        }
        Ok(status)
    }

    fn start_save(&self, request: SaveRequest) {
        let gateway = Arc::clone(&self.gateway);
        let done_tx = self.done_tx.clone();
        let SaveRequest { revision, draft } = request;

        tracing::debug!("Saving revision {} of {:?}", revision, draft.id);
        tokio::spawn(async move {
            let result = gateway.save(draft).await;
            let _ = done_tx.send(SaveDone { revision, result }).await;
        });
    }

    fn on_save_done(&mut self, done: SaveDone) -> Result<Option<Uuid>, PersistenceError> {
        let now = Instant::now();
        let (follow_up, result) = match done.result {
            Ok(document) => {
                tracing::info!("Saved {} revision {}", document.id, done.revision);
                let follow_up = self.coordinator.save_succeeded(done.revision, document.id, now);
                self.publish(SessionEvent::Saved {
                    id: document.id,
                    revision: done.revision,
                });
                (follow_up, Ok(self.coordinator.snapshot().id))
            }
            Err(e) => {
                tracing::warn!("Save of revision {} failed: {}", done.revision, e);
                self.publish(SessionEvent::SaveFailed {
                    revision: done.revision,
                    error: e.to_string(),
                });
                (self.coordinator.save_failed(now), Err(e))
            }
        };

        if let Some(request) = follow_up {
            self.start_save(request);
        }
        if !self.coordinator.is_saving() {
            for waiter in self.flush_waiters.drain(..) {
                let _ = waiter.send(result.clone());
            }
        }
        result
    }

    /// Best-effort flush before teardown.
    async fn drain(
        &mut self,
        done_rx: &mut mpsc::Receiver<SaveDone>,
    ) -> Result<Option<Uuid>, PersistenceError> {
        if let Some(request) = self.coordinator.request_save() {
            self.start_save(request);
        }

        let mut result = Ok(self.coordinator.snapshot().id);
        while self.coordinator.is_saving() {
            let Some(done) = done_rx.recv().await else {
                break;
            };
            result = self.on_save_done(done);
        }
        result
    }

    fn publish(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
