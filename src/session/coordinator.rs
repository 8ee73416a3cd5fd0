//! Save scheduling for one open document.
//!
//! [`MergeCoordinator`] is a pure state machine: callers pass `now` in and
//! get back a [`SaveRequest`] whenever a save should start. It performs no
//! I/O and owns no timers; [`DocumentSession`](super::DocumentSession)
//! drives it from an async task.
//!
//! ```text
//!            user edit                timer due / AI patch / flush
//!   Idle ───────────────▶ Pending ─────────────────────────────▶ Saving
//!     ▲                      ▲                                     │  │
//!     │   done, clean        │ done, edited during save            │  │ save requested
//!     ├──────────────────────┼─────────────────────────────────────┘  ▼
//!     │                      │                              SavingWithDrift
//!     └─────── done, clean ──┴──── done, dirty: one follow-up save ───┘
//! ```
//!
//! At most one save is in flight. A save requested while one is in flight
//! is deferred, and all deferred requests collapse into a single follow-up.

use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use crate::models::{DocumentDraft, DocumentPatch, FieldEdit, PaymentStatus};

use super::merge::merge_patch;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(5);

/// Longest quiet period a coordinator will wait before saving.
pub const MAX_DEBOUNCE: Duration = Duration::from_secs(10 * 60);

/// Which writer produced the latest change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteSource {
    User,
    Ai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    /// Nothing scheduled and nothing in flight.
    Idle,
    /// Dirty, waiting for a quiet period that ends at `deadline`.
    Pending { deadline: Instant },
    /// A save of `revision` is in flight. `deadline` is set when the user
    /// kept editing during the save.
    Saving {
        revision: u64,
        deadline: Option<Instant>,
    },
    /// A save of `revision` is in flight and another save was requested
    /// meanwhile; exactly one follow-up runs when it resolves.
    SavingWithDrift { revision: u64 },
}

/// Pending content plus bookkeeping about what has been persisted.
#[derive(Debug, Clone)]
pub struct ChangeBuffer {
    snapshot: DocumentDraft,
    revision: u64,
    saved_revision: u64,
    last_source: Option<WriteSource>,
}

impl ChangeBuffer {
    fn new(snapshot: DocumentDraft) -> Self {
        Self {
            snapshot,
            revision: 0,
            saved_revision: 0,
            last_source: None,
        }
    }

    fn touch(&mut self, source: WriteSource) {
        self.revision += 1;
        self.last_source = Some(source);
    }

    pub fn is_dirty(&self) -> bool {
        self.revision > self.saved_revision
    }
}

/// A save the driver should hand to the persistence gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub revision: u64,
    pub draft: DocumentDraft,
}

#[derive(Debug, Clone)]
pub struct MergeCoordinator {
    buffer: ChangeBuffer,
    state: SaveState,
    debounce: Duration,
}

impl MergeCoordinator {
    /// Start coordinating a document. The initial snapshot counts as persisted.
    ///
    /// `debounce` is capped at [`MAX_DEBOUNCE`].
    pub fn new(snapshot: DocumentDraft, debounce: Duration) -> Self {
        Self {
            buffer: ChangeBuffer::new(snapshot),
            state: SaveState::Idle,
            debounce: debounce.min(MAX_DEBOUNCE),
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn snapshot(&self) -> &DocumentDraft {
        &self.buffer.snapshot
    }

    pub fn state(&self) -> SaveState {
        self.state
    }

    pub fn revision(&self) -> u64 {
        self.buffer.revision
    }

    pub fn is_dirty(&self) -> bool {
        self.buffer.is_dirty()
    }

    pub fn last_source(&self) -> Option<WriteSource> {
        self.buffer.last_source
    }

    pub fn is_saving(&self) -> bool {
        matches!(
            self.state,
            SaveState::Saving { .. } | SaveState::SavingWithDrift { .. }
        )
    }

    /// When the debounce timer should next fire, if it is armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            SaveState::Pending { deadline } => Some(deadline),
            SaveState::Saving { deadline, .. } => deadline,
            SaveState::Idle | SaveState::SavingWithDrift { .. } => None,
        }
    }

    /// Apply a user edit and (re)arm the debounce timer.
    pub fn apply_user_edit(&mut self, edit: FieldEdit, now: Instant) {
        tracing::debug!("User edit: {}", edit.name());
        edit.apply(&mut self.buffer.snapshot.content);
        self.buffer.touch(WriteSource::User);
        self.arm(now);
    }

    /// Merge an AI patch and request an immediate save.
    ///
    /// `status` is a payment status the caller has already validated with
    /// the status machine; it is written in the same snapshot as the content.
    /// After the save starts the debounce timer is re-armed so that later
    /// user edits keep their quiet-period behaviour.
    pub fn apply_ai_patch(
        &mut self,
        patch: DocumentPatch,
        status: Option<PaymentStatus>,
        now: Instant,
    ) -> (Vec<&'static str>, Option<SaveRequest>) {
        let mut changed = merge_patch(&mut self.buffer.snapshot.content, patch);
        if let Some(status) = status {
            if self.buffer.snapshot.status != status {
                self.buffer.snapshot.status = status;
                changed.push("payment_status");
            }
        }
        if !changed.is_empty() {
            self.buffer.touch(WriteSource::Ai);
        }

        let request = self.request_save();
        if let SaveState::Saving { revision, .. } = self.state {
            if request.is_some() {
                self.state = SaveState::Saving {
                    revision,
                    deadline: Some(self.deadline_after(now)),
                };
            }
        }
        (changed, request)
    }

    /// Record a status produced by the status machine and request an immediate save.
    pub fn apply_status(&mut self, status: PaymentStatus) -> Option<SaveRequest> {
        if self.buffer.snapshot.status == status {
            return None;
        }
        self.buffer.snapshot.status = status;
        self.buffer.touch(WriteSource::User);
        self.request_save()
    }

    /// Save now, bypassing the debounce timer.
    ///
    /// Returns `None` when there is nothing to save or a save is already in
    /// flight; in the latter case the request is deferred until it resolves.
    pub fn request_save(&mut self) -> Option<SaveRequest> {
        match self.state {
            SaveState::Idle | SaveState::Pending { .. } => {
                if self.buffer.is_dirty() {
                    Some(self.start_save())
                } else {
                    self.state = SaveState::Idle;
                    None
                }
            }
            SaveState::Saving { revision, .. } => {
                tracing::debug!("Save of revision {} in flight, deferring", revision);
                self.state = SaveState::SavingWithDrift { revision };
                None
            }
            SaveState::SavingWithDrift { .. } => None,
        }
    }

    /// Called when the debounce deadline may have passed.
    pub fn on_timer(&mut self, now: Instant) -> Option<SaveRequest> {
        match self.state {
            SaveState::Pending { deadline } if now >= deadline => {
                if self.buffer.is_dirty() {
                    Some(self.start_save())
                } else {
                    self.state = SaveState::Idle;
                    None
                }
            }
            SaveState::Saving {
                revision,
                deadline: Some(deadline),
            } if now >= deadline => {
                self.state = SaveState::SavingWithDrift { revision };
                None
            }
            _ => None,
        }
    }

    /// The in-flight save of `revision` succeeded and the store assigned `id`.
    pub fn save_succeeded(&mut self, revision: u64, id: Uuid, now: Instant) -> Option<SaveRequest> {
        if self.buffer.snapshot.id.is_none() {
            tracing::info!("Document assigned id {}", id);
            self.buffer.snapshot.id = Some(id);
        }
        self.buffer.saved_revision = self.buffer.saved_revision.max(revision);
        self.settle(now)
    }

    /// The in-flight save failed. The snapshot is kept as is; it will be
    /// saved again by the next edit, timer, or explicit request.
    pub fn save_failed(&mut self, now: Instant) -> Option<SaveRequest> {
        self.settle(now)
    }

    fn settle(&mut self, now: Instant) -> Option<SaveRequest> {
        let dirty = self.buffer.is_dirty();
        match self.state {
            SaveState::SavingWithDrift { .. } if dirty => Some(self.start_save()),
            SaveState::Saving {
                deadline: Some(deadline),
                ..
            } if dirty => {
                self.state = SaveState::Pending { deadline };
                None
            }
            SaveState::Saving { .. } | SaveState::SavingWithDrift { .. } => {
                self.state = SaveState::Idle;
                None
            }
            SaveState::Idle | SaveState::Pending { .. } => {
                tracing::warn!("Save completion with no save in flight at {:?}", now);
                None
            }
        }
    }

    fn arm(&mut self, now: Instant) {
        let deadline = self.deadline_after(now);
        self.state = match self.state {
            SaveState::Idle | SaveState::Pending { .. } => SaveState::Pending { deadline },
            SaveState::Saving { revision, .. } => SaveState::Saving {
                revision,
                deadline: Some(deadline),
            },
            drift @ SaveState::SavingWithDrift { .. } => drift,
        };
    }

    fn deadline_after(&self, now: Instant) -> Instant {
        now.checked_add(self.debounce).unwrap_or(now)
    }

    fn start_save(&mut self) -> SaveRequest {
        let revision = self.buffer.revision;
        self.state = SaveState::Saving {
            revision,
            deadline: None,
        };
        SaveRequest {
            revision,
            draft: self.buffer.snapshot.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientPatch, DocumentType, PaymentState};

    fn base() -> Instant {
        Instant::from_std(std::time::Instant::now())
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn coordinator() -> MergeCoordinator {
        MergeCoordinator::new(DocumentDraft::new(DocumentType::Invoice), DEFAULT_DEBOUNCE)
    }

    fn name_patch(name: &str) -> DocumentPatch {
        DocumentPatch {
            client: ClientPatch {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn starts_idle_and_clean() {
        let c = coordinator();
        assert_eq!(c.state(), SaveState::Idle);
        assert!(!c.is_dirty());
        assert_eq!(c.next_deadline(), None);
    }

    #[test]
    fn each_edit_pushes_the_deadline_back() {
        let t0 = base();
        let mut c = coordinator();

        c.apply_user_edit(FieldEdit::Notes("a".into()), t0);
        assert_eq!(c.next_deadline(), Some(t0 + secs(5)));

        c.apply_user_edit(FieldEdit::Notes("ab".into()), t0 + secs(3));
        assert_eq!(c.next_deadline(), Some(t0 + secs(8)));

        assert_eq!(c.on_timer(t0 + secs(5)), None);
        let request = c.on_timer(t0 + secs(8)).expect("save due");
        assert_eq!(request.draft.content.notes, "ab");
        assert_eq!(request.revision, 2);
    }

    #[test]
    fn timer_on_clean_snapshot_does_nothing() {
        let t0 = base();
        let mut c = coordinator();
        c.apply_user_edit(FieldEdit::Notes("a".into()), t0);
        let request = c.request_save().unwrap();
        c.save_succeeded(request.revision, Uuid::new_v4(), t0);

        assert_eq!(c.state(), SaveState::Idle);
        assert_eq!(c.on_timer(t0 + secs(10)), None);
    }

    #[test]
    fn ai_patch_saves_buffered_user_edits_immediately() {
        let t0 = base();
        let mut c = coordinator();
        c.apply_user_edit(FieldEdit::Notes("typed by user".into()), t0);

        let (changed, request) = c.apply_ai_patch(name_patch("Acme"), None, t0 + secs(1));
        let request = request.expect("immediate save");

        assert_eq!(changed, vec!["client_name"]);
        assert_eq!(request.draft.content.notes, "typed by user");
        assert_eq!(request.draft.content.client.name, "Acme");
        assert_eq!(c.last_source(), Some(WriteSource::Ai));
        assert_eq!(
            c.state(),
            SaveState::Saving {
                revision: 2,
                deadline: Some(t0 + secs(6))
            }
        );
    }

    #[test]
    fn first_save_captures_id_and_later_saves_reuse_it() {
        let t0 = base();
        let mut c = coordinator();
        c.apply_user_edit(FieldEdit::Title("INV-1".into()), t0);
        let first = c.request_save().unwrap();
        assert_eq!(first.draft.id, None);

        let id = Uuid::new_v4();
        c.save_succeeded(first.revision, id, t0);

        c.apply_user_edit(FieldEdit::Title("INV-2".into()), t0 + secs(1));
        let second = c.request_save().unwrap();
        assert_eq!(second.draft.id, Some(id));

        c.save_succeeded(second.revision, Uuid::new_v4(), t0 + secs(1));
        assert_eq!(c.snapshot().id, Some(id));
    }

    #[test]
    fn requests_during_flight_collapse_into_one_follow_up() {
        let t0 = base();
        let mut c = coordinator();
        c.apply_user_edit(FieldEdit::Notes("v1".into()), t0);
        let first = c.request_save().unwrap();

        c.apply_user_edit(FieldEdit::Notes("v2".into()), t0 + secs(1));
        assert_eq!(c.request_save(), None);
        c.apply_user_edit(FieldEdit::Notes("v3".into()), t0 + secs(2));
        assert_eq!(c.request_save(), None);
        assert_eq!(c.state(), SaveState::SavingWithDrift { revision: 1 });

        let follow_up = c
            .save_succeeded(first.revision, Uuid::new_v4(), t0 + secs(3))
            .expect("one follow-up");
        assert_eq!(follow_up.draft.content.notes, "v3");
        assert!(c.is_saving());

        assert_eq!(c.save_succeeded(follow_up.revision, Uuid::new_v4(), t0 + secs(4)), None);
        assert_eq!(c.state(), SaveState::Idle);
        assert!(!c.is_dirty());
    }

    #[test]
    fn drift_without_new_changes_needs_no_follow_up() {
        let t0 = base();
        let mut c = coordinator();
        c.apply_user_edit(FieldEdit::Notes("v1".into()), t0);
        let first = c.request_save().unwrap();
        assert_eq!(c.request_save(), None);

        assert_eq!(c.save_succeeded(first.revision, Uuid::new_v4(), t0), None);
        assert_eq!(c.state(), SaveState::Idle);
    }

    #[test]
    fn edits_during_flight_wait_for_their_quiet_period() {
        let t0 = base();
        let mut c = coordinator();
        c.apply_user_edit(FieldEdit::Notes("v1".into()), t0);
        let first = c.request_save().unwrap();

        c.apply_user_edit(FieldEdit::Notes("v2".into()), t0 + secs(1));
        assert_eq!(c.save_succeeded(first.revision, Uuid::new_v4(), t0 + secs(2)), None);
        assert_eq!(
            c.state(),
            SaveState::Pending {
                deadline: t0 + secs(6)
            }
        );

        let next = c.on_timer(t0 + secs(6)).unwrap();
        assert_eq!(next.draft.content.notes, "v2");
    }

    #[test]
    fn timer_due_during_flight_is_deferred() {
        let t0 = base();
        let mut c = coordinator();
        c.apply_user_edit(FieldEdit::Notes("v1".into()), t0);
        let first = c.request_save().unwrap();
        c.apply_user_edit(FieldEdit::Notes("v2".into()), t0);

        assert_eq!(c.on_timer(t0 + secs(5)), None);
        assert_eq!(c.state(), SaveState::SavingWithDrift { revision: 1 });

        let follow_up = c.save_succeeded(first.revision, Uuid::new_v4(), t0 + secs(6));
        assert_eq!(follow_up.unwrap().draft.content.notes, "v2");
    }

    #[test]
    fn failed_save_keeps_snapshot_and_waits_for_next_trigger() {
        let t0 = base();
        let mut c = coordinator();
        c.apply_user_edit(FieldEdit::Notes("keep me".into()), t0);
        let _ = c.request_save().unwrap();

        assert_eq!(c.save_failed(t0 + secs(1)), None);
        assert_eq!(c.state(), SaveState::Idle);
        assert!(c.is_dirty());
        assert_eq!(c.snapshot().content.notes, "keep me");
        assert_eq!(c.snapshot().id, None);

        c.apply_user_edit(FieldEdit::Title("T".into()), t0 + secs(2));
        let retry = c.on_timer(t0 + secs(7)).unwrap();
        assert_eq!(retry.draft.content.notes, "keep me");
        assert_eq!(retry.draft.content.title, "T");
    }

    #[test]
    fn failed_save_with_deferred_request_issues_one_follow_up() {
        let t0 = base();
        let mut c = coordinator();
        c.apply_user_edit(FieldEdit::Notes("v1".into()), t0);
        let _ = c.request_save().unwrap();
        let _ = c.request_save();

        assert!(c.save_failed(t0).is_some());
        assert_eq!(c.save_failed(t0), None);
        assert_eq!(c.state(), SaveState::Idle);
    }

    #[test]
    fn status_changes_save_immediately() {
        let mut c = coordinator();
        let paid = PaymentStatus {
            state: PaymentState::Paid,
            paid_at: Some(chrono::Utc::now()),
            undo_deadline: Some(chrono::Utc::now()),
        };

        let request = c.apply_status(paid.clone()).expect("save");
        assert_eq!(request.draft.status, paid);
        assert_eq!(c.apply_status(paid), None);
    }

    #[test]
    fn oversized_debounce_is_capped() {
        let t0 = base();
        let mut c = MergeCoordinator::new(DocumentDraft::new(DocumentType::Invoice), Duration::MAX);
        assert_eq!(c.debounce(), MAX_DEBOUNCE);

        c.apply_user_edit(FieldEdit::Notes("a".into()), t0);
        assert_eq!(c.next_deadline(), Some(t0 + MAX_DEBOUNCE));

        let first = c.request_save().unwrap();
        let (_, request) = c.apply_ai_patch(name_patch("Acme"), None, t0);
        assert_eq!(request, None);
        assert_eq!(c.state(), SaveState::SavingWithDrift { revision: first.revision });
    }
}
