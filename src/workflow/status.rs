//! Payment status state machine.
//!
//! ```text
//!            mark_as_paid              void_receipt
//!   unpaid ───────────────▶ paid ─────────────────▶ voided
//!      ▲                     │      (receipts only)
//!      └─────────────────────┘
//!        undo_payment (until undo_deadline)
//! ```
//!
//! Every operation takes `now` explicitly so the undo window is checked
//! against the caller's clock at the moment of the call.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransitionError;
use crate::models::{DocumentType, PaymentState, PaymentStatus};

pub const DEFAULT_UNDO_WINDOW: Duration = Duration::from_secs(10);

/// Longest undo window a machine will grant.
pub const MAX_UNDO_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// A user-requested status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusTransition {
    MarkAsPaid,
    UndoPayment,
    VoidReceipt,
}

impl StatusTransition {
    /// The transition that would move a document to `target`, if any.
    pub fn toward(target: PaymentState) -> Option<Self> {
        match target {
            PaymentState::Paid => Some(Self::MarkAsPaid),
            PaymentState::Unpaid => Some(Self::UndoPayment),
            PaymentState::Voided => Some(Self::VoidReceipt),
            PaymentState::Pending => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StatusMachine {
    undo_window: TimeDelta,
}

impl Default for StatusMachine {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_WINDOW)
    }
}

impl StatusMachine {
    /// `undo_window` is capped at [`MAX_UNDO_WINDOW`].
    pub fn new(undo_window: Duration) -> Self {
        let undo_window = TimeDelta::from_std(undo_window.min(MAX_UNDO_WINDOW))
            .unwrap_or_else(|_| TimeDelta::seconds(DEFAULT_UNDO_WINDOW.as_secs() as i64));
        Self { undo_window }
    }

    pub fn undo_window(&self) -> TimeDelta {
        self.undo_window
    }

    pub fn apply(
        &self,
        transition: StatusTransition,
        doc_type: DocumentType,
        current: &PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<PaymentStatus, TransitionError> {
        match transition {
            StatusTransition::MarkAsPaid => self.mark_as_paid(doc_type, current, now),
            StatusTransition::UndoPayment => self.undo_payment(current, now),
            StatusTransition::VoidReceipt => self.void_receipt(doc_type, current),
        }
    }

    /// unpaid → paid. Only invoices and receipts can be paid.
    pub fn mark_as_paid(
        &self,
        doc_type: DocumentType,
        current: &PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<PaymentStatus, TransitionError> {
        let from = current.state;
        let to = PaymentState::Paid;

        if from == PaymentState::Voided {
            return Err(TransitionError::invalid(from, to, "voided documents cannot change status"));
        }
        if !doc_type.accepts_payment() {
            return Err(TransitionError::invalid(
                from,
                to,
                format!("a {doc_type} cannot be marked as paid; only invoices and receipts can"),
            ));
        }
        if from != PaymentState::Unpaid {
            return Err(TransitionError::invalid(from, to, "only unpaid documents can be marked as paid"));
        }

        let undo_deadline = now
            .checked_add_signed(self.undo_window)
            .ok_or_else(|| TransitionError::invalid(from, to, "undo deadline is out of range"))?;

        Ok(PaymentStatus {
            state: to,
            paid_at: Some(now),
            undo_deadline: Some(undo_deadline),
        })
    }

    /// paid → unpaid, while the undo window is open.
    ///
    /// Once the deadline has passed the call is a no-op that returns the
    /// unchanged status.
    pub fn undo_payment(
        &self,
        current: &PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<PaymentStatus, TransitionError> {
        let from = current.state;
        if from != PaymentState::Paid {
            return Err(TransitionError::invalid(
                from,
                PaymentState::Unpaid,
                "only paid documents can have their payment undone",
            ));
        }
        if !can_undo(current, now) {
            return Ok(current.clone());
        }

        Ok(PaymentStatus::unpaid())
    }

    /// paid → voided, for receipts only. Terminal.
    pub fn void_receipt(
        &self,
        doc_type: DocumentType,
        current: &PaymentStatus,
    ) -> Result<PaymentStatus, TransitionError> {
        let from = current.state;
        let to = PaymentState::Voided;

        if doc_type != DocumentType::Receipt {
            return Err(TransitionError::invalid(
                from,
                to,
                format!("a {doc_type} cannot be voided; only receipts can"),
            ));
        }
        if from != PaymentState::Paid {
            return Err(TransitionError::invalid(from, to, "only paid receipts can be voided"));
        }

        Ok(PaymentStatus {
            state: to,
            paid_at: None,
            undo_deadline: None,
        })
    }
}

/// Whether a payment can still be undone at `now`.
///
/// Evaluated fresh on every call; never cache the result.
pub fn can_undo(status: &PaymentStatus, now: DateTime<Utc>) -> bool {
    status.state == PaymentState::Paid && status.undo_deadline.is_some_and(|deadline| now <= deadline)
}
