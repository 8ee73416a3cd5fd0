use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payment/lifecycle status of a document.
///
/// Invariants maintained by [`StatusMachine`](crate::workflow::StatusMachine):
/// - `state == Paid` implies `paid_at` and `undo_deadline` are both set,
///   with `undo_deadline = paid_at + W`.
/// - `Voided` is terminal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentStatus {
    #[serde(rename = "status")]
    pub state: PaymentState,
    pub paid_at: Option<DateTime<Utc>>,
    pub undo_deadline: Option<DateTime<Utc>>,
}

impl PaymentStatus {
    pub fn unpaid() -> Self {
        Self::default()
    }

    pub fn is_paid(&self) -> bool {
        self.state == PaymentState::Paid
    }

    pub fn is_voided(&self) -> bool {
        self.state == PaymentState::Voided
    }
}

/// The states a document's payment status can be in.
///
/// - `Unpaid`: initial state
/// - `Pending`: payment initiated but not confirmed
/// - `Paid`: payment recorded; reversible until the undo deadline passes
/// - `Voided`: receipt cancelled; terminal
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    #[default]
    Unpaid,
    Pending,
    Paid,
    Voided,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Voided => "voided",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unpaid" => Some(Self::Unpaid),
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "voided" => Some(Self::Voided),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response for polling whether a payment can still be undone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoAvailability {
    pub can_undo: bool,
    pub undo_deadline: Option<DateTime<Utc>>,
}
