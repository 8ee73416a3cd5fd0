//! Error types.
//!
//! Validation failures (`TransitionError`, `EdgeError`) are always recoverable:
//! they describe an action that was rejected and leave state untouched.
//! Persistence failures are transient from the session's point of view; the
//! in-memory snapshot stays authoritative until a save succeeds.

use thiserror::Error;
use uuid::Uuid;

use crate::models::{DocumentType, PaymentState};

/// A rejected status transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot move from {from} to {to}: {reason}")]
    InvalidTransition {
        from: PaymentState,
        to: PaymentState,
        reason: String,
    },
}

impl TransitionError {
    pub(crate) fn invalid(from: PaymentState, to: PaymentState, reason: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from,
            to,
            reason: reason.into(),
        }
    }
}

/// A rejected relationship edge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EdgeError {
    #[error("a document cannot be linked to itself")]
    IdentityEdge,

    #[error("invalid relationship: {0}")]
    InvalidEdgeType(String),

    #[error("relationship would create a cycle")]
    CycleDetected,

    #[error("documents are already linked")]
    DuplicateEdge,
}

impl EdgeError {
    pub(crate) fn not_permitted(source: DocumentType, target: DocumentType) -> Self {
        Self::InvalidEdgeType(format!("a {source} cannot be linked to a {target}"))
    }
}

/// Errors from a [`PersistenceGateway`](crate::gateway::PersistenceGateway)
/// or [`RelationshipStore`](crate::gateway::RelationshipStore).
#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    #[error("document not found: {0}")]
    NotFound(Uuid),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<anyhow::Error> for PersistenceError {
    fn from(e: anyhow::Error) -> Self {
        Self::Storage(format!("{e:#}"))
    }
}

/// Errors from the AI content generator.
#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI generator returned an error: {0}")]
    Upstream(String),

    #[error("AI generator is not configured")]
    NotConfigured,
}

/// Errors crossing the [`DocumentSession`](crate::session::DocumentSession) boundary.
///
/// None of these are fatal to the session; a caller can keep editing after any of them.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Ai(#[from] AiError),
}
