//! Domain models for docflow.
//!
//! # Core Concepts
//!
//! - [`Document`]: a quotation, contract, invoice or receipt together with its
//!   [`DocumentContent`] and [`PaymentStatus`]. All four types share one content schema.
//! - [`PaymentStatus`]: lifecycle status of a document. Only the
//!   [`StatusMachine`](crate::workflow::StatusMachine) moves a document between states.
//! - [`RelationshipEdge`]: a typed directed link from one document to another
//!   (quotation → contract → invoice → receipt).
//! - [`DocumentPatch`]: a partial update proposed by the AI content generator.
//! - [`FieldEdit`]: a single field change from the interactive editing session.

mod document;
mod edit;
mod patch;
mod relationship;
mod status;

pub use document::*;
pub use edit::*;
pub use patch::*;
pub use relationship::*;
pub use status::*;
