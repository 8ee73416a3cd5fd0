//! Document workflow rules: payment status transitions and the relationship graph.

mod graph;
mod status;

pub use graph::RelationshipGraph;
pub use status::{can_undo, StatusMachine, StatusTransition, DEFAULT_UNDO_WINDOW, MAX_UNDO_WINDOW};
