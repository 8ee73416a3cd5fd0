//! Document lifecycle and workflow coordination engine.
//!
//! - [`workflow::StatusMachine`] moves a document between unpaid, paid and voided,
//!   with a bounded window in which a payment can be undone.
//! - [`workflow::RelationshipGraph`] validates and stores typed links between
//!   quotations, contracts, invoices and receipts.
//! - [`session::DocumentSession`] reconciles the interactive editor and the AI
//!   content generator into one snapshot and schedules durable saves.

pub mod ai;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod session;
pub mod workflow;
