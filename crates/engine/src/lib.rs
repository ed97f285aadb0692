//! Database engine for Chronicle
//!
//! This crate orchestrates the lower layers:
//! - [`DurableStorage`]: the composite that wraps a base storage with WAL,
//!   OCC and index updates, enforcing the mutation pipeline
//! - [`recovery`]: the startup sweep that resolves WAL entries a crash left
//!   behind
//! - [`Database`]: the process-wide handle exposing the contract the
//!   protocol servers consume

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod database;
pub mod durable;
pub mod recovery;

pub use database::Database;
pub use durable::DurableStorage;
pub use recovery::RecoveryReport;
