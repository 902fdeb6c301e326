// src/engine/mod.rs

//! Run orchestration.
//!
//! - [`scheduler`] computes worker counts and runs the light and heavy
//!   phases with bounded parallelism.
//! - [`transaction`] stages snapshot writes until reporting succeeded.
//! - [`run`] wires executor, selector, transaction and reporters into one
//!   invocation.

pub mod run;
pub mod scheduler;
pub mod transaction;

pub use run::{Engine, ReportScope, RunReport, run_session};
pub use scheduler::WorkerLimits;
pub use transaction::{CommitSummary, RunTransaction, StagedWrite, TransactionMode};
