// src/exec/mod.rs

//! Job execution layer.
//!
//! - [`executor`] runs one job once: fetch (with retries and a per-attempt
//!   timeout), then the filter pipeline, producing a [`RunOutcome`].
//! - [`backoff`] holds the delay policy between retries.
//!
//! The executor never touches the snapshot store. Validators for
//! conditional retrieval are computed by the caller and passed in.

pub mod backoff;
pub mod executor;

pub use executor::{FetchStatus, JobExecutor, RunOutcome};
