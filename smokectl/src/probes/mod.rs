//! Smoke probing: execute, validate, schedule and coordinate HTTP probes.
//!
//! - [`executor`]: one timed HTTP attempt, normalized into a [`ProbeOutcome`]
//! - [`validators`]: content, header, JSON shape and latency checks applied to an outcome
//! - [`scheduler`]: bounded, order-preserving fan-out of probe tasks
//! - [`runner`]: a full run, from input validation to the failure notification

pub mod executor;
pub mod models;
pub mod runner;
pub mod scheduler;
pub mod validators;

pub use executor::ProbeExecutor;
pub use models::{ProbeOutcome, ProbeRequest, RunExpectations, RunReport};
pub use runner::SmokeRunner;
