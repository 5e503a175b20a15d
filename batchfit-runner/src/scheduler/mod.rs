//! Scheduler layer
//!
//! Runs a batch of job descriptors with bounded concurrency, tracks each
//! job through its states, and aggregates the outcome.

pub mod manager;

pub use manager::{CancelHandle, JobManager};
