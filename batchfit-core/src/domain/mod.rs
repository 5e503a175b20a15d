//! Core domain types
//!
//! This module contains the core domain structures used across batchfit.
//! They are shared between the runner (which builds and mutates them while
//! processing a batch) and the CLI (which reports on them).

pub mod artifact;
pub mod batch;
pub mod config;
pub mod job;
pub mod next_run;
