//! Batchfit Core
//!
//! Core types and abstractions for the batchfit job orchestrator.
//!
//! This crate contains:
//! - Domain types: job descriptors, configuration, artifact instructions,
//!   batch results and run-directory numbering
//! - Error taxonomy shared by the runner and the CLI
//! - The filesystem capability used by every component that touches disk
//! - A small placeholder template renderer

pub mod domain;
pub mod error;
pub mod fs;
pub mod template;
