//! Service layer
//!
//! Services prepare and run jobs against an execution target. They are
//! trait-based so the job manager can be driven by a fake in tests.

mod execution;
pub mod post_work;

// Re-export traits
pub use execution::ExecutionService;

// Re-export implementations
pub use execution::{GridExecutionService, LocalExecutionService};
