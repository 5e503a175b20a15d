//! Batch runner for external compute jobs
//!
//! The pipeline for one invocation:
//! - [`resolver`] turns raw arguments into job file paths
//! - [`descriptor`] builds a [`JobDescriptor`](batchfit_core::domain::job::JobDescriptor)
//!   per path, loading configuration through [`config`]
//! - [`scheduler`] runs the descriptors through an [`service::ExecutionService`],
//!   which stages ([`staging`]), plans ([`planner`]) and applies the
//!   artifact [`policy`]

pub mod config;
pub mod descriptor;
pub mod jobfile;
pub mod planner;
pub mod policy;
pub mod resolver;
pub mod scheduler;
pub mod service;
pub mod staging;

pub use config::ConfigOverrides;
pub use descriptor::DescriptorBuilder;
pub use scheduler::{CancelHandle, JobManager};
pub use service::{ExecutionService, GridExecutionService, LocalExecutionService};
