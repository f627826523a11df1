pub mod cli;
pub mod domain;
pub mod error;
pub mod infra;
pub mod services;

// Make test_support available for integration tests
pub mod test_support;

pub use domain::{
    AggregateStatus, ContainerRuntime, ExtensionConfig, HealthState, ServiceId, ServiceStatus,
};
pub use error::OrchestratorError;
pub use infra::DockerAdapter;
pub use services::{HealthMonitor, Orchestrator, StatusTracker};
