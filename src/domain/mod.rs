pub mod catalog;
mod config;
mod container;
mod status;
pub mod traits;

pub use catalog::{ServiceDefinition, ServiceId};
pub use config::ExtensionConfig;
pub use container::{ContainerSpec, runtime_host_path};
pub use status::{AggregateStatus, HealthState, ServiceStatus, StatusPatch};
pub use traits::{
    ContainerRuntime, EventSender, ExecOutput, HealthProbe, MetricsSink, RuntimeCommand,
    RuntimeEvent, StreamEvent, Workspace,
};
