pub mod config;
pub mod docker_adapter;
pub mod http_probe;
pub mod metrics;
pub mod workspace;

pub use docker_adapter::DockerAdapter;
pub use http_probe::HttpHealthProbe;
pub use metrics::TracingMetrics;
pub use workspace::LocalWorkspace;
