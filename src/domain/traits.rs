use super::catalog::ServiceId;
use super::config::ExtensionConfig;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::{self, Debug};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Sub-commands of the runtime CLI this tool is allowed to issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeCommand {
    Run,
    Start,
    Stop,
    Rm,
    Inspect,
    Network,
    Volume,
}

impl RuntimeCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            RuntimeCommand::Run => "run",
            RuntimeCommand::Start => "start",
            RuntimeCommand::Stop => "stop",
            RuntimeCommand::Rm => "rm",
            RuntimeCommand::Inspect => "inspect",
            RuntimeCommand::Network => "network",
            RuntimeCommand::Volume => "volume",
        }
    }
}

impl fmt::Display for RuntimeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Progress of a streamed runtime command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Started,
    Output(String),
    Failed(String),
    Closed(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEvent {
    pub service: ServiceId,
    pub kind: StreamEvent,
}

impl RuntimeEvent {
    pub fn new(service: ServiceId, kind: StreamEvent) -> Self {
        Self { service, kind }
    }
}

pub type EventSender = mpsc::UnboundedSender<RuntimeEvent>;

/// Trait for container runtime operations
#[async_trait]
pub trait ContainerRuntime: Send + Sync + Debug {
    /// Runs a command to completion and returns its exit code and output.
    ///
    /// `Err` is reserved for failures to invoke the runtime at all; a non-zero
    /// exit code is reported through [`ExecOutput`].
    async fn exec(&self, command: RuntimeCommand, args: &[String]) -> Result<ExecOutput>;

    /// Spawns a long-running command and returns once it has started.
    ///
    /// Output lines and completion are delivered as [`RuntimeEvent`]s tagged
    /// with `service`. The sender is dropped once `Closed` or `Failed` is sent.
    async fn exec_streamed(
        &self,
        service: ServiceId,
        command: RuntimeCommand,
        args: &[String],
        events: EventSender,
    ) -> Result<()>;
}

/// Readiness check against the primary service API
#[async_trait]
pub trait HealthProbe: Send + Sync + Debug {
    /// `Ok(true)` only when the endpoint answered with HTTP 200.
    async fn check(&self, config: &ExtensionConfig) -> Result<bool>;
}

/// Fire-and-forget usage events
pub trait MetricsSink: Send + Sync + Debug {
    fn send(&self, event: &str, attributes: &[(&'static str, String)]);
}

/// Host directory mounted into the bundle
pub trait Workspace: Send + Sync + Debug {
    /// Prepares the extension home directory and returns its path.
    fn initialize(&self) -> Result<PathBuf>;

    /// Writes the property files the containers read from `/deployments/config`.
    fn write_properties(&self, config: &ExtensionConfig) -> Result<()>;
}
