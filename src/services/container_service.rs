use crate::domain::{
    ContainerRuntime, ContainerSpec, EventSender, RuntimeCommand, ServiceId, ServiceStatus,
};
use crate::error::OrchestratorError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Per-container runtime operations for the managed services
pub struct ContainerService {
    runtime: Arc<dyn ContainerRuntime>,
}

impl ContainerService {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Reads existence, run state and published host port of a container.
    ///
    /// The mapped port is the host side of the binding whose container port
    /// matches the offset-dependent binding under `port_offset`.
    pub async fn inspect(&self, id: ServiceId, port_offset: u16) -> Result<ServiceStatus> {
        let args = [
            "--type".to_string(),
            "container".to_string(),
            id.container_name().to_string(),
        ];
        let output = self.runtime.exec(RuntimeCommand::Inspect, &args).await?;

        if !output.success() {
            debug!("{id} não existe: {}", output.stderr.trim());
            return Ok(ServiceStatus::absent());
        }

        let sensitive = id
            .definition()
            .config_sensitive_binding()
            .map(|binding| binding.container.resolve(port_offset));

        parse_inspect(&output.stdout, sensitive).with_context(|| format!("lendo inspect de {id}"))
    }

    pub async fn start(&self, id: ServiceId) -> Result<()> {
        self.batch(RuntimeCommand::Start, &[], &[id]).await
    }

    /// Stops every container in a single runtime invocation.
    pub async fn stop(&self, ids: &[ServiceId]) -> Result<()> {
        self.batch(RuntimeCommand::Stop, &[], ids).await
    }

    /// Removes every container (and its anonymous volumes) in a single runtime invocation.
    pub async fn remove(&self, ids: &[ServiceId]) -> Result<()> {
        self.batch(RuntimeCommand::Rm, &["-v"], ids).await
    }

    /// Issues `run` for `spec`; completion arrives on `events`.
    pub async fn run(&self, id: ServiceId, spec: &ContainerSpec, events: EventSender) -> Result<()> {
        self.runtime
            .exec_streamed(id, RuntimeCommand::Run, &spec.run_args(), events)
            .await
    }

    async fn batch(&self, command: RuntimeCommand, flags: &[&str], ids: &[ServiceId]) -> Result<()> {
        let args: Vec<String> = flags
            .iter()
            .map(|f| f.to_string())
            .chain(ids.iter().map(|id| id.container_name().to_string()))
            .collect();

        let output = self.runtime.exec(command, &args).await?;
        if !output.success() {
            return Err(
                OrchestratorError::command_failed(command, ids, output.exit_code, &output.stderr)
                    .into(),
            );
        }

        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectRecord {
    state: InspectState,
    #[serde(default)]
    host_config: Option<InspectHostConfig>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    running: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectHostConfig {
    #[serde(default)]
    port_bindings: Option<HashMap<String, Option<Vec<InspectPortBinding>>>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectPortBinding {
    #[serde(default)]
    host_port: String,
}

/// `sensitive` is the container port whose host binding is reported as the mapped port;
/// without one the lowest published host port is used.
fn parse_inspect(stdout: &str, sensitive: Option<u16>) -> Result<ServiceStatus> {
    let records: Vec<InspectRecord> = serde_json::from_str(stdout)?;
    let Some(record) = records.into_iter().next() else {
        return Ok(ServiceStatus::absent());
    };

    let bindings = record
        .host_config
        .and_then(|hc| hc.port_bindings)
        .unwrap_or_default();

    let host_ports = |key: &str| -> Vec<u16> {
        bindings
            .get(key)
            .into_iter()
            .flatten()
            .flatten()
            .filter_map(|binding| binding.host_port.parse::<u16>().ok())
            .collect()
    };

    let mapped_port = match sensitive {
        Some(container_port) => host_ports(&format!("{container_port}/tcp"))
            .into_iter()
            .min(),
        None => bindings
            .keys()
            .flat_map(|key| host_ports(key.as_str()))
            .min(),
    };

    Ok(ServiceStatus {
        exists: true,
        is_running: record.state.running,
        mapped_port,
    })
}
