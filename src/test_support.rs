use crate::domain::{
    ContainerRuntime, EventSender, ExecOutput, ExtensionConfig, HealthProbe, MetricsSink,
    RuntimeCommand, RuntimeEvent, ServiceId, StreamEvent,
};
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

#[derive(Debug, Clone)]
pub struct MockContainer {
    pub name: String,
    pub running: bool,
    pub host_ports: Vec<u16>,
    /// Container side of each entry of `host_ports`
    pub container_ports: Vec<u16>,
    pub run_args: Vec<String>,
}

/// In-memory container runtime that records every command as `op:target`.
///
/// Operations listed with [`MockRuntime::set_fail_on`] fail: `start`, `stop`
/// and `rm` exit non-zero, `inspect`, `network` and `volume` cannot reach the
/// runtime, `network_create`/`volume_create` exit non-zero, `run` reports a
/// stream error, `run_exit` closes with code 125 and `run_spawn` fails to spawn.
#[derive(Debug, Default)]
pub struct MockRuntime {
    containers: RwLock<HashMap<String, MockContainer>>,
    networks: RwLock<HashSet<String>>,
    volumes: RwLock<HashSet<String>>,
    commands: RwLock<Vec<String>>,
    fail_on: RwLock<HashSet<String>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a container publishing each port on the same host port.
    pub fn add_container(&self, name: &str, running: bool, ports: &[u16]) {
        let bindings: Vec<(u16, u16)> = ports.iter().map(|p| (*p, *p)).collect();
        self.add_container_with_bindings(name, running, &bindings);
    }

    /// Adds a container with explicit `(host, container)` port bindings.
    pub fn add_container_with_bindings(&self, name: &str, running: bool, bindings: &[(u16, u16)]) {
        self.containers.write().unwrap().insert(
            name.to_string(),
            MockContainer {
                name: name.to_string(),
                running,
                host_ports: bindings.iter().map(|(host, _)| *host).collect(),
                container_ports: bindings.iter().map(|(_, container)| *container).collect(),
                run_args: Vec::new(),
            },
        );
    }

    pub fn add_network(&self, name: &str) {
        self.networks.write().unwrap().insert(name.to_string());
    }

    pub fn add_volume(&self, name: &str) {
        self.volumes.write().unwrap().insert(name.to_string());
    }

    pub fn set_fail_on(&self, operation: &str) {
        self.fail_on.write().unwrap().insert(operation.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_on.write().unwrap().clear();
    }

    pub fn clear_commands(&self) {
        self.commands.write().unwrap().clear();
    }

    pub fn get_commands(&self) -> Vec<String> {
        self.commands.read().unwrap().clone()
    }

    pub fn commands_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.commands
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn has_network(&self, name: &str) -> bool {
        self.networks.read().unwrap().contains(name)
    }

    pub fn has_volume(&self, name: &str) -> bool {
        self.volumes.read().unwrap().contains(name)
    }

    pub fn container_exists(&self, name: &str) -> bool {
        self.containers.read().unwrap().contains_key(name)
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.containers
            .read()
            .unwrap()
            .get(name)
            .is_some_and(|c| c.running)
    }

    pub fn get_container(&self, name: &str) -> Option<MockContainer> {
        self.containers.read().unwrap().get(name).cloned()
    }

    fn record_command(&self, cmd: String) {
        self.commands.write().unwrap().push(cmd);
    }

    fn fails(&self, operation: &str) -> bool {
        self.fail_on.read().unwrap().contains(operation)
    }

    fn check_fail(&self, operation: &str) -> Result<()> {
        if self.fails(operation) {
            bail!("Mock failure on: {}", operation);
        }
        Ok(())
    }

    fn exit(code: i32, stderr: &str) -> ExecOutput {
        ExecOutput {
            exit_code: code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    fn inspect(&self, args: &[String]) -> Result<ExecOutput> {
        let name = args.last().cloned().unwrap_or_default();
        self.record_command(format!("inspect:{name}"));
        self.check_fail("inspect")?;

        let containers = self.containers.read().unwrap();
        let Some(container) = containers.get(&name) else {
            return Ok(Self::exit(1, &format!("Error: No such container: {name}")));
        };

        let bindings: Vec<String> = container
            .container_ports
            .iter()
            .zip(&container.host_ports)
            .map(|(container_port, host_port)| {
                format!(r#""{container_port}/tcp": [{{"HostIp": "", "HostPort": "{host_port}"}}]"#)
            })
            .collect();
        let stdout = format!(
            r#"[{{"Name": "/{name}", "State": {{"Running": {}}}, "HostConfig": {{"PortBindings": {{{}}}}}}}]"#,
            container.running,
            bindings.join(", ")
        );

        Ok(ExecOutput {
            exit_code: 0,
            stdout,
            stderr: String::new(),
        })
    }

    fn prerequisite(
        &self,
        kind: &str,
        registry: &RwLock<HashSet<String>>,
        args: &[String],
    ) -> Result<ExecOutput> {
        let sub = args.first().cloned().unwrap_or_default();
        let name = args.get(1).cloned().unwrap_or_default();
        self.record_command(format!("{kind}_{sub}:{name}"));
        self.check_fail(kind)?;

        match sub.as_str() {
            "inspect" if registry.read().unwrap().contains(&name) => Ok(Self::exit(0, "")),
            "inspect" => Ok(Self::exit(1, &format!("Error: No such {kind}: {name}"))),
            "create" if self.fails(&format!("{kind}_create")) => {
                Ok(Self::exit(1, "Error: mock create failure"))
            }
            "create" => {
                registry.write().unwrap().insert(name);
                Ok(Self::exit(0, ""))
            }
            other => bail!("Unsupported {kind} subcommand: {other}"),
        }
    }

    fn batch(&self, command: RuntimeCommand, args: &[String]) -> ExecOutput {
        let names: Vec<&String> = args.iter().filter(|a| !a.starts_with('-')).collect();
        let joined = names
            .iter()
            .map(|n| n.as_str())
            .collect::<Vec<_>>()
            .join(",");
        self.record_command(format!("{command}:{joined}"));

        if self.fails(command.as_str()) {
            return Self::exit(1, "Error: mock failure");
        }

        let mut containers = self.containers.write().unwrap();
        if let Some(missing) = names.iter().find(|n| !containers.contains_key(n.as_str())) {
            return Self::exit(1, &format!("Error: No such container: {missing}"));
        }

        match command {
            RuntimeCommand::Start | RuntimeCommand::Stop => {
                let running = command == RuntimeCommand::Start;
                for name in names {
                    if let Some(container) = containers.get_mut(name.as_str()) {
                        container.running = running;
                    }
                }
            }
            RuntimeCommand::Rm => {
                if let Some(busy) = names
                    .iter()
                    .find(|n| containers.get(n.as_str()).is_some_and(|c| c.running))
                {
                    return Self::exit(
                        1,
                        &format!("Error: cannot remove container {busy}: container is running"),
                    );
                }
                for name in names {
                    containers.remove(name.as_str());
                }
            }
            _ => {}
        }

        Self::exit(0, "")
    }
}

fn flag_values<'a>(args: &'a [String], flag: &str) -> Vec<&'a str> {
    args.windows(2)
        .filter(|pair| pair[0] == flag)
        .map(|pair| pair[1].as_str())
        .collect()
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn exec(&self, command: RuntimeCommand, args: &[String]) -> Result<ExecOutput> {
        match command {
            RuntimeCommand::Inspect => self.inspect(args),
            RuntimeCommand::Network => self.prerequisite("network", &self.networks, args),
            RuntimeCommand::Volume => self.prerequisite("volume", &self.volumes, args),
            RuntimeCommand::Start | RuntimeCommand::Stop | RuntimeCommand::Rm => {
                Ok(self.batch(command, args))
            }
            RuntimeCommand::Run => bail!("run must be streamed"),
        }
    }

    async fn exec_streamed(
        &self,
        service: ServiceId,
        command: RuntimeCommand,
        args: &[String],
        events: EventSender,
    ) -> Result<()> {
        let name = flag_values(args, "--name")
            .first()
            .map(|n| n.to_string())
            .unwrap_or_default();
        self.record_command(format!("{command}:{name}"));
        self.check_fail("run_spawn")?;

        let send = |kind| {
            let _ = events.send(RuntimeEvent::new(service, kind));
        };
        send(StreamEvent::Started);

        if self.fails("run") {
            send(StreamEvent::Failed("mock stream failure".into()));
            return Ok(());
        }
        if self.fails("run_exit") || self.container_exists(&name) {
            send(StreamEvent::Output(format!(
                "Error: the container name \"{name}\" is already in use"
            )));
            send(StreamEvent::Closed(125));
            return Ok(());
        }

        let bindings: Vec<(u16, u16)> = flag_values(args, "-p")
            .iter()
            .filter_map(|p| {
                let (host, container) = p.split_once(':')?;
                Some((host.parse().ok()?, container.parse().ok()?))
            })
            .collect();
        self.containers.write().unwrap().insert(
            name.clone(),
            MockContainer {
                name,
                running: true,
                host_ports: bindings.iter().map(|(host, _)| *host).collect(),
                container_ports: bindings.iter().map(|(_, container)| *container).collect(),
                run_args: args.to_vec(),
            },
        );

        send(StreamEvent::Closed(0));
        Ok(())
    }
}

/// Health probe answering from a script; once exhausted it keeps failing.
#[derive(Debug)]
pub struct ScriptedProbe {
    script: Mutex<VecDeque<Result<bool, String>>>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new(results: Vec<bool>) -> Self {
        Self {
            script: Mutex::new(results.into_iter().map(Ok).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    /// `errors` unreachable-endpoint errors, then `results`.
    pub fn with_errors(errors: usize, results: Vec<bool>) -> Self {
        let script = std::iter::repeat_with(|| Err("connection refused".to_string()))
            .take(errors)
            .chain(results.into_iter().map(Ok))
            .collect();
        Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn check(&self, _config: &ExtensionConfig) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(healthy)) => Ok(healthy),
            Some(Err(message)) => bail!(message),
            None => Ok(false),
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingMetrics {
    events: Mutex<Vec<(String, Vec<(&'static str, String)>)>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, Vec<(&'static str, String)>)> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl MetricsSink for RecordingMetrics {
    fn send(&self, event: &str, attributes: &[(&'static str, String)]) {
        self.events
            .lock()
            .unwrap()
            .push((event.to_string(), attributes.to_vec()));
    }
}
