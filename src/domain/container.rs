use super::catalog::{EXTENSION_NETWORK, MountSource, ServiceDefinition};
use super::config::ExtensionConfig;
use std::path::Path;

/// Fully resolved parameters of a `run` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub network: String,
    pub hostname: String,
    pub volumes: Vec<String>,
    pub env: Vec<String>,
    pub ports: Vec<String>,
    pub extra_args: Vec<String>,
    pub labels: Vec<String>,
    pub command: Vec<String>,
}

impl ContainerSpec {
    /// Arguments following the `run` sub-command, in the order the runtime expects them.
    pub fn run_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-d".into(),
            "--name".into(),
            self.name.clone(),
            "--network".into(),
            self.network.clone(),
            "--hostname".into(),
            self.hostname.clone(),
        ];

        for volume in &self.volumes {
            args.push("-v".into());
            args.push(volume.clone());
        }

        for env in &self.env {
            args.push("-e".into());
            args.push(env.clone());
        }

        for port in &self.ports {
            args.push("-p".into());
            args.push(port.clone());
        }

        args.extend(self.extra_args.iter().cloned());

        for label in &self.labels {
            args.push("--label".into());
            args.push(label.clone());
        }

        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());

        args
    }
}

impl ServiceDefinition {
    pub fn to_spec(&self, config: &ExtensionConfig, app_dir: &Path) -> ContainerSpec {
        let offset = config.port_offset;
        let host_dir = runtime_host_path(app_dir, cfg!(windows));

        ContainerSpec {
            name: self.id.container_name().to_string(),
            image: self.image.to_string(),
            network: EXTENSION_NETWORK.to_string(),
            hostname: self.hostname.to_string(),
            volumes: self
                .volumes
                .iter()
                .map(|mount| match mount.source {
                    MountSource::Named(volume) => format!("{volume}:{}", mount.target),
                    MountSource::AppDir(sub) => format!("{host_dir}/{sub}:{}", mount.target),
                })
                .collect(),
            env: self.env.iter().map(|(k, v)| format!("{k}={v}")).collect(),
            ports: self.ports.iter().map(|p| p.render(offset)).collect(),
            extra_args: self.extra_args.iter().map(|a| a.to_string()).collect(),
            labels: self.labels.iter().map(|l| l.to_string()).collect(),
            command: self.command.args(offset),
        }
    }
}

/// Converts a host path into the form the runtime accepts for bind mounts.
///
/// On Windows `C:\Users\dev\dir` becomes `//c/Users/dev/dir`.
pub fn runtime_host_path(path: &Path, windows: bool) -> String {
    let raw = path.to_string_lossy();
    if !windows {
        return raw.into_owned();
    }

    let forward = raw.replace('\\', "/");
    let mut chars = forward.chars();
    match (chars.next(), chars.next()) {
        (Some(drive), Some(':')) if drive.is_ascii_alphabetic() => {
            format!("//{}{}", drive.to_ascii_lowercase(), chars.as_str())
        }
        _ => forward,
    }
}
