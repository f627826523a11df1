use crate::domain::{
    ContainerRuntime, EventSender, ExecOutput, RuntimeCommand, RuntimeEvent, ServiceId,
    StreamEvent,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Drives the `docker` (or compatible `podman`) CLI
#[derive(Debug, Clone)]
pub struct DockerAdapter {
    binary: String,
}

impl DockerAdapter {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn command(&self, command: RuntimeCommand, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(command.as_str()).args(args);
        cmd
    }
}

impl Default for DockerAdapter {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl ContainerRuntime for DockerAdapter {
    async fn exec(&self, command: RuntimeCommand, args: &[String]) -> Result<ExecOutput> {
        debug!("{} {} {}", self.binary, command, args.join(" "));

        let output = self
            .command(command, args)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("executando {} {command}", self.binary))?;

        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn exec_streamed(
        &self,
        service: ServiceId,
        command: RuntimeCommand,
        args: &[String],
        events: EventSender,
    ) -> Result<()> {
        debug!("{} {} {} (stream)", self.binary, command, args.join(" "));

        let mut child = self
            .command(command, args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("iniciando {} {command} para {service}", self.binary))?;

        let _ = events.send(RuntimeEvent::new(service, StreamEvent::Started));

        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(forward_lines(out, service, events.clone())));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(forward_lines(err, service, events.clone())));

        tokio::spawn(async move {
            let status = child.wait().await;

            for task in [stdout, stderr].into_iter().flatten() {
                let _ = task.await;
            }

            let kind = match status {
                Ok(status) => StreamEvent::Closed(status.code().unwrap_or(-1)),
                Err(e) => StreamEvent::Failed(e.to_string()),
            };
            let _ = events.send(RuntimeEvent::new(service, kind));
        });

        Ok(())
    }
}

/// Forwards each line as `Output`, replacing invalid UTF-8. The pipe is
/// drained to EOF even after the receiver goes away.
async fn forward_lines<R>(reader: R, service: ServiceId, events: EventSender)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut forwarding = true;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Falha lendo saída de {service}: {e}");
                break;
            }
        }
        if !forwarding {
            continue;
        }

        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        let line = String::from_utf8_lossy(&buf).into_owned();
        forwarding = events
            .send(RuntimeEvent::new(service, StreamEvent::Output(line)))
            .is_ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_binary_is_docker() {
        assert_eq!(DockerAdapter::default().binary(), "docker");
        assert_eq!(DockerAdapter::new("podman").binary(), "podman");
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let adapter = DockerAdapter::new("mockbox-binary-that-does-not-exist");
        let result = adapter
            .exec(RuntimeCommand::Inspect, &["microcks".to_string()])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_streamed_spawn_failure_sends_nothing() {
        let adapter = DockerAdapter::new("mockbox-binary-that-does-not-exist");
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let result = adapter
            .exec_streamed(ServiceId::App, RuntimeCommand::Run, &[], tx)
            .await;

        assert!(result.is_err());
        assert!(rx.recv().await.is_none());
    }

    #[cfg(unix)]
    fn script_binary(dir: &tempfile::TempDir, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("fake-docker");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    async fn collect_events(adapter: &DockerAdapter) -> Vec<StreamEvent> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        adapter
            .exec_streamed(ServiceId::Kafka, RuntimeCommand::Run, &[], tx)
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            assert_eq!(event.service, ServiceId::Kafka);
            events.push(event.kind);
        }
        events
    }

    #[cfg(unix)]
    fn output_lines(events: &[StreamEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Output(line) => Some(line.as_str()),
                _ => None,
            })
            .collect()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stream_survives_invalid_utf8_and_large_output() {
        let dir = tempfile::tempdir().unwrap();
        let binary = script_binary(
            &dir,
            r#"echo hello
printf '\377\376\n'
echo oops >&2
i=0
while [ $i -lt 4096 ]; do
  echo "filler line $i aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
  i=$((i+1))
done
echo bye
exit 0"#,
        );

        let events = collect_events(&DockerAdapter::new(binary)).await;

        assert_eq!(events.first(), Some(&StreamEvent::Started));
        assert_eq!(events.last(), Some(&StreamEvent::Closed(0)));
        let lines = output_lines(&events);
        assert!(lines.contains(&"hello"));
        assert!(lines.contains(&"\u{FFFD}\u{FFFD}"));
        assert!(lines.contains(&"oops"));
        assert!(lines.contains(&"bye"));
        assert_eq!(
            lines.iter().filter(|l| l.starts_with("filler line")).count(),
            4096
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stream_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let binary = script_binary(&dir, "printf 'no newline at end'\nexit 3");

        let events = collect_events(&DockerAdapter::new(binary)).await;

        assert_eq!(output_lines(&events), vec!["no newline at end"]);
        assert_eq!(events.last(), Some(&StreamEvent::Closed(3)));
    }
}
