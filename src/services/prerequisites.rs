use crate::domain::catalog::{EXTENSION_NETWORK, EXTENSION_VOLUME};
use crate::domain::{ContainerRuntime, RuntimeCommand};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Create-if-absent for the shared network and volume
pub struct PrerequisiteProvisioner {
    runtime: Arc<dyn ContainerRuntime>,
}

impl PrerequisiteProvisioner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// `true` iff the network exists once this returns.
    pub async fn ensure_network(&self) -> bool {
        self.ensure(RuntimeCommand::Network, EXTENSION_NETWORK).await
    }

    /// `true` iff the volume exists once this returns.
    pub async fn ensure_volume(&self) -> bool {
        self.ensure(RuntimeCommand::Volume, EXTENSION_VOLUME).await
    }

    async fn ensure(&self, kind: RuntimeCommand, name: &str) -> bool {
        match self.try_ensure(kind, name).await {
            Ok(exists) => exists,
            Err(e) => {
                error!(" Erro ao garantir {kind} {name}: {e:#}");
                false
            }
        }
    }

    async fn try_ensure(&self, kind: RuntimeCommand, name: &str) -> Result<bool> {
        let inspect = self
            .runtime
            .exec(kind, &["inspect".to_string(), name.to_string()])
            .await?;
        if inspect.success() {
            debug!("{kind} {name} já existe");
            return Ok(true);
        }

        info!(" Criando {kind} {name}...");
        let create = self
            .runtime
            .exec(kind, &["create".to_string(), name.to_string()])
            .await?;
        if !create.success() {
            warn!(
                "  Não foi possível criar {kind} {name}: {}",
                create.stderr.trim()
            );
        }

        Ok(create.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockRuntime;

    #[tokio::test]
    async fn test_creates_missing_network_once() {
        let mock = Arc::new(MockRuntime::new());
        let provisioner = PrerequisiteProvisioner::new(mock.clone());

        assert!(provisioner.ensure_network().await);
        assert!(mock.has_network(EXTENSION_NETWORK));

        let creates = mock.commands_with_prefix("network_create:");
        assert_eq!(creates.len(), 1);
    }

    #[tokio::test]
    async fn test_existing_volume_is_not_recreated() {
        let mock = Arc::new(MockRuntime::new());
        mock.add_volume(EXTENSION_VOLUME);
        let provisioner = PrerequisiteProvisioner::new(mock.clone());

        assert!(provisioner.ensure_volume().await);
        assert!(mock.commands_with_prefix("volume_create:").is_empty());
    }

    #[tokio::test]
    async fn test_failed_creation_reports_false() {
        let mock = Arc::new(MockRuntime::new());
        mock.set_fail_on("network_create");
        let provisioner = PrerequisiteProvisioner::new(mock.clone());

        assert!(!provisioner.ensure_network().await);
        assert!(!mock.has_network(EXTENSION_NETWORK));
    }

    #[tokio::test]
    async fn test_runtime_unavailable_reports_false() {
        let mock = Arc::new(MockRuntime::new());
        mock.set_fail_on("volume");
        let provisioner = PrerequisiteProvisioner::new(mock.clone());

        assert!(!provisioner.ensure_volume().await);
    }
}
