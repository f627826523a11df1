use crate::domain::catalog::{EXTENSION_NETWORK, EXTENSION_VOLUME};
use crate::domain::{
    ExtensionConfig, MetricsSink, ServiceDefinition, ServiceId, ServiceStatus, StatusPatch,
};
use crate::error::{OrchestratorError, Prerequisite};
use crate::services::config_change::ConfigChange;
use crate::services::status_tracker::EventOutcome;
use crate::services::{ContainerService, LoadingIndicator, PrerequisiteProvisioner, StatusTracker};
use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// What `launch` does for one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchAction {
    /// Already running
    Keep,
    /// Absent: create-and-run
    Create,
    /// Published port differs from the configured one: remove, then create-and-run
    Recreate,
    /// Exists and stopped: plain start
    Start,
}

/// Decides the runtime operations bringing one service to its desired state.
///
/// Only the mapped host port is compared; an image change on an existing
/// container is not detected.
pub fn plan_action(
    definition: &ServiceDefinition,
    status: &ServiceStatus,
    config: &ExtensionConfig,
) -> LaunchAction {
    if status.is_running {
        return LaunchAction::Keep;
    }
    if !status.exists {
        return LaunchAction::Create;
    }

    match definition.config_sensitive_port(config.port_offset) {
        Some(desired) if status.mapped_port != Some(desired) => LaunchAction::Recreate,
        _ => LaunchAction::Start,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchReport {
    pub actions: Vec<(ServiceId, LaunchAction)>,
    pub failures: Vec<(ServiceId, String)>,
}

impl LaunchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn action_for(&self, id: ServiceId) -> Option<LaunchAction> {
        self.actions
            .iter()
            .find(|(service, _)| *service == id)
            .map(|(_, action)| *action)
    }

    pub fn failed(&self, id: ServiceId) -> bool {
        self.failures.iter().any(|(service, _)| *service == id)
    }

    fn record_failure(&mut self, id: ServiceId, error: impl ToString) {
        self.failures.push((id, error.to_string()));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChangeOutcome {
    pub recreated: bool,
    pub relaunch: Option<LaunchReport>,
}

/// Reconciles the managed services against the desired configuration
pub struct Orchestrator {
    container_service: Arc<ContainerService>,
    provisioner: PrerequisiteProvisioner,
    tracker: StatusTracker,
    loading: LoadingIndicator,
    metrics: Arc<dyn MetricsSink>,
    config: Arc<watch::Sender<ExtensionConfig>>,
    app_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(
        container_service: Arc<ContainerService>,
        provisioner: PrerequisiteProvisioner,
        metrics: Arc<dyn MetricsSink>,
        app_dir: PathBuf,
        config: ExtensionConfig,
    ) -> Self {
        let (config_tx, _rx) = watch::channel(config);
        Self {
            container_service,
            provisioner,
            tracker: StatusTracker::new(),
            loading: LoadingIndicator::new(),
            metrics,
            config: Arc::new(config_tx),
            app_dir,
        }
    }

    pub fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    pub fn loading(&self) -> &LoadingIndicator {
        &self.loading
    }

    /// Configuration in effect for the next launch.
    pub fn config(&self) -> ExtensionConfig {
        *self.config.borrow()
    }

    pub fn subscribe_config(&self) -> watch::Receiver<ExtensionConfig> {
        self.config.subscribe()
    }

    /// Services `launch` considers, in launch order.
    pub fn applicable_services(config: &ExtensionConfig) -> Vec<ServiceId> {
        ServiceId::ALL
            .into_iter()
            .filter(|id| config.async_enabled || !id.is_async())
            .collect()
    }

    /// Inspects every managed container and records what the runtime reports.
    ///
    /// Mapped ports are read against the configuration currently in effect.
    pub async fn refresh(&self) -> Result<()> {
        let port_offset = self.config().port_offset;
        for id in ServiceId::ALL {
            let status = self.container_service.inspect(id, port_offset).await?;
            debug!("{id}: {:?}", status);
            self.tracker.update(id, status.into());
        }
        Ok(())
    }

    pub async fn launch(&self, config: &ExtensionConfig) -> Result<LaunchReport> {
        config.validate()?;
        self.config.send_replace(*config);

        info!(" Iniciando Microcks...");
        self.metrics
            .send("microcks_extension_launched", &config.metric_attributes());
        self.loading.set(true);

        if !self.provisioner.ensure_network().await {
            error!(" Erro ao garantir a rede {EXTENSION_NETWORK}");
            self.loading.set(false);
            return Err(OrchestratorError::Prerequisite(Prerequisite::Network).into());
        }
        if !self.provisioner.ensure_volume().await {
            error!(" Erro ao garantir o volume {EXTENSION_VOLUME}");
            self.loading.set(false);
            return Err(OrchestratorError::Prerequisite(Prerequisite::Volume).into());
        }

        let (events, mut completions) = mpsc::unbounded_channel();
        let mut report = LaunchReport::default();
        let mut pending_ports: HashMap<ServiceId, Option<u16>> = HashMap::new();

        if !config.async_enabled {
            debug!("Async desabilitado, ignorando {:?}", ServiceId::ASYNC);
        }

        for id in Self::applicable_services(config) {
            let definition = id.definition();
            let status = self.tracker.get(id);
            let action = plan_action(definition, &status, config);
            report.actions.push((id, action));

            match action {
                LaunchAction::Keep => debug!("{id} já está rodando"),
                LaunchAction::Start => {
                    info!(" Iniciando {id}...");
                    match self.container_service.start(id).await {
                        Ok(()) => self.tracker.mark_started(id),
                        Err(e) => {
                            error!("  Falha ao iniciar {id}: {e:#}");
                            report.record_failure(id, e);
                        }
                    }
                }
                LaunchAction::Create | LaunchAction::Recreate => {
                    if action == LaunchAction::Recreate {
                        info!(
                            " Porta publicada de {id} mudou ({:?}), recriando...",
                            status.mapped_port
                        );
                        if let Err(e) = self.container_service.remove(&[id]).await {
                            error!("  Falha ao remover {id}: {e:#}");
                            report.record_failure(id, e);
                            continue;
                        }
                        self.tracker.mark_removed(id);
                    }

                    info!(" Criando {id}...");
                    let spec = definition.to_spec(config, &self.app_dir);
                    match self.container_service.run(id, &spec, events.clone()).await {
                        Ok(()) => {
                            pending_ports
                                .insert(id, definition.config_sensitive_port(config.port_offset));
                        }
                        Err(e) => {
                            error!("  Falha ao criar {id}: {e:#}");
                            self.loading.set(false);
                            report.record_failure(
                                id,
                                OrchestratorError::StreamFailed {
                                    service: id,
                                    message: format!("{e:#}"),
                                },
                            );
                        }
                    }
                }
            }
        }

        drop(events);
        while let Some(event) = completions.recv().await {
            let service = event.service;
            match self.tracker.apply_event(&event) {
                EventOutcome::Pending => {}
                EventOutcome::Succeeded => {
                    if let Some(port) = pending_ports.remove(&service) {
                        self.tracker
                            .update(service, StatusPatch::default().mapped_port(port));
                    }
                    info!(" {service} criado e rodando");
                }
                EventOutcome::Failed(message) => {
                    pending_ports.remove(&service);
                    self.loading.set(false);
                    report.record_failure(
                        service,
                        OrchestratorError::StreamFailed { service, message },
                    );
                }
            }
        }

        let primary_started = report
            .action_for(ServiceId::PRIMARY)
            .is_some_and(|action| action != LaunchAction::Keep)
            && !report.failed(ServiceId::PRIMARY);

        if primary_started {
            info!(" Microcks está iniciando...");
        } else {
            self.loading.set(false);
        }

        if !report.is_success() {
            self.loading.set(false);
            warn!(
                "  {} serviço(s) falharam; rode launch novamente para tentar de novo",
                report.failures.len()
            );
        }

        Ok(report)
    }

    /// Stops `services` with one batched command and marks them not running.
    pub async fn stop(&self, services: &[ServiceId]) -> Result<()> {
        self.issue_stop(services, true).await
    }

    /// Removes `services` with one batched command and marks them absent.
    pub async fn remove(&self, services: &[ServiceId]) -> Result<()> {
        if services.is_empty() {
            return Ok(());
        }

        info!(" Removendo {}...", names(services));
        self.container_service
            .remove(services)
            .await
            .inspect_err(|e| error!("  Falha ao remover {}: {e:#}", names(services)))?;

        for id in services {
            self.tracker.mark_removed(*id);
        }
        Ok(())
    }

    /// Stops the whole bundle: the sync trio, then the async pair when enabled.
    pub async fn stop_all(&self, config: &ExtensionConfig) -> Result<()> {
        info!(" Parando Microcks...");
        self.metrics
            .send("microcks_extension_stopped", &config.metric_attributes());
        self.loading.set(true);

        let sync_result = self.stop(&self.existing(&ServiceId::SYNC)).await;
        let async_result = if config.async_enabled {
            self.stop(&self.existing(&ServiceId::ASYNC)).await
        } else {
            Ok(())
        };

        self.loading.set(false);
        sync_result.and(async_result)
    }

    /// Stops whatever is running, then removes the bundle's containers.
    pub async fn delete_all(&self, config: &ExtensionConfig) -> Result<()> {
        info!(" Removendo Microcks...");

        let mut groups = vec![self.existing(&ServiceId::SYNC)];
        if config.async_enabled {
            groups.push(self.existing(&ServiceId::ASYNC));
        }

        let running: Vec<ServiceId> = groups
            .iter()
            .flatten()
            .copied()
            .filter(|id| self.tracker.get(*id).is_running)
            .collect();
        if !running.is_empty() {
            // Status is only updated by the removal below.
            if let Err(e) = self.issue_stop(&running, false).await {
                warn!("  Seguindo com a remoção mesmo assim: {e:#}");
            }
        }

        self.loading.set(true);
        let mut result = Ok(());
        for group in &groups {
            if let Err(e) = self.remove(group).await {
                result = Err(e);
            }
        }
        self.loading.set(false);

        result
    }

    /// Applies a settings submission.
    ///
    /// An existing primary service is always removed with its dependents; the
    /// bundle is relaunched with `new` only if the primary was running.
    pub async fn apply_config_change(
        &self,
        old: &ExtensionConfig,
        new: &ExtensionConfig,
    ) -> Result<ConfigChangeOutcome> {
        new.validate()?;

        let change = ConfigChange::new(*old, *new);
        let primary = self.tracker.get(ServiceId::PRIMARY);
        debug!("Campos alterados: {:?}", change.changed_fields());

        self.loading.set(true);
        let recreated = change.requires_recreation(&primary);
        if recreated {
            info!(" Configuração submetida, recriando containers...");
            if let Err(e) = self.delete_all(old).await {
                self.loading.set(false);
                return Err(e);
            }
        }

        self.config.send_replace(*new);

        let relaunch = if primary.is_running {
            Some(self.launch(new).await?)
        } else {
            self.loading.set(false);
            None
        };

        Ok(ConfigChangeOutcome {
            recreated,
            relaunch,
        })
    }

    async fn issue_stop(&self, services: &[ServiceId], track: bool) -> Result<()> {
        if services.is_empty() {
            return Ok(());
        }

        info!(" Parando {}...", names(services));
        self.container_service
            .stop(services)
            .await
            .inspect_err(|e| error!("  Falha ao parar {}: {e:#}", names(services)))?;

        if track {
            for id in services {
                self.tracker.mark_stopped(*id);
            }
        }
        Ok(())
    }

    fn existing(&self, services: &[ServiceId]) -> Vec<ServiceId> {
        services
            .iter()
            .copied()
            .filter(|id| self.tracker.get(*id).exists)
            .collect()
    }
}

fn names(services: &[ServiceId]) -> String {
    services
        .iter()
        .map(|id| id.container_name())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockRuntime, RecordingMetrics};

    fn create_test_orchestrator(config: ExtensionConfig) -> (Orchestrator, Arc<MockRuntime>) {
        let mock = Arc::new(MockRuntime::new());
        let container_service = Arc::new(ContainerService::new(mock.clone()));
        let provisioner = PrerequisiteProvisioner::new(mock.clone());
        let orchestrator = Orchestrator::new(
            container_service,
            provisioner,
            Arc::new(RecordingMetrics::new()),
            PathBuf::from("/home/dev/.microcks-docker-desktop-extension"),
            config,
        );
        (orchestrator, mock)
    }

    fn status(exists: bool, is_running: bool, mapped_port: Option<u16>) -> ServiceStatus {
        ServiceStatus {
            exists,
            is_running,
            mapped_port,
        }
    }

    #[test]
    fn test_plan_action_policy() {
        let config = ExtensionConfig::default();
        let app = ServiceId::App.definition();

        assert_eq!(
            plan_action(app, &status(true, true, Some(9999)), &config),
            LaunchAction::Keep
        );
        assert_eq!(
            plan_action(app, &ServiceStatus::absent(), &config),
            LaunchAction::Create
        );
        assert_eq!(
            plan_action(app, &status(true, false, Some(8080)), &config),
            LaunchAction::Start
        );
        assert_eq!(
            plan_action(app, &status(true, false, Some(8081)), &config),
            LaunchAction::Recreate
        );
    }

    #[test]
    fn test_plan_action_ignores_ports_for_unpublished_services() {
        let config = ExtensionConfig {
            async_enabled: false,
            port_offset: 7,
        };
        assert_eq!(
            plan_action(
                ServiceId::Mongo.definition(),
                &status(true, false, None),
                &config
            ),
            LaunchAction::Start
        );
    }

    #[test]
    fn test_applicable_services_respect_async_flag() {
        let sync_only = Orchestrator::applicable_services(&ExtensionConfig::default());
        assert_eq!(sync_only, ServiceId::SYNC.to_vec());

        let all = Orchestrator::applicable_services(&ExtensionConfig {
            async_enabled: true,
            port_offset: 0,
        });
        assert_eq!(all, ServiceId::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_launch_records_mapped_port_of_created_service() {
        let config = ExtensionConfig {
            async_enabled: false,
            port_offset: 2,
        };
        let (orchestrator, _mock) = create_test_orchestrator(config);

        let report = orchestrator.launch(&config).await.unwrap();

        assert!(report.is_success());
        let app = orchestrator.tracker().get(ServiceId::App);
        assert!(app.is_running);
        assert_eq!(app.mapped_port, Some(8082));
    }

    #[tokio::test]
    async fn test_start_failure_leaves_status_untouched() {
        let config = ExtensionConfig::default();
        let (orchestrator, mock) = create_test_orchestrator(config);
        mock.add_container("microcks-postman", false, &[]);
        mock.set_fail_on("start");
        orchestrator.refresh().await.unwrap();

        let report = orchestrator.launch(&config).await.unwrap();

        assert!(report.failed(ServiceId::Postman));
        assert!(!orchestrator.tracker().get(ServiceId::Postman).is_running);
        assert!(!orchestrator.loading().is_loading());
    }

    #[tokio::test]
    async fn test_stop_failure_keeps_running_status() {
        let config = ExtensionConfig::default();
        let (orchestrator, mock) = create_test_orchestrator(config);
        mock.add_container("microcks", true, &[8080]);
        orchestrator.refresh().await.unwrap();
        mock.set_fail_on("stop");

        let result = orchestrator.stop(&[ServiceId::App]).await;

        assert!(result.is_err());
        assert!(orchestrator.tracker().get(ServiceId::App).is_running);
    }

    #[tokio::test]
    async fn test_remove_marks_absent() {
        let config = ExtensionConfig::default();
        let (orchestrator, mock) = create_test_orchestrator(config);
        mock.add_container("microcks-mongodb", false, &[]);
        mock.add_container("microcks-postman", false, &[]);
        orchestrator.refresh().await.unwrap();

        orchestrator
            .remove(&[ServiceId::Mongo, ServiceId::Postman])
            .await
            .unwrap();

        assert_eq!(
            mock.commands_with_prefix("rm:"),
            vec!["rm:microcks-mongodb,microcks-postman".to_string()]
        );
        assert!(!orchestrator.tracker().get(ServiceId::Mongo).exists);
        assert!(!orchestrator.tracker().get(ServiceId::Postman).exists);
    }

    #[tokio::test]
    async fn test_stop_with_empty_list() {
        let (orchestrator, mock) = create_test_orchestrator(ExtensionConfig::default());

        orchestrator.stop(&[]).await.unwrap();
        orchestrator.remove(&[]).await.unwrap();

        assert!(mock.get_commands().is_empty());
    }

    #[tokio::test]
    async fn test_delete_all_stops_running_containers_first() {
        let config = ExtensionConfig::default();
        let (orchestrator, mock) = create_test_orchestrator(config);
        mock.add_container("microcks", true, &[8080, 9090]);
        mock.add_container("microcks-mongodb", true, &[]);
        mock.add_container("microcks-postman", false, &[]);
        orchestrator.refresh().await.unwrap();

        orchestrator.delete_all(&config).await.unwrap();

        let commands = mock.get_commands();
        let stop = commands
            .iter()
            .position(|c| c == "stop:microcks-mongodb,microcks")
            .unwrap();
        let rm = commands
            .iter()
            .position(|c| c == "rm:microcks-mongodb,microcks-postman,microcks")
            .unwrap();
        assert!(stop < rm);
        for id in ServiceId::SYNC {
            assert_eq!(orchestrator.tracker().get(id), ServiceStatus::absent());
        }
    }
}
