use crate::domain::{
    AggregateStatus, ContainerRuntime, ExtensionConfig, HealthProbe, HealthState, MetricsSink,
    ServiceId, Workspace,
};
use crate::infra::config::{AppConfig, HealthConfig, load_app_config, parse_duration, save_extension_config};
use crate::infra::{DockerAdapter, HttpHealthProbe, LocalWorkspace, TracingMetrics};
use crate::services::{
    ConfigChangeOutcome, ContainerService, HealthMonitor, LaunchAction, LaunchReport, Orchestrator,
    PrerequisiteProvisioner,
};
use anyhow::{Context, Result, bail};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Subcommand)]
pub enum RuntimeAction {
    /// Sobe o Microcks (e os serviços async, se habilitados)
    Launch {
        /// Aguarda o Microcks responder no health check
        #[arg(long)]
        wait: bool,
    },
    /// Para todos os containers do Microcks
    Stop,
    /// Para e remove os containers do Microcks
    Delete,
    /// Mostra status geral
    Status {
        /// Mostra apenas um serviço (ex: app, db, kafka)
        service: Option<String>,
    },
    /// Altera as configurações da extensão e recria os containers
    Settings {
        /// Habilita Kafka e o async-minion
        #[arg(long)]
        async_enabled: Option<bool>,
        /// Deslocamento aplicado às portas publicadas
        #[arg(long)]
        port_offset: Option<u16>,
    },
    /// Aguarda o Microcks ficar pronto
    Wait {
        /// Tempo máximo de espera (ex: 30s, 3m)
        #[arg(long)]
        timeout: Option<String>,
    },
}

/// One opened session against the container runtime.
pub struct Runtime {
    config_dir: PathBuf,
    health: HealthConfig,
    workspace: Arc<dyn Workspace>,
    probe: Arc<dyn HealthProbe>,
    orchestrator: Orchestrator,
}

impl Runtime {
    pub async fn open(config_dir: &Path) -> Result<Self> {
        let app_config = load_app_config(config_dir)?;
        let app_dir = app_config.runtime.resolved_app_dir()?;

        let runtime = Arc::new(DockerAdapter::new(app_config.runtime.binary.clone()));
        let probe = Arc::new(HttpHealthProbe::new(app_config.health.timeout()?)?);
        let workspace = Arc::new(LocalWorkspace::new(app_dir));

        Self::with_components(
            config_dir,
            app_config,
            runtime,
            probe,
            Arc::new(TracingMetrics),
            workspace,
        )
        .await
    }

    /// Passes the file-system gate, then seeds the status of every service.
    pub async fn with_components(
        config_dir: &Path,
        app_config: AppConfig,
        runtime: Arc<dyn ContainerRuntime>,
        probe: Arc<dyn HealthProbe>,
        metrics: Arc<dyn MetricsSink>,
        workspace: Arc<dyn Workspace>,
    ) -> Result<Self> {
        let app_dir = workspace
            .initialize()
            .context("Não foi possível preparar o diretório da extensão")?;
        metrics.send("microcks_extension_opened", &[]);

        let container_service = Arc::new(ContainerService::new(runtime.clone()));
        let provisioner = PrerequisiteProvisioner::new(runtime);
        let orchestrator = Orchestrator::new(
            container_service,
            provisioner,
            metrics,
            app_dir,
            app_config.extension,
        );
        orchestrator.refresh().await?;

        Ok(Self {
            config_dir: config_dir.to_path_buf(),
            health: app_config.health,
            workspace,
            probe,
            orchestrator,
        })
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn config(&self) -> ExtensionConfig {
        self.orchestrator.config()
    }

    pub async fn launch(&self) -> Result<LaunchReport> {
        let config = self.config();
        let report = self.orchestrator.launch(&config).await?;

        for (id, action) in &report.actions {
            let verb = match action {
                LaunchAction::Keep => "já rodando",
                LaunchAction::Create => "criado",
                LaunchAction::Recreate => "recriado",
                LaunchAction::Start => "iniciado",
            };
            if !report.failed(*id) {
                println!("- {:<24} | {}", id.container_name(), verb);
            }
        }
        for (id, error) in &report.failures {
            println!("- {:<24} | falhou: {}", id.container_name(), error);
        }

        Ok(report)
    }

    pub async fn stop(&self) -> Result<()> {
        self.orchestrator.stop_all(&self.config()).await
    }

    pub async fn delete(&self) -> Result<()> {
        self.orchestrator.delete_all(&self.config()).await
    }

    /// Persists the new settings, rewrites the property files and recreates the bundle.
    pub async fn settings(
        &self,
        async_enabled: Option<bool>,
        port_offset: Option<u16>,
    ) -> Result<ConfigChangeOutcome> {
        let old = self.config();
        let new = ExtensionConfig {
            async_enabled: async_enabled.unwrap_or(old.async_enabled),
            port_offset: port_offset.unwrap_or(old.port_offset),
        };
        new.validate()?;

        save_extension_config(&self.config_dir, &new)?;
        self.workspace.write_properties(&new)?;

        let outcome = self.orchestrator.apply_config_change(&old, &new).await?;
        if outcome.recreated && outcome.relaunch.is_none() {
            info!(" Containers removidos; rode 'mockbox launch' para subir com a nova configuração");
        }
        Ok(outcome)
    }

    /// Follows the primary service until its readiness is known.
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<HealthState> {
        let timeout = match timeout {
            Some(timeout) => timeout,
            None => self.health.wait_timeout()?,
        };

        let monitor = HealthMonitor::new(
            self.orchestrator.tracker(),
            self.probe.clone(),
            self.orchestrator.loading().clone(),
            self.orchestrator.subscribe_config(),
            self.health.interval()?,
        );
        let handle = monitor.spawn();

        info!(
            " Aguardando {} (timeout {:?})",
            self.config().health_url(),
            timeout
        );
        handle.wait_until_resolved(timeout).await
    }

    /// One-shot aggregate status: a single probe instead of a poll loop.
    pub async fn aggregate_status(&self) -> AggregateStatus {
        if !self.orchestrator.tracker().get(ServiceId::PRIMARY).is_running {
            return AggregateStatus::NotRunning;
        }

        match self.probe.check(&self.config()).await {
            Ok(true) => AggregateStatus::Running,
            Ok(false) => AggregateStatus::Initializing,
            Err(e) => {
                warn!("  Health check falhou: {e:#}");
                AggregateStatus::Initializing
            }
        }
    }

    pub async fn status(&self, service: Option<&str>) -> Result<()> {
        let services = match service {
            Some(name) => vec![name.parse::<ServiceId>()?],
            None => ServiceId::ALL.to_vec(),
        };
        let config = self.config();

        println!(" Status dos containers:");
        let mut missing = false;
        for id in services {
            let status = self.orchestrator.tracker().get(id);
            let state = if status.is_running {
                "rodando"
            } else if status.exists {
                "parado"
            } else {
                missing = true;
                "não criado"
            };
            let port = status
                .mapped_port
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string());
            let scope = if id.is_async() && !config.async_enabled {
                " (async desabilitado)"
            } else {
                ""
            };

            println!(
                "- {:<24} | {:<10} | porta {}{}",
                id.container_name(),
                state,
                port,
                scope
            );
        }

        println!(" Microcks: {}", self.aggregate_status().await);
        if missing {
            println!("  Há containers ausentes. Rode 'mockbox launch'.");
        }

        Ok(())
    }
}

pub async fn run(action: RuntimeAction, config_dir: &Path) -> Result<()> {
    let runtime = Runtime::open(config_dir).await?;

    match action {
        RuntimeAction::Launch { wait } => {
            let report = runtime.launch().await?;
            if !report.is_success() {
                bail!("{} serviço(s) falharam ao subir", report.failures.len());
            }
            if wait {
                report_readiness(runtime.wait(None).await?)?;
            }
            Ok(())
        }
        RuntimeAction::Stop => runtime.stop().await,
        RuntimeAction::Delete => runtime.delete().await,
        RuntimeAction::Status { service } => runtime.status(service.as_deref()).await,
        RuntimeAction::Settings {
            async_enabled,
            port_offset,
        } => {
            let outcome = runtime.settings(async_enabled, port_offset).await?;
            if let Some(report) = outcome.relaunch.filter(|r| !r.is_success()) {
                bail!("{} serviço(s) falharam ao subir", report.failures.len());
            }
            Ok(())
        }
        RuntimeAction::Wait { timeout } => {
            let timeout = timeout.as_deref().map(parse_duration).transpose()?;
            report_readiness(runtime.wait(timeout).await?)
        }
    }
}

fn report_readiness(state: HealthState) -> Result<()> {
    match state.status {
        AggregateStatus::Running => {
            println!(" Microcks pronto");
            Ok(())
        }
        other => bail!("Microcks não está pronto ({other})"),
    }
}
