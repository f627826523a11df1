use crate::domain::{ExtensionConfig, HealthProbe, HealthState, ServiceId, ServiceStatus};
use crate::services::status_tracker::StatusBoard;
use crate::services::{LoadingIndicator, StatusTracker};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// A running readiness poll. Dropping it cancels the task.
struct Poller {
    generation: u64,
    task: JoinHandle<()>,
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Derives the aggregate status from the primary service and polls its
/// health endpoint until it answers.
pub struct HealthMonitor {
    statuses: watch::Receiver<StatusBoard>,
    probe: Arc<dyn HealthProbe>,
    loading: LoadingIndicator,
    config: watch::Receiver<ExtensionConfig>,
    interval: Duration,
    state: watch::Sender<HealthState>,
    poller: Option<Poller>,
    generation: u64,
    ready_tx: mpsc::UnboundedSender<u64>,
    ready_rx: mpsc::UnboundedReceiver<u64>,
}

impl HealthMonitor {
    pub fn new(
        tracker: &StatusTracker,
        probe: Arc<dyn HealthProbe>,
        loading: LoadingIndicator,
        config: watch::Receiver<ExtensionConfig>,
        interval: Duration,
    ) -> Self {
        let (state, _rx) = watch::channel(HealthState::initializing());
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        Self {
            statuses: tracker.subscribe(),
            probe,
            loading,
            config,
            interval,
            state,
            poller: None,
            generation: 0,
            ready_tx,
            ready_rx,
        }
    }

    pub fn state(&self) -> HealthState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<HealthState> {
        self.state.subscribe()
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_some()
    }

    /// Reacts to the latest primary status; `None` means not observed yet.
    pub fn observe(&mut self, primary: Option<ServiceStatus>) {
        let Some(primary) = primary else {
            self.cancel_polling();
            self.publish(HealthState::initializing());
            return;
        };

        if !primary.is_running {
            self.resolve(false);
            return;
        }

        // Stays NotRunning (or Initializing on first sight) until the probe answers.
        if self.state().is_ready != Some(true) && self.poller.is_none() {
            self.start_polling();
        }
    }

    /// Follows the status tracker until it goes away.
    pub async fn run(mut self) {
        let primary = self.statuses.borrow_and_update().observed(ServiceId::PRIMARY);
        self.observe(primary);

        loop {
            tokio::select! {
                changed = self.statuses.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let primary = self.statuses.borrow_and_update().observed(ServiceId::PRIMARY);
                    self.observe(primary);
                }
                Some(generation) = self.ready_rx.recv() => self.on_ready(generation),
            }
        }

        self.cancel_polling();
    }

    pub fn spawn(self) -> MonitorHandle {
        let state = self.subscribe();
        MonitorHandle {
            state,
            task: tokio::spawn(self.run()),
        }
    }

    fn start_polling(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        let probe = self.probe.clone();
        let config = self.config.clone();
        let ready = self.ready_tx.clone();
        let period = self.interval;

        info!(" Aguardando Microcks ficar pronto...");
        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let current = *config.borrow();
                match probe.check(&current).await {
                    Ok(true) => {
                        let _ = ready.send(generation);
                        break;
                    }
                    Ok(false) => debug!("Health check ainda não respondeu 200"),
                    Err(e) => debug!("Health check falhou: {e:#}"),
                }
            }
        });

        // Replacing an old poller aborts it.
        self.poller = Some(Poller { generation, task });
    }

    fn cancel_polling(&mut self) {
        if let Some(poller) = self.poller.take() {
            debug!("Cancelando health check #{}", poller.generation);
        }
    }

    fn resolve(&mut self, ready: bool) {
        self.cancel_polling();
        self.publish(HealthState::resolved(ready));
        if ready {
            self.loading.set(false);
            info!(" Microcks está pronto");
        }
    }

    fn on_ready(&mut self, generation: u64) {
        if self
            .poller
            .as_ref()
            .is_some_and(|poller| poller.generation == generation)
        {
            self.resolve(true);
        } else {
            debug!("Ignorando resultado antigo do health check #{generation}");
        }
    }

    fn publish(&self, next: HealthState) {
        self.state.send_if_modified(|current| {
            let changed = *current != next;
            *current = next;
            changed
        });
    }
}

/// Handle to a spawned [`HealthMonitor`]; dropping it stops the monitor.
pub struct MonitorHandle {
    state: watch::Receiver<HealthState>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn state(&self) -> HealthState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<HealthState> {
        self.state.clone()
    }

    /// Waits until readiness is known, either way.
    pub async fn wait_until_resolved(&self, timeout: Duration) -> Result<HealthState> {
        let mut state = self.state.clone();
        let resolved = time::timeout(timeout, state.wait_for(|s| s.is_ready.is_some()))
            .await
            .context("Tempo esgotado aguardando o Microcks")?
            .context("Monitor de saúde encerrado")?;
        Ok(*resolved)
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AggregateStatus;
    use crate::test_support::ScriptedProbe;

    fn running_primary() -> ServiceStatus {
        ServiceStatus {
            exists: true,
            is_running: true,
            mapped_port: Some(8080),
        }
    }

    fn create_monitor(probe: Arc<ScriptedProbe>) -> (HealthMonitor, StatusTracker, LoadingIndicator) {
        let tracker = StatusTracker::new();
        let loading = LoadingIndicator::new();
        let (_config_tx, config_rx) = watch::channel(ExtensionConfig::default());
        let monitor = HealthMonitor::new(
            &tracker,
            probe,
            loading.clone(),
            config_rx,
            Duration::from_secs(1),
        );
        (monitor, tracker, loading)
    }

    #[tokio::test]
    async fn test_initializing_until_primary_observed() {
        let probe = Arc::new(ScriptedProbe::new(vec![]));
        let (mut monitor, _tracker, _loading) = create_monitor(probe.clone());

        monitor.observe(None);

        assert_eq!(monitor.state(), HealthState::initializing());
        assert!(!monitor.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_running_primary_resolves_without_polling() {
        let probe = Arc::new(ScriptedProbe::new(vec![]));
        let (mut monitor, _tracker, _loading) = create_monitor(probe.clone());

        monitor.observe(Some(ServiceStatus {
            exists: true,
            is_running: false,
            mapped_port: Some(8080),
        }));

        assert_eq!(monitor.state().status, AggregateStatus::NotRunning);
        assert_eq!(monitor.state().is_ready, Some(false));
        assert!(!monitor.is_polling());

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_healthy() {
        let probe = Arc::new(ScriptedProbe::new(vec![false, false, false, true]));
        let (monitor, tracker, loading) = create_monitor(probe.clone());
        loading.set(true);
        let handle = monitor.spawn();

        tracker.mark_started(ServiceId::App);
        let state = handle
            .wait_until_resolved(Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(state.status, AggregateStatus::Running);
        assert_eq!(state.is_ready, Some(true));
        assert_eq!(probe.calls(), 4);
        assert!(!loading.is_loading());

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(probe.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_errors_are_retried() {
        let probe = Arc::new(ScriptedProbe::with_errors(2, vec![true]));
        let (monitor, tracker, _loading) = create_monitor(probe.clone());
        let handle = monitor.spawn();

        tracker.update(ServiceId::App, running_primary().into());
        let state = handle
            .wait_until_resolved(Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(state.status, AggregateStatus::Running);
        assert_eq!(probe.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopping_primary_cancels_poll() {
        let probe = Arc::new(ScriptedProbe::new(vec![]));
        let (mut monitor, _tracker, _loading) = create_monitor(probe.clone());

        monitor.observe(Some(running_primary()));
        assert!(monitor.is_polling());
        assert_eq!(monitor.state().status, AggregateStatus::Initializing);

        time::sleep(Duration::from_millis(2500)).await;
        monitor.observe(Some(ServiceStatus {
            exists: true,
            is_running: false,
            mapped_port: Some(8080),
        }));
        let calls = probe.calls();

        assert!(!monitor.is_polling());
        assert_eq!(monitor.state().status, AggregateStatus::NotRunning);

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(probe.calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_poll_loop() {
        let probe = Arc::new(ScriptedProbe::new(vec![]));
        let (mut monitor, _tracker, _loading) = create_monitor(probe.clone());

        monitor.observe(Some(running_primary()));
        monitor.observe(Some(running_primary()));
        monitor.observe(Some(running_primary()));

        time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(probe.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_not_running_polls_again() {
        let probe = Arc::new(ScriptedProbe::new(vec![true]));
        let (monitor, tracker, _loading) = create_monitor(probe.clone());
        let handle = monitor.spawn();

        tracker.update(ServiceId::App, ServiceStatus::absent().into());
        let state = handle
            .wait_until_resolved(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(state.status, AggregateStatus::NotRunning);

        let mut states = handle.subscribe();
        tracker.mark_started(ServiceId::App);
        tokio::task::yield_now().await;
        assert_eq!(handle.state().status, AggregateStatus::NotRunning);
        let state = time::timeout(
            Duration::from_secs(30),
            states.wait_for(|s| s.status == AggregateStatus::Running),
        )
        .await
        .unwrap()
        .map(|s| *s)
        .unwrap();

        assert_eq!(state.is_ready, Some(true));
        assert_eq!(probe.calls(), 1);
    }
}
