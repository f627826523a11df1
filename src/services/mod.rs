mod config_change;
mod container_service;
mod health_monitor;
mod loading;
mod orchestrator;
mod prerequisites;
mod status_tracker;

pub use config_change::ConfigChange;
pub use container_service::ContainerService;
pub use health_monitor::{HealthMonitor, MonitorHandle};
pub use loading::LoadingIndicator;
pub use orchestrator::{ConfigChangeOutcome, LaunchAction, LaunchReport, Orchestrator, plan_action};
pub use prerequisites::PrerequisiteProvisioner;
pub use status_tracker::{EventOutcome, StatusBoard, StatusTracker};
