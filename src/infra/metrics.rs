use crate::domain::MetricsSink;
use tracing::info;

/// Emits usage events as structured log lines under the `mockbox::metrics` target.
#[derive(Debug, Clone, Default)]
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn send(&self, event: &str, attributes: &[(&'static str, String)]) {
        let attributes = attributes
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(" ");
        info!(target: "mockbox::metrics", event, attributes = %attributes);
    }
}
