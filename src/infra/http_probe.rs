use crate::domain::{ExtensionConfig, HealthProbe};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Probes `http://localhost:{8080+offset}/api/health`
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("criando cliente HTTP do healthcheck")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self, config: &ExtensionConfig) -> Result<bool> {
        let url = config.health_url();
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("consultando {url}"))?;

        Ok(response.status() == reqwest::StatusCode::OK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let probe = HttpHealthProbe::new(Duration::from_millis(200)).unwrap();
        // Resolves to port 65535, where nothing listens.
        let config = ExtensionConfig {
            async_enabled: false,
            port_offset: u16::MAX - 8080,
        };
        assert!(probe.check(&config).await.is_err());
    }
}
