use crate::domain::ServiceId;
use crate::error::OrchestratorError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Highest base port shifted by the offset (the Kafka external listener).
const HIGHEST_OFFSET_BASE: u16 = 9092;

/// User-tunable part of the bundle configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionConfig {
    pub async_enabled: bool,
    pub port_offset: u16,
}

impl ExtensionConfig {
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if HIGHEST_OFFSET_BASE.checked_add(self.port_offset).is_none() {
            return Err(OrchestratorError::InvalidConfig(format!(
                "port_offset {} excede o maior valor permitido ({})",
                self.port_offset,
                u16::MAX - HIGHEST_OFFSET_BASE
            )));
        }

        // A shifted port may land on a fixed one (e.g. 9092+10000 on 19092).
        let mut claimed: HashMap<u16, ServiceId> = HashMap::new();
        for id in ServiceId::ALL {
            for port in id.definition().host_ports(self.port_offset) {
                if let Some(owner) = claimed.insert(port, id) {
                    return Err(OrchestratorError::InvalidConfig(format!(
                        "port_offset {} faz {owner} e {id} disputarem a porta {port}",
                        self.port_offset
                    )));
                }
            }
        }

        Ok(())
    }

    /// Host port of the primary service API.
    pub fn api_port(&self) -> u16 {
        8080u16.saturating_add(self.port_offset)
    }

    pub fn health_url(&self) -> String {
        format!("http://localhost:{}/api/health", self.api_port())
    }

    /// Attributes sent along with lifecycle metric events.
    pub fn metric_attributes(&self) -> Vec<(&'static str, String)> {
        vec![
            ("asyncEnabled", self.async_enabled.to_string()),
            ("portOffset", self.port_offset.to_string()),
        ]
    }
}
