use crate::domain::{ExtensionConfig, ServiceStatus};

/// A settings submission: the configuration in effect and the one requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigChange {
    pub old: ExtensionConfig,
    pub new: ExtensionConfig,
}

impl ConfigChange {
    pub fn new(old: ExtensionConfig, new: ExtensionConfig) -> Self {
        Self { old, new }
    }

    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.old.async_enabled != self.new.async_enabled {
            fields.push("async_enabled");
        }
        if self.old.port_offset != self.new.port_offset {
            fields.push("port_offset");
        }
        fields
    }

    /// Any submission recreates the primary service (and its dependents) if it exists,
    /// even when no field changed.
    pub fn requires_recreation(&self, primary: &ServiceStatus) -> bool {
        primary.exists
    }
}
