use std::fmt;

/// Last known state of one managed container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStatus {
    pub exists: bool,
    pub is_running: bool,
    pub mapped_port: Option<u16>,
}

impl ServiceStatus {
    pub fn absent() -> Self {
        Self::default()
    }

    /// Merges a partial update, keeping `is_running ⇒ exists`.
    pub fn merge(&mut self, patch: StatusPatch) {
        if let Some(exists) = patch.exists {
            self.exists = exists;
        }
        if let Some(running) = patch.is_running {
            self.is_running = running;
        }
        if let Some(port) = patch.mapped_port {
            self.mapped_port = port;
        }

        if self.is_running {
            self.exists = true;
        }
        if !self.exists {
            self.is_running = false;
            self.mapped_port = None;
        }
    }
}

/// Partial update of a [`ServiceStatus`]; `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusPatch {
    pub exists: Option<bool>,
    pub is_running: Option<bool>,
    pub mapped_port: Option<Option<u16>>,
}

impl StatusPatch {
    pub fn exists(mut self, exists: bool) -> Self {
        self.exists = Some(exists);
        self
    }

    pub fn running(mut self, running: bool) -> Self {
        self.is_running = Some(running);
        self
    }

    pub fn mapped_port(mut self, port: Option<u16>) -> Self {
        self.mapped_port = Some(port);
        self
    }
}

impl From<ServiceStatus> for StatusPatch {
    fn from(status: ServiceStatus) -> Self {
        StatusPatch::default()
            .exists(status.exists)
            .running(status.is_running)
            .mapped_port(status.mapped_port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateStatus {
    Initializing,
    Running,
    NotRunning,
}

impl fmt::Display for AggregateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initializing => write!(f, "INITIALIZING"),
            Self::Running => write!(f, "RUNNING"),
            Self::NotRunning => write!(f, "NOT_RUNNING"),
        }
    }
}

/// User-facing system state derived from the primary service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthState {
    pub status: AggregateStatus,
    pub is_ready: Option<bool>,
}

impl HealthState {
    pub fn initializing() -> Self {
        Self {
            status: AggregateStatus::Initializing,
            is_ready: None,
        }
    }

    pub fn resolved(ready: bool) -> Self {
        Self {
            status: if ready {
                AggregateStatus::Running
            } else {
                AggregateStatus::NotRunning
            },
            is_ready: Some(ready),
        }
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::initializing()
    }
}
