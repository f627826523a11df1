use crate::error::OrchestratorError;
use std::fmt;
use std::str::FromStr;

/// Shared network every managed container joins
pub const EXTENSION_NETWORK: &str = "microcks-network";

/// Shared named volume holding the MongoDB data directory
pub const EXTENSION_VOLUME: &str = "microcks-data";

/// Ownership label attached to every container this tool creates
pub const OWNERSHIP_LABEL: &str =
    "com.docker.compose.project=microcks_microcks-docker-desktop-extension-desktop-extension";

/// Identity of one of the five managed services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceId {
    Mongo,
    Postman,
    App,
    Kafka,
    AsyncMinion,
}

impl ServiceId {
    /// All services, in launch order.
    pub const ALL: [ServiceId; 5] = [
        ServiceId::Mongo,
        ServiceId::Postman,
        ServiceId::App,
        ServiceId::Kafka,
        ServiceId::AsyncMinion,
    ];

    /// Services that are always part of the bundle.
    pub const SYNC: [ServiceId; 3] = [ServiceId::Mongo, ServiceId::Postman, ServiceId::App];

    /// Services only provisioned when async testing is enabled.
    pub const ASYNC: [ServiceId; 2] = [ServiceId::Kafka, ServiceId::AsyncMinion];

    /// The service whose readiness gates the aggregate status.
    pub const PRIMARY: ServiceId = ServiceId::App;

    pub fn container_name(self) -> &'static str {
        match self {
            ServiceId::App => "microcks",
            ServiceId::Postman => "microcks-postman",
            ServiceId::Mongo => "microcks-mongodb",
            ServiceId::Kafka => "microcks-kafka",
            ServiceId::AsyncMinion => "microcks-async-minion",
        }
    }

    pub fn definition(self) -> &'static ServiceDefinition {
        let index = match self {
            ServiceId::Mongo => 0,
            ServiceId::Postman => 1,
            ServiceId::App => 2,
            ServiceId::Kafka => 3,
            ServiceId::AsyncMinion => 4,
        };
        &CATALOG[index]
    }

    pub fn is_async(self) -> bool {
        self.definition().requires_async
    }

    pub fn from_container_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|id| id.container_name() == name)
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.container_name())
    }
}

impl FromStr for ServiceId {
    type Err = OrchestratorError;

    /// Accepts container names as well as short aliases (`app`, `db`, `broker`...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(id) = Self::from_container_name(s) {
            return Ok(id);
        }

        match s.trim().to_ascii_lowercase().as_str() {
            "app" | "primary" => Ok(ServiceId::App),
            "postman" | "test-runner" => Ok(ServiceId::Postman),
            "mongo" | "mongodb" | "db" => Ok(ServiceId::Mongo),
            "kafka" | "broker" | "redpanda" => Ok(ServiceId::Kafka),
            "minion" | "async-minion" | "worker" => Ok(ServiceId::AsyncMinion),
            _ => Err(OrchestratorError::UnknownService(s.to_string())),
        }
    }
}

/// A port number, either fixed or shifted by the user-configured offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortExpr {
    Fixed(u16),
    Offset(u16),
}

impl PortExpr {
    pub fn resolve(self, port_offset: u16) -> u16 {
        match self {
            PortExpr::Fixed(port) => port,
            PortExpr::Offset(base) => base.saturating_add(port_offset),
        }
    }

    pub fn is_offset(self) -> bool {
        matches!(self, PortExpr::Offset(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortBinding {
    pub host: PortExpr,
    pub container: PortExpr,
}

impl PortBinding {
    /// Renders the binding as `host:container` for `-p`.
    pub fn render(&self, port_offset: u16) -> String {
        format!(
            "{}:{}",
            self.host.resolve(port_offset),
            self.container.resolve(port_offset)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountSource {
    /// A runtime-managed named volume
    Named(&'static str),
    /// A sub-directory of the extension home directory on the host
    AppDir(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeMount {
    pub source: MountSource,
    pub target: &'static str,
}

/// Command line handed to the image, when the image default is not enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchCommand {
    ImageDefault,
    Redpanda,
}

impl LaunchCommand {
    pub fn args(self, port_offset: u16) -> Vec<String> {
        match self {
            LaunchCommand::ImageDefault => Vec::new(),
            LaunchCommand::Redpanda => {
                let external = PortExpr::Offset(9092).resolve(port_offset);
                [
                    "redpanda",
                    "start",
                    "--overprovisioned",
                    "--smp",
                    "1",
                    "--memory",
                    "1G",
                    "--reserve-memory",
                    "0M",
                    "--node-id",
                    "0",
                    "--check=false",
                    "--kafka-addr",
                ]
                .into_iter()
                .map(String::from)
                .chain([
                    format!("PLAINTEXT://0.0.0.0:19092,EXTERNAL://0.0.0.0:{external}"),
                    "--advertise-kafka-addr".to_string(),
                    format!("PLAINTEXT://kafka:19092,EXTERNAL://localhost:{external}"),
                ])
                .collect()
            }
        }
    }
}

/// Static description of a managed service.
#[derive(Debug)]
pub struct ServiceDefinition {
    pub id: ServiceId,
    pub display_name: &'static str,
    pub image: &'static str,
    pub hostname: &'static str,
    pub env: &'static [(&'static str, &'static str)],
    pub ports: &'static [PortBinding],
    pub volumes: &'static [VolumeMount],
    pub labels: &'static [&'static str],
    pub extra_args: &'static [&'static str],
    pub command: LaunchCommand,
    pub requires_async: bool,
}

impl ServiceDefinition {
    /// Host port of the first offset-dependent binding.
    ///
    /// Services without such a binding never need recreation on config change.
    pub fn config_sensitive_port(&self, port_offset: u16) -> Option<u16> {
        self.config_sensitive_binding()
            .map(|binding| binding.host.resolve(port_offset))
    }

    pub fn config_sensitive_binding(&self) -> Option<&PortBinding> {
        self.ports.iter().find(|binding| binding.host.is_offset())
    }

    /// Every host port this service publishes under `port_offset`.
    pub fn host_ports(&self, port_offset: u16) -> impl Iterator<Item = u16> + '_ {
        self.ports
            .iter()
            .map(move |binding| binding.host.resolve(port_offset))
    }
}

const APP_CONFIG_MOUNT: VolumeMount = VolumeMount {
    source: MountSource::AppDir("config"),
    target: "/deployments/config",
};

static CATALOG: [ServiceDefinition; 5] = [
    ServiceDefinition {
        id: ServiceId::Mongo,
        display_name: "MongoDB",
        image: "mongo:3.4.23",
        hostname: "mongo",
        env: &[],
        ports: &[],
        volumes: &[VolumeMount {
            source: MountSource::Named(EXTENSION_VOLUME),
            target: "/data/db",
        }],
        labels: &[OWNERSHIP_LABEL],
        extra_args: &[],
        command: LaunchCommand::ImageDefault,
        requires_async: false,
    },
    ServiceDefinition {
        id: ServiceId::Postman,
        display_name: "Postman runtime",
        image: "quay.io/microcks/microcks-postman-runtime:latest",
        hostname: "postman",
        env: &[],
        ports: &[],
        volumes: &[],
        labels: &[OWNERSHIP_LABEL],
        extra_args: &[],
        command: LaunchCommand::ImageDefault,
        requires_async: false,
    },
    ServiceDefinition {
        id: ServiceId::App,
        display_name: "Microcks",
        image: "quay.io/microcks/microcks:latest",
        hostname: "app",
        env: &[
            (
                "JAVA_OPTIONS",
                "-XX:+TieredCompilation -XX:TieredStopAtLevel=2",
            ),
            ("JAVA_MAJOR_VERSION", "11"),
            ("SERVICES_UPDATE_INTERVAL", "0 0 0/2 * * *"),
            ("SPRING_PROFILES_ACTIVE", "prod"),
            ("KEYCLOAK_ENABLED", "false"),
            ("KAFKA_BOOTSTRAP_SERVER", "kafka:19092"),
            ("SPRING_DATA_MONGODB_URI", "mongodb://mongo:27017"),
            ("SPRING_DATA_MONGODB_DATABASE", "microcks"),
            ("TEST_CALLBACK_URL", "http://microcks:8080"),
            ("ASYNC_MINION_URL", "http://microcks-async-minion:8081"),
            ("POSTMAN_RUNNER_URL", "http://postman:3000"),
        ],
        ports: &[
            PortBinding {
                host: PortExpr::Offset(8080),
                container: PortExpr::Fixed(8080),
            },
            PortBinding {
                host: PortExpr::Offset(9090),
                container: PortExpr::Fixed(9090),
            },
        ],
        volumes: &[APP_CONFIG_MOUNT],
        labels: &[OWNERSHIP_LABEL],
        extra_args: &[],
        command: LaunchCommand::ImageDefault,
        requires_async: false,
    },
    ServiceDefinition {
        id: ServiceId::Kafka,
        display_name: "Kafka (Redpanda)",
        image: "vectorized/redpanda:v22.2.2",
        hostname: "kafka",
        env: &[],
        ports: &[
            PortBinding {
                host: PortExpr::Offset(9092),
                container: PortExpr::Offset(9092),
            },
            PortBinding {
                host: PortExpr::Fixed(19092),
                container: PortExpr::Fixed(19092),
            },
        ],
        volumes: &[],
        labels: &[OWNERSHIP_LABEL],
        extra_args: &[],
        command: LaunchCommand::Redpanda,
        requires_async: true,
    },
    ServiceDefinition {
        id: ServiceId::AsyncMinion,
        display_name: "Async minion",
        image: "quay.io/microcks/microcks-async-minion:latest",
        hostname: "microcks-async-minion",
        env: &[("QUARKUS_PROFILE", "docker-compose")],
        ports: &[PortBinding {
            host: PortExpr::Offset(8081),
            container: PortExpr::Fixed(8081),
        }],
        volumes: &[APP_CONFIG_MOUNT],
        labels: &[OWNERSHIP_LABEL],
        extra_args: &["--restart", "on-failure"],
        command: LaunchCommand::ImageDefault,
        requires_async: true,
    },
];
