use crate::domain::ServiceId;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prerequisite {
    Network,
    Volume,
}

impl fmt::Display for Prerequisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "rede"),
            Self::Volume => write!(f, "volume"),
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("não foi possível garantir {0} da extensão")]
    Prerequisite(Prerequisite),

    #[error("{command} {targets} retornou código {code}: {stderr}")]
    CommandFailed {
        command: String,
        targets: String,
        code: i32,
        stderr: String,
    },

    #[error("criação de {service} falhou: {message}")]
    StreamFailed { service: ServiceId, message: String },

    #[error("sistema de arquivos da extensão indisponível: {0}")]
    FileSystemUnavailable(String),

    #[error("configuração inválida: {0}")]
    InvalidConfig(String),

    #[error("serviço desconhecido '{0}'")]
    UnknownService(String),
}

impl OrchestratorError {
    pub fn command_failed(
        command: impl fmt::Display,
        services: &[ServiceId],
        code: i32,
        stderr: &str,
    ) -> Self {
        Self::CommandFailed {
            command: command.to_string(),
            targets: services
                .iter()
                .map(|s| s.container_name())
                .collect::<Vec<_>>()
                .join(" "),
            code,
            stderr: stderr.trim().to_string(),
        }
    }
}
