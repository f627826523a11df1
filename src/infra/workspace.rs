use crate::domain::{ExtensionConfig, Workspace};
use crate::error::OrchestratorError;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Extension home directory on the local file system
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    app_dir: PathBuf,
}

impl LocalWorkspace {
    pub fn new(app_dir: PathBuf) -> Self {
        Self { app_dir }
    }

    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    pub fn config_dir(&self) -> PathBuf {
        self.app_dir.join("config")
    }
}

impl Workspace for LocalWorkspace {
    fn initialize(&self) -> Result<PathBuf> {
        let config_dir = self.config_dir();
        fs::create_dir_all(&config_dir).map_err(|e| {
            OrchestratorError::FileSystemUnavailable(format!("{:?}: {e}", config_dir))
        })?;

        debug!("Diretório da extensão: {:?}", self.app_dir);
        Ok(self.app_dir.clone())
    }

    fn write_properties(&self, config: &ExtensionConfig) -> Result<()> {
        let config_dir = self.config_dir();
        fs::create_dir_all(&config_dir).with_context(|| format!("criando {:?}", config_dir))?;

        for (name, content) in [
            ("application.properties", application_properties(config)),
            ("features.properties", features_properties(config)),
        ] {
            let target = config_dir.join(name);
            fs::write(&target, content).with_context(|| format!("escrevendo {:?}", target))?;
        }

        info!(" Arquivos de propriedades atualizados em {:?}", config_dir);
        Ok(())
    }
}

fn application_properties(config: &ExtensionConfig) -> String {
    format!(
        "# Gerado pelo mockbox, não edite\n\
         async-api.enabled={}\n\
         async-api.default-binding=KAFKA\n\
         kafka.bootstrap.servers=kafka:19092\n",
        config.async_enabled
    )
}

fn features_properties(config: &ExtensionConfig) -> String {
    format!(
        "# Gerado pelo mockbox, não edite\n\
         features.feature.async-api.enabled={}\n\
         features.feature.async-api.frequencies=3,10,30\n\
         features.feature.async-api.default-binding=KAFKA\n\
         features.feature.async-api.endpoint-KAFKA=localhost:{}\n",
        config.async_enabled,
        9092u16.saturating_add(config.port_offset)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_creates_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = LocalWorkspace::new(dir.path().join("ext"));

        let app_dir = workspace.initialize().unwrap();

        assert_eq!(app_dir, dir.path().join("ext"));
        assert!(dir.path().join("ext/config").is_dir());
    }

    #[test]
    fn test_initialize_fails_when_path_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("ext");
        fs::write(&blocker, "not a directory").unwrap();

        let err = LocalWorkspace::new(blocker).initialize().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OrchestratorError>(),
            Some(OrchestratorError::FileSystemUnavailable(_))
        ));
    }

    #[test]
    fn test_properties_reflect_config() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = LocalWorkspace::new(dir.path().to_path_buf());
        let config = ExtensionConfig {
            async_enabled: true,
            port_offset: 3,
        };

        workspace.write_properties(&config).unwrap();

        let features = fs::read_to_string(dir.path().join("config/features.properties")).unwrap();
        assert!(features.contains("features.feature.async-api.enabled=true"));
        assert!(features.contains("endpoint-KAFKA=localhost:9095"));

        let application =
            fs::read_to_string(dir.path().join("config/application.properties")).unwrap();
        assert!(application.contains("async-api.enabled=true"));
    }
}
