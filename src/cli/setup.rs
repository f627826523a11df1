use crate::domain::Workspace;
use crate::infra::LocalWorkspace;
use crate::infra::config::{
    default_config_dir, ensure_config_dir, install_default_config, load_app_config,
};
use anyhow::Result;
use std::path::Path;
use tracing::info;

/// Installs `mockbox.toml` and prepares the extension directory with its property files.
pub fn install(config_dir: &Path) -> Result<()> {
    info!(" Preparando config em {:?}", config_dir);

    ensure_config_dir(config_dir)?;
    install_default_config(config_dir)?;

    let app_config = load_app_config(config_dir)?;
    let workspace = LocalWorkspace::new(app_config.runtime.resolved_app_dir()?);
    workspace.initialize()?;
    workspace.write_properties(&app_config.extension)?;

    info!(
        " Config pronto. Ajuste mockbox.toml conforme necessário (padrão: {:?})",
        default_config_dir()
    );

    Ok(())
}
