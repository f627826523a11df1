use crate::domain::ExtensionConfig;
use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_MOCKBOX_TOML_NAME: &str = "mockbox.toml";
pub const DEFAULT_MOCKBOX_TOML: &str = include_str!("../../config/default_mockbox.toml");
pub const DEFAULT_APP_DIR: &str = "~/.microcks-docker-desktop-extension";

pub fn default_config_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".config/mockbox")
}

pub fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    fs::create_dir_all(config_dir).with_context(|| format!("criando {:?}", config_dir))
}

pub fn config_path(config_dir: &Path) -> PathBuf {
    config_dir.join(DEFAULT_MOCKBOX_TOML_NAME)
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RuntimeConfig {
    pub binary: String,
    pub app_dir: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            app_dir: None,
        }
    }
}

impl RuntimeConfig {
    /// Extension home directory with `~` and env vars expanded.
    pub fn resolved_app_dir(&self) -> Result<PathBuf> {
        let raw = self.app_dir.as_deref().unwrap_or(DEFAULT_APP_DIR);
        let expanded = shellexpand::full(raw)
            .with_context(|| format!("expandindo diretório da extensão {raw:?}"))?;
        Ok(PathBuf::from(expanded.into_owned()))
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct HealthConfig {
    pub interval: Option<String>,
    pub timeout: Option<String>,
    pub wait_timeout: Option<String>,
}

impl HealthConfig {
    pub fn interval(&self) -> Result<Duration> {
        duration_or(self.interval.as_deref(), Duration::from_secs(1))
    }

    pub fn timeout(&self) -> Result<Duration> {
        duration_or(self.timeout.as_deref(), Duration::from_secs(2))
    }

    pub fn wait_timeout(&self) -> Result<Duration> {
        duration_or(self.wait_timeout.as_deref(), Duration::from_secs(180))
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub extension: ExtensionConfig,
    pub runtime: RuntimeConfig,
    pub health: HealthConfig,
}

pub fn load_app_config(config_dir: &Path) -> Result<AppConfig> {
    let path = config_path(config_dir);

    if !path.exists() {
        debug!("{:?} não encontrado, usando configuração padrão", path);
        return Ok(AppConfig::default());
    }

    let content = fs::read_to_string(&path).with_context(|| format!("lendo {:?}", path))?;
    let config: AppConfig =
        toml::from_str(&content).with_context(|| format!("parse de {:?}", path))?;

    config
        .extension
        .validate()
        .with_context(|| format!("validando {:?}", path))?;

    Ok(config)
}

/// Persists the `[extension]` table, keeping every other table as written by the user.
pub fn save_extension_config(config_dir: &Path, extension: &ExtensionConfig) -> Result<()> {
    ensure_config_dir(config_dir)?;
    let path = config_path(config_dir);

    let mut document: toml::Table = if path.exists() {
        let content = fs::read_to_string(&path).with_context(|| format!("lendo {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("parse de {:?}", path))?
    } else {
        toml::Table::new()
    };

    let value = toml::Value::try_from(extension).context("serializando [extension]")?;
    document.insert("extension".to_string(), value);

    let content = toml::to_string(&document).context("serializando configuração")?;
    fs::write(&path, content).with_context(|| format!("escrevendo {:?}", path))?;

    info!(" Configuração salva em {:?}", path);
    Ok(())
}

pub fn install_default_config(target_dir: &Path) -> Result<()> {
    ensure_config_dir(target_dir)?;

    let target = config_path(target_dir);
    if target.exists() {
        return Ok(());
    }

    fs::write(&target, DEFAULT_MOCKBOX_TOML)
        .with_context(|| format!("escrevendo template em {:?}", target))
}

fn duration_or(value: Option<&str>, default: Duration) -> Result<Duration> {
    value.map(parse_duration).unwrap_or(Ok(default))
}

pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if let Some(stripped) = s.strip_suffix("ms") {
        let millis: u64 = stripped.parse()?;
        Ok(Duration::from_millis(millis))
    } else if let Some(stripped) = s.strip_suffix('s') {
        let secs: u64 = stripped.parse()?;
        Ok(Duration::from_secs(secs))
    } else if let Some(stripped) = s.strip_suffix('m') {
        let mins: u64 = stripped.parse()?;
        let secs = mins
            .checked_mul(60)
            .ok_or_else(|| anyhow!("Duração muito grande: {}", s))?;
        Ok(Duration::from_secs(secs))
    } else {
        bail!("Formato de duração inválido: {}", s)
    }
}
