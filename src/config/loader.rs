use std::path::{Path, PathBuf};

use config::{Config, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::GatewayConfig;

pub const CONFIG_FILENAME: &str = "gateway.ini";
pub const CONFIG_PATH_ENV: &str = "PORTICO_CONFIG_PATH";
pub const DEFAULT_CONFIG_DIRS: [&str; 3] = [".", "./conf", "/etc/portico"];

/// A configuration together with the file it is persisted to.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: GatewayConfig,
    pub path: PathBuf,
    /// False when no file was found and defaults were used.
    pub from_file: bool,
}

/// Where `gateway.ini` is looked up, in order.
///
/// An explicit path wins outright. Otherwise `$PORTICO_CONFIG_PATH` (a file,
/// or a directory holding `gateway.ini`) is tried before the default
/// directories.
pub fn candidate_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }

    let mut candidates = Vec::new();
    if let Some(env_path) = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from) {
        if env_path.is_dir() {
            candidates.push(env_path.join(CONFIG_FILENAME));
        } else {
            candidates.push(env_path);
        }
    }
    candidates.extend(
        DEFAULT_CONFIG_DIRS
            .iter()
            .map(|dir| Path::new(dir).join(CONFIG_FILENAME)),
    );
    candidates
}

/// Load the first existing candidate, or defaults when there is none.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let candidates = candidate_paths(explicit);

    if let Some(path) = candidates.iter().find(|p| p.is_file()) {
        let config = load_config_from(path)?;
        tracing::info!(file = %path.display(), "Loaded configuration");
        return Ok(LoadedConfig {
            config,
            path: path.clone(),
            from_file: true,
        });
    }

    // Persist to the most specific location we were pointed at.
    let path = candidates
        .first()
        .cloned()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILENAME));
    tracing::warn!(
        file = %path.display(),
        "No configuration file found, using defaults"
    );
    Ok(LoadedConfig {
        config: GatewayConfig::default(),
        path,
        from_file: false,
    })
}

/// Load configuration synchronously from one INI file.
pub fn load_config_from(config_path: &Path) -> Result<GatewayConfig> {
    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            FileFormat::Ini,
        ))
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let config: GatewayConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    Ok(config)
}

/// Write `config` as INI to `path`, creating parent directories.
pub async fn save_config(path: &Path, config: &GatewayConfig) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, config.to_ini())
        .await
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    tracing::info!(file = %path.display(), "Configuration saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::{NamedTempFile, TempDir};

    use super::*;

    #[test]
    fn test_load_ini_config() {
        let ini = "[common]\nRuntimePath=/tmp/portico-runtime\n\n[gateway]\nPort=8080\nWWWPath=/srv/www\nProbeAttempts=3\n";

        let mut temp_file = NamedTempFile::with_suffix(".ini").unwrap();
        write!(temp_file, "{ini}").unwrap();

        let config = load_config_from(temp_file.path()).unwrap();
        assert_eq!(config.common.runtime_path, "/tmp/portico-runtime");
        assert_eq!(config.gateway.port, "8080");
        assert_eq!(config.gateway.www_path, "/srv/www");
        assert_eq!(config.gateway.probe_attempts, 3);
        // Unset keys keep their defaults.
        assert_eq!(config.gateway.grace_delay_millis, 1000);
    }

    #[test]
    fn test_empty_port_means_unassigned() {
        let mut temp_file = NamedTempFile::with_suffix(".ini").unwrap();
        write!(temp_file, "[gateway]\nPort=\n").unwrap();

        let config = load_config_from(temp_file.path()).unwrap();
        assert_eq!(config.gateway.port, "");
        assert_eq!(config.common, Default::default());
    }

    #[test]
    fn test_explicit_missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gateway.ini");

        let loaded = load_config(Some(&path)).unwrap();
        assert!(!loaded.from_file);
        assert_eq!(loaded.path, path);
        assert_eq!(loaded.config, GatewayConfig::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf/gateway.ini");

        let mut config = GatewayConfig::default();
        config.gateway.port = "8081".to_string();
        config.common.runtime_path = "/tmp/run".to_string();
        save_config(&path, &config).await.unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert!(loaded.from_file);
        assert_eq!(loaded.config, config);
    }
}
