use super::schema::MonitorConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "PAGEWATCH_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Resolves the config the way the CLI does without `--config`:
    /// `$PAGEWATCH_CONFIG` if set, then `./pagewatch.yaml`, then
    /// `~/.pagewatch/config.yaml`, then built-in defaults.
    pub async fn load_default() -> Result<MonitorConfig, ConfigError> {
        // An explicit file that is missing is an error, not a fallthrough.
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load_from(Path::new(&path)).await;
        }

        let found = search_paths(dirs::home_dir())
            .into_iter()
            .find(|path| path.exists());
        match found {
            Some(path) => Self::load_from(&path).await,
            None => {
                debug!("No monitor config found, using defaults");
                Ok(MonitorConfig::default())
            }
        }
    }

    pub async fn load_from(path: &Path) -> Result<MonitorConfig, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::parse(&content)?;
        debug!(
            "Loaded monitor config from {} ({} origins)",
            path.display(),
            config.allowed_origins.len()
        );
        Ok(config)
    }

    /// Parses YAML, filling unset fields with defaults, and validates the result.
    pub fn parse(content: &str) -> Result<MonitorConfig, ConfigError> {
        let config: MonitorConfig = serde_yaml::from_str(content)?;
        validate(&config)?;
        Ok(config)
    }
}

fn search_paths(home: Option<PathBuf>) -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("./pagewatch.yaml")];
    if let Some(home) = home {
        paths.push(home.join(".pagewatch").join("config.yaml"));
    }
    paths
}

fn validate(config: &MonitorConfig) -> Result<(), ConfigError> {
    for origin in &config.allowed_origins {
        if origin != "*" && url::Url::parse(origin).is_err() {
            return Err(ConfigError::Invalid(format!(
                "allowed origin is not a URL: {}",
                origin
            )));
        }
    }
    if config.poll_budget > 0 && config.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid(
            "poll_interval_ms must be positive when polling".into(),
        ));
    }
    Ok(())
}
