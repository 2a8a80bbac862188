use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Remote API configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    /// Base URL of the event API (e.g. "http://localhost:5000").
    /// Also the base for fully-qualified image URLs.
    pub base_url: Option<String>,
}

impl ApiConfig {
    /// Returns true if a remote API endpoint is configured.
    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    /// Joins the configured base with a server-relative path, normalizing
    /// slashes on both sides. Returns None when no base is configured or
    /// the path is empty.
    pub fn full_image_url(&self, file_path: &str) -> Option<String> {
        let base = self.base_url.as_deref()?;
        let path = file_path.trim_start_matches('/');
        if path.is_empty() {
            return None;
        }
        Some(format!("{}/{}", base.trim_end_matches('/'), path))
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite event cache
    pub database_path: ConfigValue<PathBuf>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Remote API configuration
    pub api: ApiConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    api: Option<ApiConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let default_db_path = Self::default_data_dir().join("todoevent.db");

        let mut database_path = ConfigValue::new(default_db_path, ConfigSource::Default);
        let mut config_file = None;
        let mut api = ApiConfig::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                // Resolve relative paths against the config file's directory
                let resolved = if db_path.is_relative() {
                    path.parent().map(|p| p.join(&db_path)).unwrap_or(db_path)
                } else {
                    db_path
                };
                database_path = ConfigValue::new(resolved, ConfigSource::File);
            }
            if let Some(api_config) = file_config.api {
                api = api_config;
            }
        }

        // Environment overrides
        if let Ok(db_path) = std::env::var("TODOEVENT_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Ok(url) = std::env::var("TODOEVENT_API_URL") {
            api.base_url = Some(url);
        }

        Ok(Self {
            database_path,
            config_file,
            api,
        })
    }

    /// Default config file path: ~/.config/todoevent/config.yaml
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("todoevent")
            .join("config.yaml")
    }

    /// Default data directory: ~/.local/share/todoevent
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("todoevent")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_load_no_file_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.database_path.source, ConfigSource::Default);
        assert!(config.config_file.is_none());
        assert!(!config.api.is_configured());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "database_path: /custom/path/events.db").unwrap();
        writeln!(file, "api:").unwrap();
        writeln!(file, "  base_url: \"http://localhost:5000\"").unwrap();

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(
            config.database_path.value,
            PathBuf::from("/custom/path/events.db")
        );
        assert_eq!(config.database_path.source, ConfigSource::File);
        assert_eq!(config.api.base_url.as_deref(), Some("http://localhost:5000"));
    }

    #[test]
    fn test_relative_db_path_resolved_against_config_dir() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "database_path: cache.db").unwrap();

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.database_path.value, temp_dir.path().join("cache.db"));
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "api: [not: a map").unwrap();

        let result = Config::load(Some(config_path));
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file"));
    }

    #[test]
    fn test_full_image_url_joins_slashes() {
        let api = ApiConfig {
            base_url: Some("http://localhost:5000/".to_string()),
        };
        assert_eq!(
            api.full_image_url("/uploads/a.jpg").as_deref(),
            Some("http://localhost:5000/uploads/a.jpg")
        );
        assert_eq!(
            api.full_image_url("uploads/a.jpg").as_deref(),
            Some("http://localhost:5000/uploads/a.jpg")
        );
        assert!(api.full_image_url("").is_none());
    }

    #[test]
    fn test_full_image_url_unconfigured() {
        let api = ApiConfig::default();
        assert!(api.full_image_url("uploads/a.jpg").is_none());
    }
}
