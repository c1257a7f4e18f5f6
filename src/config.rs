use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{MailError, Result};

/// Hard upper bound on messages fetched by one refresh
pub const MAX_FETCH_RESULTS: u32 = 50;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_generator_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_generator_timeout_secs(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_max_results")]
    pub default_max_results: u32,
    #[serde(default = "default_unreplied_limit")]
    pub unreplied_limit: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            default_max_results: default_max_results(),
            unreplied_limit: default_unreplied_limit(),
        }
    }
}

fn default_max_concurrent() -> usize {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_generator_timeout_secs() -> u64 {
    60
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_results() -> u32 {
    20
}

fn default_unreplied_limit() -> usize {
    5
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MailError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| MailError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    MailError::ConfigError(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| MailError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| MailError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // 1-50 keeps per-user Gmail quota usage reasonable
        if self.gateway.max_concurrent_requests == 0 {
            return Err(MailError::ConfigError(
                "gateway.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.gateway.max_concurrent_requests > 50 {
            return Err(MailError::ConfigError(
                "gateway.max_concurrent_requests cannot exceed 50".to_string(),
            ));
        }
        if self.gateway.request_timeout_secs == 0 {
            return Err(MailError::ConfigError(
                "gateway.request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.generator.model.trim().is_empty() {
            return Err(MailError::ConfigError(
                "generator.model cannot be empty".to_string(),
            ));
        }
        if !(self.generator.base_url.starts_with("http://")
            || self.generator.base_url.starts_with("https://"))
        {
            return Err(MailError::ConfigError(format!(
                "generator.base_url must be an http(s) URL, got '{}'",
                self.generator.base_url
            )));
        }
        if self.generator.api_key_env.trim().is_empty() {
            return Err(MailError::ConfigError(
                "generator.api_key_env cannot be empty".to_string(),
            ));
        }
        if self.generator.timeout_secs == 0 {
            return Err(MailError::ConfigError(
                "generator.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.generator.temperature) {
            return Err(MailError::ConfigError(format!(
                "generator.temperature must be between 0.0 and 2.0, got {}",
                self.generator.temperature
            )));
        }

        if self.refresh.default_max_results == 0
            || self.refresh.default_max_results > MAX_FETCH_RESULTS
        {
            return Err(MailError::ConfigError(format!(
                "refresh.default_max_results must be between 1 and {}",
                MAX_FETCH_RESULTS
            )));
        }
        if self.refresh.unreplied_limit == 0 {
            return Err(MailError::ConfigError(
                "refresh.unreplied_limit must be at least 1".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        Self::default().save(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gateway.max_concurrent_requests, 10);
        assert_eq!(config.gateway.request_timeout_secs, 30);
        assert_eq!(config.gateway.max_retries, 3);
        assert_eq!(config.generator.model, "gemini-2.0-flash");
        assert_eq!(config.generator.api_key_env, "GEMINI_API_KEY");
        assert_eq!(config.refresh.default_max_results, 20);
        assert_eq!(config.refresh.unreplied_limit, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_max_concurrent_bounds() {
        let mut config = Config::default();
        config.gateway.max_concurrent_requests = 0;
        assert!(config.validate().is_err());

        config.gateway.max_concurrent_requests = 51;
        assert!(config.validate().is_err());

        config.gateway.max_concurrent_requests = 50;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_timeouts() {
        let mut config = Config::default();
        config.gateway.request_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.generator.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_generator_fields() {
        let mut config = Config::default();
        config.generator.model = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.generator.base_url = "ftp://example.com".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("base_url"));

        let mut config = Config::default();
        config.generator.temperature = 2.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_refresh_bounds() {
        let mut config = Config::default();
        config.refresh.default_max_results = 0;
        assert!(config.validate().is_err());

        config.refresh.default_max_results = MAX_FETCH_RESULTS + 1;
        assert!(config.validate().is_err());

        config.refresh.default_max_results = MAX_FETCH_RESULTS;
        assert!(config.validate().is_ok());

        config.refresh.unreplied_limit = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_config_load_nonexistent_returns_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(&temp_dir.path().join("missing.toml"))
            .await
            .unwrap();
        assert_eq!(config.refresh.default_max_results, 20);
    }

    #[tokio::test]
    async fn test_config_load_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        tokio::fs::write(&path, "[gateway\nmax_concurrent_requests = ")
            .await
            .unwrap();

        let err = Config::load(&path).await.unwrap_err();
        assert!(matches!(err, MailError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_config_partial_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        tokio::fs::write(
            &path,
            "[generator]\nmodel = \"gemini-1.5-pro\"\n\n[refresh]\nunreplied_limit = 8\n",
        )
        .await
        .unwrap();

        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.generator.model, "gemini-1.5-pro");
        assert_eq!(config.generator.timeout_secs, 60);
        assert_eq!(config.refresh.unreplied_limit, 8);
        assert_eq!(config.refresh.default_max_results, 20);
        assert_eq!(config.gateway.max_concurrent_requests, 10);
    }

    #[tokio::test]
    async fn test_config_load_rejects_invalid_values() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        tokio::fs::write(&path, "[refresh]\ndefault_max_results = 500\n")
            .await
            .unwrap();

        assert!(Config::load(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_config_create_example_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        Config::create_example(&path).await.unwrap();
        assert!(path.exists());

        let loaded = Config::load(&path).await.unwrap();
        assert_eq!(loaded.generator.base_url, default_base_url());
        assert_eq!(loaded.gateway.max_retries, 3);
    }
}
