//! Configuration loading, validation, and management for tabtally.
//!
//! Loads configuration from `~/.tabtally/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.tabtally/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Seconds to wait between reconciliation cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Session store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Topic classifier configuration
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

fn default_interval_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// sqlx connection URL, e.g. `sqlite:///var/lib/tabtally/sessions.db`
    #[serde(default = "default_store_url")]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_store_backend() -> String {
    "sqlite".into()
}
fn default_store_url() -> String {
    format!(
        "sqlite://{}",
        AppConfig::config_dir().join("sessions.db").display()
    )
}
fn default_max_connections() -> u32 {
    4
}

impl StoreConfig {
    /// The connection URL with a leading `~/` in the path expanded.
    pub fn resolved_url(&self) -> String {
        match self.url.strip_prefix("sqlite://~/") {
            Some(rest) => format!("sqlite://{}", dirs_home().join(rest).display()),
            None => self.url.clone(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            url: default_store_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// When false every untagged group is labelled `[Unknown Topic]`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// "openai", "openrouter", "azure", "ollama", or any name paired with `api_url`
    #[serde(default = "default_classifier_provider")]
    pub provider: String,

    /// Base URL of an OpenAI-compatible API (overrides the provider preset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// `api-version` query parameter (Azure defaults to `2024-05-01-preview`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default = "default_classifier_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-call timeout; a slower reply counts as `[Unknown Topic]`
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_classifier_provider() -> String {
    "openai".into()
}
fn default_classifier_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    1.0
}
fn default_top_p() -> f32 {
    1.0
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: default_classifier_provider(),
            api_url: None,
            api_key: None,
            api_version: None,
            model: default_classifier_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for ClassifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierConfig")
            .field("enabled", &self.enabled)
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("api_version", &self.api_version)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ClassifierConfig {
    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.tabtally/config.toml).
    ///
    /// Environment variables take precedence over the file:
    /// - `TABTALLY_DATABASE_URL`
    /// - `TABTALLY_INTERVAL_SECS`
    /// - `TABTALLY_API_URL`, `TABTALLY_API_VERSION`, `TABTALLY_MODEL`
    /// - `TABTALLY_API_KEY` (then `OPENAI_API_KEY` if no key is configured)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_path())
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("TABTALLY_DATABASE_URL") {
            self.store.url = url;
        }

        if let Some(raw) = lookup("TABTALLY_INTERVAL_SECS") {
            self.interval_secs = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "TABTALLY_INTERVAL_SECS must be a whole number of seconds, got '{raw}'"
                ))
            })?;
        }

        if let Some(url) = lookup("TABTALLY_API_URL") {
            self.classifier.api_url = Some(url);
        }

        if let Some(version) = lookup("TABTALLY_API_VERSION") {
            self.classifier.api_version = Some(version);
        }

        if let Some(model) = lookup("TABTALLY_MODEL") {
            self.classifier.model = model;
        }

        if let Some(key) = lookup("TABTALLY_API_KEY") {
            self.classifier.api_key = Some(key);
        } else if self.classifier.api_key.is_none() {
            self.classifier.api_key = lookup("OPENAI_API_KEY");
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".tabtally")
    }

    /// Get the default configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "interval_secs must be greater than 0".into(),
            ));
        }

        if !matches!(self.store.backend.as_str(), "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "store.backend must be \"sqlite\" or \"memory\", got \"{}\"",
                self.store.backend
            )));
        }

        if self.store.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "store.max_connections must be greater than 0".into(),
            ));
        }

        if self.classifier.temperature < 0.0 || self.classifier.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "classifier.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.classifier.top_p <= 0.0 || self.classifier.top_p > 1.0 {
            return Err(ConfigError::ValidationError(
                "classifier.top_p must be in (0.0, 1.0]".into(),
            ));
        }

        if self.classifier.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "classifier.timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            store: StoreConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.interval_secs, 60);
        assert_eq!(config.store.backend, "sqlite");
        assert!(config.store.url.starts_with("sqlite://"));
        assert!(config.store.url.ends_with("sessions.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn store_url_expands_home() {
        let store = StoreConfig {
            url: "sqlite://~/data/s.db".into(),
            ..StoreConfig::default()
        };
        let resolved = store.resolved_url();
        assert!(!resolved.contains('~'));
        assert!(resolved.ends_with("s.db"));

        let memory = StoreConfig {
            url: "sqlite::memory:".into(),
            ..StoreConfig::default()
        };
        assert_eq!(memory.resolved_url(), "sqlite::memory:");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.interval_secs, config.interval_secs);
        assert_eq!(parsed.classifier.model, config.classifier.model);
    }

    #[test]
    fn zero_interval_rejected() {
        let config = AppConfig {
            interval_secs: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_backend_rejected() {
        let mut config = AppConfig::default();
        config.store.backend = "mssql".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("mssql"));
    }

    #[test]
    fn invalid_top_p_rejected() {
        let mut config = AppConfig::default();
        config.classifier.top_p = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().interval_secs, 60);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
interval_secs = 15

[store]
url = "sqlite::memory:"

[classifier]
provider = "azure"
api_url = "https://example.services.ai.azure.com/models"
model = "Llama-3.3-70B-Instruct"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.interval_secs, 15);
        assert_eq!(config.store.url, "sqlite::memory:");
        assert_eq!(config.store.max_connections, 4);
        assert_eq!(config.classifier.provider, "azure");
        assert_eq!(config.classifier.max_tokens, 1000);
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "interval_secs = \"soon\"").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut config = AppConfig::default();
        config.classifier.api_key = Some("from-file".into());
        config
            .apply_overrides(env(&[
                ("TABTALLY_DATABASE_URL", "sqlite:///tmp/t.db"),
                ("TABTALLY_INTERVAL_SECS", "5"),
                ("TABTALLY_API_KEY", "from-env"),
                ("TABTALLY_MODEL", "gpt-4.1-nano"),
                ("TABTALLY_API_VERSION", "2024-10-21"),
            ]))
            .unwrap();
        assert_eq!(config.store.url, "sqlite:///tmp/t.db");
        assert_eq!(config.interval_secs, 5);
        assert_eq!(config.classifier.api_key.as_deref(), Some("from-env"));
        assert_eq!(config.classifier.model, "gpt-4.1-nano");
        assert_eq!(config.classifier.api_version.as_deref(), Some("2024-10-21"));
    }

    #[test]
    fn openai_key_only_fills_a_missing_key() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(env(&[("OPENAI_API_KEY", "sk-env")]))
            .unwrap();
        assert_eq!(config.classifier.api_key.as_deref(), Some("sk-env"));

        let mut config = AppConfig::default();
        config.classifier.api_key = Some("sk-file".into());
        config
            .apply_overrides(env(&[("OPENAI_API_KEY", "sk-env")]))
            .unwrap();
        assert_eq!(config.classifier.api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn bad_interval_override_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides(env(&[("TABTALLY_INTERVAL_SECS", "1m")]));
        assert!(result.is_err());
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut config = AppConfig::default();
        config.classifier.api_key = Some("sk-very-secret".into());
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-very-secret"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("interval_secs = 60"));
        assert!(toml_str.contains("[classifier]"));
    }
}
