//! Configuration system for mention-explorer.
//!
//! Provides layered configuration from multiple sources:
//!
//! 1. **Compiled defaults** - Sensible defaults built into the binary
//! 2. **Config file** - `~/.config/mention-explorer/config.toml`, or `--config`
//! 3. **Environment variables** - `MX_*` prefix (plus `OPENAI_API_KEY`)
//! 4. **CLI arguments** - Highest priority, always wins
//!
//! # Example Configuration File
//!
//! ```toml
//! [database]
//! path = "/var/lib/mention-explorer/mentions.db"
//!
//! [server]
//! host = "0.0.0.0"
//! port = 8000
//!
//! [query]
//! default_limit = 50
//! max_limit = 1000
//!
//! [llm]
//! base_url = "https://api.openai.com/v1"
//! model = "gpt-4o-mini"
//! timeout_secs = 60
//! ```

use crate::{ExplorerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Placeholder shown instead of a configured API key.
pub const REDACTED: &str = "********";

/// Main configuration structure for mention-explorer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database location.
    pub database: DatabaseConfig,
    /// HTTP listener.
    pub server: ServerConfig,
    /// Query limits.
    pub query: QueryConfig,
    /// Language model used for rule execution.
    pub llm: LlmConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the `SQLite` database file.
    /// Environment variable: `MX_DB`
    pub path: Option<PathBuf>,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Environment variable: `MX_HOST`
    pub host: String,
    /// Environment variable: `MX_PORT`
    pub port: u16,
}

/// Limits applied to list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Page size when the request gives none.
    pub default_limit: u32,
    /// Upper bound on any requested page size.
    pub max_limit: u32,
    /// Default number of rows for the top-authors endpoint.
    pub authors_limit: u32,
}

/// Chat-completion endpoint configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible API root.
    /// Environment variable: `MX_LLM_BASE_URL`
    pub base_url: String,

    /// Environment variable: `MX_LLM_MODEL`
    pub model: String,

    /// Environment variables: `OPENAI_API_KEY`, `MX_LLM_API_KEY`
    pub api_key: Option<String>,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    pub temperature: f32,

    pub max_tokens: Option<u32>,

    /// Maximum number of mentions included in filter/analyze prompts.
    pub context_limit: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: crate::DEFAULT_PAGE_LIMIT,
            max_limit: 1000,
            authors_limit: 50,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            timeout_secs: 60,
            temperature: 0.2,
            max_tokens: None,
            context_limit: 50,
        }
    }
}

impl LlmConfig {
    /// Whether an API key is present.
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// An explicit path must exist and parse. The default user file is
    /// optional, and a broken one is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if `explicit_path` cannot be read or parsed.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = explicit_path {
            config.merge(Self::read_file(path)?);
        } else if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        config.apply_env_overrides();

        debug!("Configuration loaded: {:?}", config.redacted());
        Ok(config)
    }

    /// Read and parse one config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn read_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ExplorerError::path_error("read config", path, e))?;
        let config = toml::from_str(&content).map_err(|e| ExplorerError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Load the user configuration file from the standard location.
    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        if !config_path.exists() {
            debug!("Config file not found: {}", config_path.display());
            return None;
        }

        match Self::read_file(&config_path) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Ignoring config file: {}", e);
                None
            }
        }
    }

    /// Get the path to the user configuration file.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("mention-explorer").join("config.toml"))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup (the process environment in
    /// production, a map in tests).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(db) = lookup("MX_DB") {
            self.database.path = Some(PathBuf::from(db));
        }

        if let Some(host) = lookup("MX_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("MX_PORT") {
            match port.parse() {
                Ok(n) => self.server.port = n,
                Err(_) => warn!("Ignoring invalid MX_PORT value: {}", port),
            }
        }

        if let Some(base_url) = lookup("MX_LLM_BASE_URL") {
            self.llm.base_url = base_url;
        }
        if let Some(model) = lookup("MX_LLM_MODEL") {
            self.llm.model = model;
        }
        // The tool-specific key wins over the generic one.
        if let Some(key) = lookup("MX_LLM_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.llm.api_key = Some(key);
        }
    }

    /// Merge another config into this one (other takes precedence).
    fn merge(&mut self, other: Self) {
        if other.database.path.is_some() {
            self.database.path = other.database.path;
        }

        self.server = other.server;
        self.query = other.query;

        self.llm.base_url = other.llm.base_url;
        self.llm.model = other.llm.model;
        if other.llm.api_key.is_some() {
            self.llm.api_key = other.llm.api_key;
        }
        self.llm.timeout_secs = other.llm.timeout_secs;
        self.llm.temperature = other.llm.temperature;
        if other.llm.max_tokens.is_some() {
            self.llm.max_tokens = other.llm.max_tokens;
        }
        self.llm.context_limit = other.llm.context_limit;
    }

    /// Get the database path, using defaults if not configured.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(crate::default_db_path)
    }

    /// A copy safe to print: the API key is masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.llm.has_api_key() {
            copy.llm.api_key = Some(REDACTED.to_string());
        }
        copy
    }

    /// Render as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ExplorerError::invalid_argument(e.to_string()))
    }

    /// Write the default configuration to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists and `force` is false, or if the
    /// file cannot be written.
    pub fn write_default(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            return Err(ExplorerError::invalid_argument(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ExplorerError::path_error("create directory", parent, e))?;
        }

        std::fs::write(path, Self::default_config_content())
            .map_err(|e| ExplorerError::path_error("write config", path, e))?;
        info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Generate a default configuration file content.
    #[must_use]
    pub fn default_config_content() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.query.default_limit, 50);
        assert_eq!(config.query.max_limit, 1000);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert!(!config.llm.has_api_key());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed: Config = toml::from_str("[server]\nport = 9000\n").unwrap();
        assert_eq!(parsed.server.port, 9000);
        assert_eq!(parsed.server.host, "0.0.0.0");
        assert_eq!(parsed.llm.timeout_secs, 60);
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config::default();
        base.llm.api_key = Some("from-base".to_string());
        let mut other = Config::default();
        other.query.max_limit = 200;
        other.database.path = Some(PathBuf::from("/custom/path.db"));

        base.merge(other);

        assert_eq!(base.query.max_limit, 200);
        assert_eq!(base.db_path(), PathBuf::from("/custom/path.db"));
        assert_eq!(base.llm.api_key.as_deref(), Some("from-base"));
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("MX_DB", "/tmp/x.db"),
            ("MX_HOST", "127.0.0.1"),
            ("MX_PORT", "8123"),
            ("MX_LLM_MODEL", "local-model"),
            ("OPENAI_API_KEY", "sk-test"),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|k| vars.get(k).cloned());

        assert_eq!(config.db_path(), PathBuf::from("/tmp/x.db"));
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8123);
        assert_eq!(config.llm.model, "local-model");
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_env_overrides_ignore_bad_port_and_blank_values() {
        let vars = env(&[("MX_PORT", "not-a-port"), ("MX_HOST", "  ")]);
        let mut config = Config::default();
        config.apply_overrides(|k| vars.get(k).cloned());
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_specific_api_key_wins() {
        let vars = env(&[("OPENAI_API_KEY", "generic"), ("MX_LLM_API_KEY", "specific")]);
        let mut config = Config::default();
        config.apply_overrides(|k| vars.get(k).cloned());
        assert_eq!(config.llm.api_key.as_deref(), Some("specific"));
    }

    #[test]
    fn test_redacted_hides_key() {
        let mut config = Config::default();
        config.llm.api_key = Some("sk-secret".to_string());
        let shown = config.redacted().to_toml().unwrap();
        assert!(shown.contains(REDACTED));
        assert!(!shown.contains("sk-secret"));
    }

    #[test]
    fn test_read_file_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            Config::read_file(&missing),
            Err(ExplorerError::PathError { .. })
        ));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[server\nport = ").unwrap();
        assert!(matches!(
            Config::read_file(&broken),
            Err(ExplorerError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_write_default_refuses_overwrite() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        Config::write_default(&path, false).unwrap();
        assert!(Config::write_default(&path, false).is_err());
        Config::write_default(&path, true).unwrap();

        let loaded = Config::read_file(&path).unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn test_default_config_content() {
        let content = Config::default_config_content();
        assert!(content.contains("[server]"));
        assert!(content.contains("[query]"));
        assert!(content.contains("[llm]"));
    }
}
