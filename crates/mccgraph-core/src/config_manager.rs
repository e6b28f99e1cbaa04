use crate::{CredentialContext, Credentials, HierarchyError};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

const LOCAL_CONFIG_FILE: &str = ".mccgraph.toml";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for MccGraph
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MccGraphConfig {
    /// Hierarchy traversal settings
    #[serde(default)]
    pub traversal: TraversalSettings,

    /// Platform credentials (secrets are never written back out)
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which traversal preset to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TraversalStrategy {
    /// Recursive descent with a detail lookup per discovered account.
    #[default]
    Deep,
    /// One listing per entry-point manager, immediate clients only.
    Flat,
}

impl TraversalStrategy {
    pub fn default_max_depth(self) -> usize {
        match self {
            TraversalStrategy::Deep => 10,
            TraversalStrategy::Flat => 1,
        }
    }
}

impl FromStr for TraversalStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deep" => Ok(TraversalStrategy::Deep),
            "flat" => Ok(TraversalStrategy::Flat),
            other => Err(ConfigError::ValidationError(format!(
                "unknown traversal strategy '{other}' (expected 'deep' or 'flat')"
            ))),
        }
    }
}

impl std::fmt::Display for TraversalStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraversalStrategy::Deep => write!(f, "deep"),
            TraversalStrategy::Flat => write!(f, "flat"),
        }
    }
}

/// Traversal configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversalSettings {
    /// "deep" or "flat"
    #[serde(default)]
    pub strategy: TraversalStrategy,

    /// Overrides the strategy's depth (deep = 10, flat = 1)
    #[serde(default)]
    pub max_depth: Option<usize>,

    /// Overall run budget; partial results are returned when it runs out
    #[serde(default = "default_run_budget_ms")]
    pub run_budget_ms: u64,

    /// Timeout applied to every single directory call
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Sibling branches expanded at once (1 = deterministic depth-first)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl TraversalSettings {
    pub fn effective_max_depth(&self) -> usize {
        self.max_depth
            .unwrap_or_else(|| self.strategy.default_max_depth())
    }
}

impl Default for TraversalSettings {
    fn default() -> Self {
        Self {
            strategy: TraversalStrategy::default(),
            max_depth: None,
            run_budget_ms: default_run_budget_ms(),
            call_timeout_ms: default_call_timeout_ms(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

/// Credential configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing)]
    pub client_secret: Option<SecretString>,

    #[serde(default, skip_serializing)]
    pub refresh_token: Option<SecretString>,

    #[serde(default, skip_serializing)]
    pub developer_token: Option<SecretString>,

    /// Optional operator-level login customer ("xxx-xxx-xxxx" accepted)
    #[serde(default)]
    pub login_customer_id: Option<String>,
}

impl CredentialsConfig {
    /// Builds the initial credential context for a traversal.
    pub fn to_context(&self) -> Result<CredentialContext, HierarchyError> {
        let missing = |field: &str, env: &str| {
            HierarchyError::SetupFailure(format!(
                "missing credential '{field}' (set [credentials].{field} or {env})"
            ))
        };
        let client_id = self
            .client_id
            .as_deref()
            .ok_or_else(|| missing("client_id", "GOOGLE_ADS_CLIENT_ID"))?;
        let client_secret = self
            .client_secret
            .as_ref()
            .ok_or_else(|| missing("client_secret", "GOOGLE_ADS_CLIENT_SECRET"))?;
        let refresh_token = self
            .refresh_token
            .as_ref()
            .ok_or_else(|| missing("refresh_token", "GOOGLE_ADS_REFRESH_TOKEN"))?;
        let developer_token = self
            .developer_token
            .as_ref()
            .ok_or_else(|| missing("developer_token", "GOOGLE_ADS_DEVELOPER_TOKEN"))?;

        let credentials =
            Credentials::from_secrets(client_id, client_secret, refresh_token, developer_token)?;

        match self.login_customer_id.as_deref() {
            Some(login) => CredentialContext::with_login_customer(credentials, login),
            None => Ok(CredentialContext::new(credentials)),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.client_id.is_some()
            && self.client_secret.is_some()
            && self.refresh_token.is_some()
            && self.developer_token.is_some()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_run_budget_ms() -> u64 {
    60_000
}
fn default_call_timeout_ms() -> u64 {
    10_000
}
fn default_max_concurrency() -> usize {
    1
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Configuration manager with file discovery and environment overrides
#[derive(Debug)]
pub struct ConfigManager {
    config: MccGraphConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.mccgraph.toml)
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        info!("Loading MccGraph configuration");

        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        Self::finish(config, config_path)
    }

    /// Load from an explicit file; a missing file is an error here.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Self::load_dotenv();

        let config = Self::read_toml_file(path)?;
        Self::finish(config, Some(path.to_path_buf()))
    }

    fn finish(config: MccGraphConfig, config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        match config_path {
            Some(ref path) => info!(path = %path.display(), "Config file loaded"),
            None => info!("No config file found, using defaults"),
        }
        info!(
            strategy = %config.traversal.strategy,
            max_depth = config.traversal.effective_max_depth(),
            run_budget_ms = config.traversal.run_budget_ms,
            max_concurrency = config.traversal.max_concurrency,
            credentials = config.credentials.is_complete(),
            "Configuration loaded"
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load .env file if it exists
    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            }
            return;
        }

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".mccgraph.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .mccgraph.env: {}", e);
                }
            }
        }
    }

    /// Find and load config file
    /// Search order:
    /// 1. ./.mccgraph.toml (current directory)
    /// 2. ~/.mccgraph/config.toml (user config)
    /// 3. Use defaults
    fn load_config_file() -> Result<(MccGraphConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(user_config) = Self::user_config_path() {
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        Ok((MccGraphConfig::default(), None))
    }

    pub fn user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".mccgraph").join("config.toml"))
    }

    fn read_toml_file(path: &Path) -> Result<MccGraphConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let config: MccGraphConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(config: MccGraphConfig) -> MccGraphConfig {
        Self::apply_overrides(config, |key| std::env::var(key).ok())
    }

    pub fn apply_overrides<F>(mut config: MccGraphConfig, lookup: F) -> MccGraphConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        // Traversal
        if let Some(strategy) = lookup("MCCGRAPH_STRATEGY") {
            match strategy.parse() {
                Ok(strategy) => config.traversal.strategy = strategy,
                Err(e) => warn!("Ignoring MCCGRAPH_STRATEGY: {}", e),
            }
        }
        if let Some(depth) = lookup("MCCGRAPH_MAX_DEPTH") {
            match depth.parse() {
                Ok(depth) => config.traversal.max_depth = Some(depth),
                Err(_) => warn!("Ignoring non-numeric MCCGRAPH_MAX_DEPTH: {}", depth),
            }
        }
        if let Some(budget) = lookup("MCCGRAPH_RUN_BUDGET_MS") {
            if let Ok(budget) = budget.parse() {
                config.traversal.run_budget_ms = budget;
            }
        }
        if let Some(timeout) = lookup("MCCGRAPH_CALL_TIMEOUT_MS") {
            if let Ok(timeout) = timeout.parse() {
                config.traversal.call_timeout_ms = timeout;
            }
        }
        if let Some(concurrency) = lookup("MCCGRAPH_MAX_CONCURRENCY") {
            if let Ok(concurrency) = concurrency.parse() {
                config.traversal.max_concurrency = concurrency;
            }
        }

        // Credentials
        if let Some(client_id) = lookup("GOOGLE_ADS_CLIENT_ID") {
            config.credentials.client_id = Some(client_id);
        }
        if let Some(secret) = lookup("GOOGLE_ADS_CLIENT_SECRET") {
            config.credentials.client_secret = Some(SecretString::from(secret));
        }
        if let Some(token) = lookup("GOOGLE_ADS_REFRESH_TOKEN") {
            config.credentials.refresh_token = Some(SecretString::from(token));
        }
        if let Some(token) = lookup("GOOGLE_ADS_DEVELOPER_TOKEN") {
            config.credentials.developer_token = Some(SecretString::from(token));
        }
        if let Some(login) = lookup("GOOGLE_ADS_LOGIN_CUSTOMER_ID") {
            config.credentials.login_customer_id = Some(login);
        }

        // Logging
        if let Some(level) = lookup("MCCGRAPH_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(format) = lookup("MCCGRAPH_LOG_FORMAT") {
            config.logging.format = format;
        }

        config
    }

    pub fn validate_config(config: &MccGraphConfig) -> Result<(), ConfigError> {
        let traversal = &config.traversal;
        if traversal.max_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "traversal.max_concurrency must be at least 1".to_string(),
            ));
        }
        if traversal.run_budget_ms == 0 {
            return Err(ConfigError::ValidationError(
                "traversal.run_budget_ms must be greater than 0".to_string(),
            ));
        }
        if traversal.call_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "traversal.call_timeout_ms must be greater than 0".to_string(),
            ));
        }

        let level = config.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level: {}. Must be one of: {}",
                config.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }
        let format = config.logging.format.to_ascii_lowercase();
        if !LOG_FORMATS.contains(&format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log format: {}. Must be one of: {}",
                config.logging.format,
                LOG_FORMATS.join(", ")
            )));
        }

        Ok(())
    }

    pub fn config(&self) -> &MccGraphConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Create a default config file
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = MccGraphConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::ReadError(e.to_string()))?;
            }
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}
