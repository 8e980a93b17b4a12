//! Bootstrap configuration loading
//!
//! Configuration file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. User config file (`~/.config/laim/<module>.toml`)
//! 4. System config file (`/etc/laim/<module>.toml`)
//! 5. Built-in defaults (no file)
//!
//! The TOML file only carries raw values. Typed resolution (source names,
//! item types, environment overrides) happens in the consuming service.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change during runtime. The service must restart
/// to pick up changes to the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// HTTP bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Sync run configuration
    #[serde(default)]
    pub sync: SyncSection,

    /// Per-source connection settings
    #[serde(default)]
    pub sources: SourcesSection,

    /// Item type classification table
    #[serde(default)]
    pub classifier: ClassifierSection,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// `[sync]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSection {
    /// Whether the interval trigger runs
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Hours between interval-triggered runs
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,

    /// Source names, highest merge priority first
    #[serde(default = "default_priority")]
    pub priority: Vec<String>,

    /// Record errors kept in a job's error list; further ones are only counted
    #[serde(default = "default_max_record_errors_logged")]
    pub max_record_errors_logged: usize,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_hours: default_interval_hours(),
            priority: default_priority(),
            max_record_errors_logged: default_max_record_errors_logged(),
        }
    }
}

/// `[sources.*]` sections
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesSection {
    #[serde(default)]
    pub netdisco: Option<SourceSection>,
    #[serde(default)]
    pub librenms: Option<SourceSection>,
}

/// Connection settings for one external source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSection {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub verify_tls: bool,
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            base_url: None,
            username: None,
            password: None,
            api_token: None,
            requests_per_second: default_requests_per_second(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            timeout_secs: default_timeout_secs(),
            verify_tls: true,
        }
    }
}

/// `[classifier]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierSection {
    /// Ordered rules; empty means "use the built-in table"
    #[serde(default)]
    pub rules: Vec<ClassifierRuleEntry>,
}

/// One `[[classifier.rules]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierRuleEntry {
    pub pattern: String,
    pub item_type: String,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            port: default_port(),
            bind_address: default_bind_address(),
            logging: LoggingConfig::default(),
            sync: SyncSection::default(),
            sources: SourcesSection::default(),
            classifier: ClassifierSection::default(),
        }
    }
}

fn default_database_path() -> PathBuf {
    get_default_data_folder().join("laim.db")
}

fn default_port() -> u16 {
    5780
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_interval_hours() -> u64 {
    6
}

fn default_priority() -> Vec<String> {
    vec!["librenms".to_string(), "netdisco".to_string()]
}

fn default_max_record_errors_logged() -> usize {
    100
}

fn default_requests_per_second() -> f64 {
    10.0
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    30
}

/// Resolve the configuration file path for a module
///
/// Returns `None` when no file exists anywhere; callers fall back to
/// `TomlConfig::default()`.
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    module_name: &str,
) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let file_name = format!("{}.toml", module_name);

    // Priority 3: User config
    if let Some(user_config) = dirs::config_dir().map(|d| d.join("laim").join(&file_name)) {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    // Priority 4: System config
    let system_config = PathBuf::from("/etc/laim").join(&file_name);
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Load and parse a TOML configuration file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load configuration from the resolved path, or defaults when there is none
pub fn load_or_default(path: Option<&Path>) -> Result<TomlConfig> {
    match path {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            load_toml_config(path)
        }
        None => {
            tracing::info!("No configuration file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Get OS-dependent default data folder
fn get_default_data_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/laim (or /var/lib/laim for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("laim"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/laim"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("laim"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/laim"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("laim"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\laim"))
    } else {
        PathBuf::from("./laim_data")
    }
}
