//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: `PIPELINE_`, nested keys separated by `__`)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/api-pipeline/{service_name}/config.toml
//! 4. System directory: /etc/api-pipeline/{service_name}/config.toml
//! 5. Default values

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Prefix for environment overrides
const ENV_PREFIX: &str = "PIPELINE_";

/// Directory name used for XDG and system config lookups
const CONFIG_DIR: &str = "api-pipeline";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,

    /// Middleware configuration
    #[serde(default)]
    pub middleware: MiddlewareConfig,

    /// Caller-facing message configuration
    #[serde(default)]
    pub messages: MessagesConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error) or a full `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Environment (dev, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl ServiceConfig {
    /// Request timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Middleware configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// Header carrying the per-request trace identifier
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,

    /// Turn panics escaping the handler stack into error envelopes
    #[serde(default = "default_true")]
    pub catch_panic: bool,

    /// Maximum request body size in megabytes
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            request_id_header: default_request_id_header(),
            catch_panic: true,
            body_limit_mb: default_body_limit_mb(),
        }
    }
}

/// Caller-facing messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesConfig {
    /// Locale used when the caller's preference has no translation
    #[serde(default = "default_locale")]
    pub default_locale: String,

    /// Generic failure message keyed by lowercase language tag
    #[serde(default = "default_generic_failure")]
    pub generic_failure: HashMap<String, String>,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            default_locale: default_locale(),
            generic_failure: default_generic_failure(),
        }
    }
}

// Default value functions
fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_request_id_header() -> String {
    "x-request-id".to_string()
}

fn default_true() -> bool {
    true
}

fn default_body_limit_mb() -> usize {
    10
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_generic_failure() -> HashMap<String, String> {
    [
        ("en", "An unexpected error occurred. Please try again later."),
        ("es", "Se produjo un error inesperado. Inténtelo de nuevo más tarde."),
        ("fr", "Une erreur inattendue s'est produite. Veuillez réessayer plus tard."),
        ("pt", "Ocorreu um erro inesperado. Tente novamente mais tarde."),
    ]
    .into_iter()
    .map(|(locale, text)| (locale.to_string(), text.to_string()))
    .collect()
}

impl Config {
    /// Load configuration from all sources
    ///
    /// The service name is inferred from the binary name.
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| CONFIG_DIR.to_string());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut defaults = Config::default();
        defaults.service.name = service_name.to_string();
        let mut figment = Figment::new().merge(Serialized::defaults(defaults));

        // Lowest priority first so later files override earlier ones
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// Bypasses the XDG and system directories. Environment variables still
    /// take precedence over the file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Find all possible config file paths for a service, highest priority first
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix(CONFIG_DIR);
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Some(path) = xdg_dirs.find_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(
            PathBuf::from("/etc")
                .join(CONFIG_DIR)
                .join(service_name)
                .join("config.toml"),
        );

        paths
    }

    /// Request body limit in bytes
    pub fn body_limit_bytes(&self) -> usize {
        self.middleware.body_limit_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: CONFIG_DIR.to_string(),
                port: default_port(),
                log_level: default_log_level(),
                timeout_secs: default_timeout(),
                environment: default_environment(),
            },
            middleware: MiddlewareConfig::default(),
            messages: MessagesConfig::default(),
        }
    }
}
