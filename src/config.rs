use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_STORE_CITY: &str = "Asunción";
const DEFAULT_GATEWAY_API_URL: &str =
    "https://api.pagopar.com/api/comercios/2.0/iniciar-transaccion";
const DEFAULT_GATEWAY_CHECKOUT_URL: &str = "https://www.pagopar.com/pagos";

/// Payment gateway credentials and endpoints.
///
/// Both keys must be present for payment initiation and webhook verification
/// to run; when they are absent those operations refuse to proceed.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct GatewayConfig {
    /// Public (merchant) key sent with every transaction request
    #[serde(default)]
    pub public_key: Option<String>,

    /// Private key used to sign requests and verify callbacks
    #[serde(default)]
    pub private_key: Option<String>,

    /// Transaction-creation endpoint
    #[serde(default = "default_gateway_api_url")]
    #[validate(url)]
    pub api_url: String,

    /// Hosted checkout page; the transaction handle is appended to it
    #[serde(default = "default_gateway_checkout_url")]
    #[validate(url)]
    pub checkout_url: String,

    /// Public storefront URL the gateway sends the buyer back to
    #[serde(default)]
    pub return_base_url: Option<String>,

    /// Outbound request timeout (seconds)
    #[serde(default = "default_gateway_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            public_key: None,
            private_key: None,
            api_url: default_gateway_api_url(),
            checkout_url: default_gateway_checkout_url(),
            return_base_url: None,
            timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

impl GatewayConfig {
    /// Returns `(public_key, private_key)` when both are configured and non-blank.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let public = self.public_key.as_deref().map(str::trim)?;
        let private = self.private_key.as_deref().map(str::trim)?;
        if public.is_empty() || private.is_empty() {
            return None;
        }
        Some((public, private))
    }

    /// Private key alone; the webhook only needs this half.
    pub fn private_key(&self) -> Option<&str> {
        self.private_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1))]
    pub db_max_connections: u32,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Shared key required in the `x-admin-key` header for back-office routes
    #[serde(default)]
    pub admin_api_key: Option<String>,

    /// City recorded on orders collected at the store
    #[serde(default = "default_store_city")]
    #[validate(length(min = 2))]
    pub store_city: String,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Per-request timeout applied by the HTTP layer (seconds)
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,

    /// Payment gateway settings
    #[serde(default)]
    #[validate]
    pub gateway: GatewayConfig,
}

impl AppConfig {
    /// Creates a new configuration with defaults for everything else
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            db_max_connections: default_db_max_connections(),
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            admin_api_key: None,
            store_city: default_store_city(),
            cors_allowed_origins: None,
            request_timeout_secs: default_request_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            gateway: GatewayConfig::default(),
        }
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Parsed CORS origins, empty when none are configured
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let admin_key_set = self
            .admin_api_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false);
        if self.is_production() && !admin_key_set {
            let mut err = ValidationError::new("admin_api_key_required");
            err.message =
                Some("Set APP__ADMIN_API_KEY before running outside development".into());
            errors.add("admin_api_key", err);
        }

        let has_public = self.gateway.public_key.is_some();
        let has_private = self.gateway.private_key.is_some();
        if has_public != has_private {
            let mut err = ValidationError::new("gateway_keys_incomplete");
            err.message = Some(
                "APP__GATEWAY__PUBLIC_KEY and APP__GATEWAY__PRIVATE_KEY must be set together"
                    .into(),
            );
            errors.add("gateway", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    8
}

fn default_store_city() -> String {
    DEFAULT_STORE_CITY.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_gateway_api_url() -> String {
    DEFAULT_GATEWAY_API_URL.to_string()
}

fn default_gateway_checkout_url() -> String {
    DEFAULT_GATEWAY_CHECKOUT_URL.to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    30
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("tienda_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://tienda.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.clone())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    #[test]
    fn production_requires_admin_key() {
        let cfg = base_config();
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn production_with_admin_key_passes() {
        let mut cfg = base_config();
        cfg.admin_api_key = Some("k3y".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn gateway_keys_must_come_in_pairs() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        cfg.gateway.public_key = Some("pub".into());
        assert!(cfg.validate_additional_constraints().is_err());

        cfg.gateway.private_key = Some("priv".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn blank_keys_are_not_credentials() {
        let mut gateway = GatewayConfig::default();
        gateway.public_key = Some("pub".into());
        gateway.private_key = Some("   ".into());
        assert!(gateway.credentials().is_none());
        assert!(gateway.private_key().is_none());
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut cfg = base_config();
        cfg.log_level = "loud".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn splits_cors_origins() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://a.example, ,https://b.example".into());
        assert_eq!(
            cfg.cors_origins(),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }
}
