//! API configuration
//!
//! Loaded from an optional `config/payments` file and `API_*` environment
//! variables, environment winning. Nested sections use a double underscore:
//!
//! ```text
//! API_PORT=8080
//! API_JWT_SECRET=...
//! API_DATABASE__URL=postgres://payments@db/payments
//! API_GATEWAY__KEY_ID=rzp_live_...
//! API_GATEWAY__KEY_SECRET=...
//! API_SWEEPER__INTERVAL_SECS=120
//! ```

use secrecy::SecretString;
use serde::Deserialize;

use domain_payments::{GatewayConfig, SweeperConfig};
use infra_db::DatabaseConfig;

const DEFAULT_JWT_SECRET: &str = "change-me-in-production";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// API configuration
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// JWT secret for authentication
    pub jwt_secret: SecretString,
    /// JWT expiration in seconds
    pub jwt_expiration_secs: u64,
    /// Log level, overridden by `RUST_LOG`
    pub log_level: String,
    pub log_format: LogFormat,
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub sweeper: SweeperConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            jwt_secret: SecretString::new(DEFAULT_JWT_SECRET.to_string()),
            jwt_expiration_secs: 3600,
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            database: DatabaseConfig::default(),
            gateway: GatewayConfig::default(),
            sweeper: SweeperConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Loads configuration from the optional file and the environment
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("config/payments").required(false))
            .add_source(
                config::Environment::with_prefix("API")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// True while the JWT secret is still the shipped placeholder
    pub fn uses_default_jwt_secret(&self) -> bool {
        use secrecy::ExposeSecret;
        self.jwt_secret.expose_secret() == DEFAULT_JWT_SECRET
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
        assert!(config.uses_default_jwt_secret());
        assert!(!config.gateway.enabled);
        assert!(config.sweeper.enabled);
    }

    #[test]
    fn test_nested_sections_deserialize() {
        let config: ApiConfig = serde_json::from_value(serde_json::json!({
            "port": 9090,
            "jwt_secret": "s3cret",
            "log_format": "json",
            "gateway": {
                "enabled": true,
                "key_id": "rzp_test_1DP5mmOlF5G5ag",
                "key_secret": "thisissupersecret",
                "order_expiry_minutes": 15
            },
            "sweeper": { "interval_secs": 30 }
        }))
        .unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(!config.uses_default_jwt_secret());
        assert!(config.gateway.is_configured());
        assert_eq!(config.gateway.order_expiry_minutes, 15);
        assert_eq!(config.sweeper.interval_secs, 30);
        assert_eq!(config.host, "0.0.0.0");
    }
}
