//! Application configuration
//!
//! Loaded from `config/<env>.yaml`, then selected keys are overridden from
//! the environment:
//!
//! | Variable       | Key                |
//! |----------------|--------------------|
//! | `POSTGRES_URL` | `postgres_url`     |
//! | `TOKEN_SECRET` | `token.secret`     |
//! | `GATEWAY_PORT` | `gateway.port`     |

use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    /// Level for sqlx statement logging
    #[serde(default = "default_sqlx_log_level")]
    pub sqlx_log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    /// PostgreSQL connection URL; in-process storage when absent
    #[serde(default)]
    pub postgres_url: Option<String>,
    pub token: TokenConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenConfig {
    /// HMAC secret, at least 32 characters
    pub secret: String,
    #[serde(default = "default_token_claim")]
    pub issuer: String,
    #[serde(default = "default_token_claim")]
    pub audience: String,
    #[serde(default = "default_access_token_duration_secs")]
    pub access_token_duration_secs: i64,
}

fn default_sqlx_log_level() -> String {
    "warn".to_string()
}

fn default_token_claim() -> String {
    "ledger-bank".to_string()
}

fn default_access_token_duration_secs() -> i64 {
    15 * 60
}

impl TokenConfig {
    pub fn access_token_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.access_token_duration_secs)
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        let mut config = Self::from_yaml_str(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply overrides from a variable lookup (`std::env::var` in production)
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("POSTGRES_URL").filter(|v| !v.is_empty()) {
            self.postgres_url = Some(url);
        }
        if let Some(secret) = lookup("TOKEN_SECRET").filter(|v| !v.is_empty()) {
            self.token.secret = secret;
        }
        if let Some(port) = lookup("GATEWAY_PORT") {
            self.gateway.port = port.parse().map_err(|e| ConfigError::Invalid {
                key: "GATEWAY_PORT",
                message: format!("{}: {}", port, e),
            })?;
        }
        Ok(())
    }

    /// Filter directive combining the app level and the sqlx level
    pub fn log_filter(&self) -> String {
        format!("{},sqlx={}", self.log_level, self.sqlx_log_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const YAML: &str = r#"
log_level: info
log_dir: ./logs
log_file: ledger.log
use_json: false
rotation: daily
gateway:
  host: 127.0.0.1
  port: 8080
token:
  secret: "01234567890123456789012345678901"
"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = AppConfig::from_yaml_str(YAML).unwrap();
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.postgres_url, None);
        assert_eq!(config.sqlx_log_level, "warn");
        assert_eq!(config.token.issuer, "ledger-bank");
        assert_eq!(config.token.access_token_duration().num_minutes(), 15);
        assert_eq!(config.log_filter(), "info,sqlx=warn");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::from_yaml_str(YAML).unwrap();
        let vars: HashMap<&str, &str> = [
            ("POSTGRES_URL", "postgres://bank@localhost/bank"),
            ("TOKEN_SECRET", "abcdefghijabcdefghijabcdefghijab"),
            ("GATEWAY_PORT", "9090"),
        ]
        .into_iter()
        .collect();

        config
            .apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(
            config.postgres_url.as_deref(),
            Some("postgres://bank@localhost/bank")
        );
        assert_eq!(config.token.secret, "abcdefghijabcdefghijabcdefghijab");
        assert_eq!(config.gateway.port, 9090);
    }

    #[test]
    fn test_bad_port_override() {
        let mut config = AppConfig::from_yaml_str(YAML).unwrap();
        let err = config
            .apply_env_overrides(|k| (k == "GATEWAY_PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "GATEWAY_PORT", .. }));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            AppConfig::load("does-not-exist"),
            Err(ConfigError::Read { .. })
        ));
    }
}
