//! Application configuration.

use serde::Deserialize;
use std::path::Path;

use crate::error::AppError;

/// Minimum length, in bytes, of the identity salt and the token secret.
pub const MIN_SECRET_LEN: usize = 16;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Participant identity configuration.
    pub identity: IdentityConfig,
    /// Admin capability configuration.
    pub auth: AuthConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Participant identity configuration.
///
/// The salt has no default; [`Config::validate`] fails when it is unset.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Salt keying the participant address hash.
    #[serde(default)]
    pub salt: String,
}

/// Admin token configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Secret used to sign admin tokens.
    #[serde(default)]
    pub token_secret: String,
    /// Admin token lifetime in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: i64,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

const fn default_token_ttl() -> i64 {
    86_400
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `TALLY_ENV`)
    /// 4. Environment variables with `TALLY__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("TALLY_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("TALLY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("TALLY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Reject configurations that would run with missing or weak secrets.
    pub fn validate(&self) -> Result<(), AppError> {
        check_secret("identity.salt", &self.identity.salt)?;
        check_secret("auth.token_secret", &self.auth.token_secret)?;
        if self.auth.token_ttl_secs <= 0 {
            return Err(AppError::Config(
                "auth.token_ttl_secs must be positive".to_string(),
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(AppError::Config(
                "database.min_connections exceeds database.max_connections".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_secret(name: &str, value: &str) -> Result<(), AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Config(format!("{name} must be set")));
    }
    if value.len() < MIN_SECRET_LEN {
        return Err(AppError::Config(format!(
            "{name} must be at least {MIN_SECRET_LEN} bytes"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: "postgres://localhost/tally".to_string(),
                max_connections: 10,
                min_connections: 1,
            },
            identity: IdentityConfig {
                salt: "0123456789abcdef-salt".to_string(),
            },
            auth: AuthConfig {
                token_secret: "0123456789abcdef-secret".to_string(),
                token_ttl_secs: 3600,
            },
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_missing_salt_fails_fast() {
        let mut config = valid_config();
        config.identity.salt = "   ".to_string();
        match config.validate() {
            Err(AppError::Config(msg)) => assert!(msg.contains("identity.salt")),
            other => panic!("Expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_short_token_secret_rejected() {
        let mut config = valid_config();
        config.auth.token_secret = "short".to_string();
        match config.validate() {
            Err(AppError::Config(msg)) => assert!(msg.contains("auth.token_secret")),
            other => panic!("Expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_pool_bounds_checked() {
        let mut config = valid_config();
        config.database.min_connections = 20;
        assert!(config.validate().is_err());
    }
}
