//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use std::{net::SocketAddr, path::PathBuf};
use wager_games::{
    SessionConfig,
    db::{DatabaseConfig, DatabaseConfigError},
};

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Where sessions and wallets live
    pub storage: StorageConfig,
    /// Session engine settings
    pub session: SessionConfig,
    /// Prometheus scrape address, if metrics are enabled
    pub metrics_bind: Option<SocketAddr>,
    /// JSON catalog replacing the bundled one
    pub catalog_path: Option<PathBuf>,
}

/// Storage backend selection
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Postgres(DatabaseConfig),
    /// Process-local storage; every unknown user starts with `starting_balance`
    InMemory { starting_balance: i64 },
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `database_url_override` - Optional database URL override (from CLI args)
    /// * `in_memory` - Use in-memory storage instead of PostgreSQL
    /// * `metrics_override` - Optional metrics bind address override (from CLI args)
    /// * `catalog_override` - Optional catalog path override (from CLI args)
    ///
    /// # Returns
    ///
    /// * `Result<ServerConfig, ConfigError>` - Loaded configuration or error
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(
        database_url_override: Option<String>,
        in_memory: bool,
        metrics_override: Option<SocketAddr>,
        catalog_override: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let in_memory = in_memory || parse_env_or("WG_IN_MEMORY", false);

        let storage = if in_memory {
            StorageConfig::InMemory {
                starting_balance: parse_env_or("WG_STARTING_BALANCE", 10_000),
            }
        } else {
            let database = match database_url_override {
                Some(url) => DatabaseConfig::from_env_with_url(url),
                None => DatabaseConfig::from_env(),
            };
            StorageConfig::Postgres(database?)
        };

        let metrics_bind = match metrics_override {
            Some(addr) => Some(addr),
            None => match std::env::var("METRICS_BIND") {
                Ok(value) => Some(value.parse().map_err(|_| ConfigError::Invalid {
                    var: "METRICS_BIND".to_string(),
                    reason: format!("'{value}' is not an IP:PORT address"),
                })?),
                Err(_) => None,
            },
        };

        let catalog_path =
            catalog_override.or_else(|| std::env::var("CATALOG_PATH").ok().map(PathBuf::from));

        Ok(ServerConfig {
            storage,
            session: SessionConfig::from_env(),
            metrics_bind,
            catalog_path,
        })
    }

    /// Validate configuration after loading
    ///
    /// # Returns
    ///
    /// * `Result<(), ConfigError>` - Success or validation error
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.storage {
            StorageConfig::Postgres(database) => {
                if database.max_connections == 0 {
                    return Err(ConfigError::Invalid {
                        var: "DB_MAX_CONNECTIONS".to_string(),
                        reason: "Must be greater than 0".to_string(),
                    });
                }
                if database.min_connections > database.max_connections {
                    return Err(ConfigError::Invalid {
                        var: "DB_MIN_CONNECTIONS".to_string(),
                        reason: format!(
                            "Cannot exceed max connections ({})",
                            database.max_connections
                        ),
                    });
                }
            }
            StorageConfig::InMemory { starting_balance } => {
                if *starting_balance < 0 {
                    return Err(ConfigError::Invalid {
                        var: "WG_STARTING_BALANCE".to_string(),
                        reason: "Must not be negative".to_string(),
                    });
                }
            }
        }

        self.session.validate().map_err(|reason| ConfigError::Invalid {
            var: "session".to_string(),
            reason,
        })
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

impl From<DatabaseConfigError> for ConfigError {
    fn from(err: DatabaseConfigError) -> Self {
        match err {
            DatabaseConfigError::MissingUrl => ConfigError::MissingRequired {
                var: "DATABASE_URL".to_string(),
                hint: "Pass --db-url or run with --in-memory".to_string(),
            },
            DatabaseConfigError::InvalidNumber { var, value } => ConfigError::Invalid {
                var: var.to_string(),
                reason: format!("'{value}' is not a valid number"),
            },
        }
    }
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
