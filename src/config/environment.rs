// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Handles environment variables, typed sub-configs, and runtime configuration parsing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Environment-based configuration management for production deployment

use crate::auth::{DEFAULT_LEEWAY_SECS, DEFAULT_TOKEN_TTL_SECS};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Strongly typed log level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error" => Self::Error,
            "warn" => Self::Warn,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => Self::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

/// Type-safe database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DatabaseUrl {
    /// SQLite database with file path
    SQLite { path: PathBuf },
    /// In-memory SQLite (for testing)
    Memory,
}

impl DatabaseUrl {
    /// Parse from string
    #[must_use]
    pub fn parse_url(s: &str) -> Self {
        let path_str = s.strip_prefix("sqlite:").unwrap_or(s);
        if path_str == ":memory:" {
            Self::Memory
        } else {
            Self::SQLite {
                path: PathBuf::from(path_str),
            }
        }
    }

    /// Convert to connection string
    #[must_use]
    pub fn to_connection_string(&self) -> String {
        match self {
            Self::SQLite { path } => format!("sqlite:{}", path.display()),
            Self::Memory => "sqlite::memory:".into(),
        }
    }
}

impl Default for DatabaseUrl {
    fn default() -> Self {
        Self::SQLite {
            path: PathBuf::from("./data/jordi.db"),
        }
    }
}

impl std::fmt::Display for DatabaseUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_connection_string())
    }
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (SQLite path or in-memory)
    pub url: DatabaseUrl,
}

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Process-wide JWT signing secret
    pub jwt_secret: String,
    /// Token time-to-live in seconds
    pub token_ttl_seconds: i64,
    /// Clock-skew leeway in seconds applied during expiry checks
    pub leeway_seconds: u64,
}

/// Warehouse connection parameters resolved from configuration.
///
/// All three identifiers are required before a connection attempt is made;
/// their absence is an operator-facing configuration fault.
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    pub account: String,
    pub database: String,
    pub schema: String,
    pub base_url: String,
}

/// Warehouse capability settings
#[derive(Debug, Clone, Default)]
pub struct WarehouseSettings {
    /// Warehouse account identifier
    pub account: Option<String>,
    /// Target database name
    pub database: Option<String>,
    /// Target schema name
    pub schema: Option<String>,
    /// Explicit API base URL; derived from the account when unset
    pub base_url: Option<String>,
    /// Process-wide service-account username fallback
    pub default_username: Option<String>,
    /// Process-wide service-account password fallback
    pub default_password: Option<String>,
    /// Bounded timeout applied to connection attempts
    pub connect_timeout_secs: u64,
    /// URL the remediation action points users at for interactive login
    pub login_url: String,
}

impl WarehouseSettings {
    /// Resolve the required connection parameters, or `None` when any are
    /// missing from configuration.
    #[must_use]
    pub fn connection_params(&self) -> Option<ConnectionParams> {
        let account = self.account.as_deref()?.to_owned();
        let database = self.database.as_deref()?.to_owned();
        let schema = self.schema.as_deref()?.to_owned();
        let base_url = self.base_url.clone().unwrap_or_else(|| {
            format!("https://{account}.snowflakecomputing.com")
        });
        Some(ConnectionParams {
            account,
            database,
            schema,
            base_url,
        })
    }
}

/// Agent (LLM) provider configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Base URL of the OpenAI-compatible chat completions API
    pub base_url: String,
    /// API key, optional for local servers
    pub api_key: Option<String>,
}

/// Server configuration loaded from the environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP API port
    pub http_port: u16,
    /// Log level
    pub log_level: LogLevel,
    /// Externally visible base URL for links handed to users
    pub public_url: String,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Authentication configuration
    pub auth: AuthConfig,
    /// Warehouse capability settings
    pub warehouse: WarehouseSettings,
    /// Agent provider configuration
    pub agent: AgentConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when a required setting (`JWT_SECRET`) is missing
    /// or a numeric setting cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let http_port = parse_env_or("HTTP_PORT", 8081_u16)?;
        let log_level = LogLevel::from_str_or_default(
            &env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        );
        let public_url =
            env::var("PUBLIC_URL").unwrap_or_else(|_| format!("http://localhost:{http_port}"));

        let database = DatabaseConfig {
            url: DatabaseUrl::parse_url(
                &env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./data/jordi.db".into()),
            ),
        };

        let auth = AuthConfig {
            jwt_secret: env::var("JWT_SECRET")
                .context("JWT_SECRET environment variable is required")?,
            token_ttl_seconds: parse_env_or("TOKEN_TTL_SECONDS", DEFAULT_TOKEN_TTL_SECS)?,
            leeway_seconds: parse_env_or("TOKEN_LEEWAY_SECONDS", DEFAULT_LEEWAY_SECS)?,
        };

        let warehouse = WarehouseSettings {
            account: env_opt("WAREHOUSE_ACCOUNT"),
            database: env_opt("WAREHOUSE_DATABASE"),
            schema: env_opt("WAREHOUSE_SCHEMA"),
            base_url: env_opt("WAREHOUSE_BASE_URL"),
            default_username: env_opt("WAREHOUSE_USERNAME"),
            default_password: env_opt("WAREHOUSE_PASSWORD"),
            connect_timeout_secs: parse_env_or("WAREHOUSE_CONNECT_TIMEOUT_SECS", 10_u64)?,
            login_url: env::var("WAREHOUSE_LOGIN_URL")
                .unwrap_or_else(|_| format!("{public_url}/warehouse/login")),
        };

        let agent = AgentConfig {
            base_url: env::var("AGENT_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            api_key: env_opt("AGENT_API_KEY").or_else(|| env_opt("OPENAI_API_KEY")),
        };

        Ok(Self {
            http_port,
            log_level,
            public_url,
            database,
            auth,
            warehouse,
            agent,
        })
    }

    /// Secret-free summary of the effective configuration for startup logs
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "http_port={}, log_level={}, database={}, token_ttl={}s, warehouse_configured={}, warehouse_service_account={}, agent_base_url={}",
            self.http_port,
            self.log_level,
            self.database.url,
            self.auth.token_ttl_seconds,
            self.warehouse.connection_params().is_some(),
            self.warehouse.default_username.is_some(),
            self.agent.base_url,
        )
    }
}

/// Read an optional environment variable, treating empty values as unset
fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an environment variable with a default fallback
fn parse_env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("Failed to parse {key}={value}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_database_url_parsing() {
        assert!(matches!(
            DatabaseUrl::parse_url("sqlite::memory:"),
            DatabaseUrl::Memory
        ));
        assert!(matches!(
            DatabaseUrl::parse_url("sqlite:./data/jordi.db"),
            DatabaseUrl::SQLite { .. }
        ));
        assert_eq!(
            DatabaseUrl::Memory.to_connection_string(),
            "sqlite::memory:"
        );
    }

    #[test]
    fn test_connection_params_require_all_identifiers() {
        let mut settings = WarehouseSettings {
            account: Some("acme-prod".into()),
            database: Some("NEO".into()),
            ..WarehouseSettings::default()
        };
        assert!(settings.connection_params().is_none());

        settings.schema = Some("PUBLIC".into());
        let params = settings.connection_params().unwrap();
        assert_eq!(params.base_url, "https://acme-prod.snowflakecomputing.com");
    }
}
