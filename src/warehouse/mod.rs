// ABOUTME: Warehouse connectivity layer with a pluggable connector abstraction
// ABOUTME: Provides the SQL-over-HTTP client used to reach the remote data warehouse
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Warehouse Connectivity
//!
//! The remote data warehouse is reached through the [`WarehouseConnector`]
//! trait so the provisioning flow can be exercised against test doubles.
//! The production implementation speaks a JSON SQL API over HTTPS.

mod provisioner;
mod tools;

pub use provisioner::{CapabilityProvisioner, RemediationAction, ToolAccess, UnavailableReason};
pub use tools::WarehouseToolset;

use crate::config::environment::ConnectionParams;
use crate::database::WarehouseCredentials;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors raised by warehouse connectivity.
///
/// These never cross the provisioner boundary; they are converted into the
/// `Unavailable` result there.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// Required connection configuration is absent
    #[error("missing connection configuration: {0}")]
    Config(String),
    /// The warehouse rejected the supplied credentials
    #[error("authentication rejected: {0}")]
    Auth(String),
    /// The connection could not be established
    #[error("connection failed: {0}")]
    Connect(String),
    /// The connection attempt exceeded the bounded timeout
    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),
    /// A statement failed to execute
    #[error("query failed: {0}")]
    Query(String),
}

/// Tabular result of a warehouse statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in result order
    pub columns: Vec<String>,
    /// Row values as JSON scalars
    pub rows: Vec<Vec<Value>>,
}

/// An established, authenticated warehouse session
#[async_trait]
pub trait WarehouseSession: Send + Sync {
    /// Execute a SQL statement and return its tabular result
    async fn execute(&self, sql: &str) -> Result<QueryResult, WarehouseError>;
}

/// Factory for warehouse sessions.
///
/// `connect` must apply the supplied bounded timeout and surface timeouts
/// as [`WarehouseError::Timeout`].
#[async_trait]
pub trait WarehouseConnector: Send + Sync {
    /// Open an authenticated session against the warehouse
    async fn connect(
        &self,
        params: &ConnectionParams,
        credentials: &WarehouseCredentials,
        timeout: Duration,
    ) -> Result<Arc<dyn WarehouseSession>, WarehouseError>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    account: &'a str,
    database: &'a str,
    schema: &'a str,
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    database: &'a str,
    schema: &'a str,
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
}

/// Production connector speaking the warehouse's JSON SQL API
pub struct HttpWarehouseConnector {
    client: Client,
}

impl HttpWarehouseConnector {
    /// Create a new connector.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self, WarehouseError> {
        let client = Client::builder()
            .build()
            .map_err(|e| WarehouseError::Connect(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WarehouseConnector for HttpWarehouseConnector {
    async fn connect(
        &self,
        params: &ConnectionParams,
        credentials: &WarehouseCredentials,
        timeout: Duration,
    ) -> Result<Arc<dyn WarehouseSession>, WarehouseError> {
        let url = format!("{}/api/v1/sessions", params.base_url.trim_end_matches('/'));
        let request = LoginRequest {
            account: &params.account,
            database: &params.database,
            schema: &params.schema,
            username: &credentials.username,
            password: &credentials.password,
        };

        debug!(
            "Opening warehouse session: account={}, database={}, schema={}",
            params.account, params.database, params.schema
        );

        let send = self.client.post(&url).json(&request).send();
        let response = tokio::time::timeout(timeout, send)
            .await
            .map_err(|_| WarehouseError::Timeout(timeout))?
            .map_err(|e| WarehouseError::Connect(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(WarehouseError::Auth(
                "warehouse rejected the supplied credentials".to_owned(),
            ));
        }
        if !status.is_success() {
            return Err(WarehouseError::Connect(format!(
                "warehouse login returned {status}"
            )));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| WarehouseError::Connect(format!("invalid login response: {e}")))?;

        Ok(Arc::new(HttpWarehouseSession {
            client: self.client.clone(),
            base_url: params.base_url.trim_end_matches('/').to_owned(),
            token: login.token,
            database: params.database.clone(),
            schema: params.schema.clone(),
        }))
    }
}

/// Authenticated session over the JSON SQL API
struct HttpWarehouseSession {
    client: Client,
    base_url: String,
    token: String,
    database: String,
    schema: String,
}

#[async_trait]
impl WarehouseSession for HttpWarehouseSession {
    async fn execute(&self, sql: &str) -> Result<QueryResult, WarehouseError> {
        let url = format!("{}/api/v1/statements", self.base_url);
        let request = StatementRequest {
            statement: sql,
            database: &self.database,
            schema: &self.schema,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| WarehouseError::Query(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WarehouseError::Query(format!(
                "statement returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: StatementResponse = response
            .json()
            .await
            .map_err(|e| WarehouseError::Query(format!("invalid statement response: {e}")))?;

        Ok(QueryResult {
            columns: parsed.columns,
            rows: parsed.rows,
        })
    }
}
