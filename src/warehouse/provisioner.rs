// ABOUTME: Capability provisioner gating the warehouse toolset behind stored credentials
// ABOUTME: Converts every credential/connection failure into an explicit ToolAccess result
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Capability Provisioner
//!
//! Turns an identity into a live warehouse toolset, or an explicit
//! `Unavailable` result carrying a remediation action. Store and warehouse
//! faults are caught here and never propagate as raw errors into the
//! session orchestrator; only the result variants cross this boundary.

use super::{WarehouseConnector, WarehouseToolset};
use crate::agent::AgentHandle;
use crate::config::WarehouseSettings;
use crate::database::{Database, WarehouseCredentials};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Why the warehouse capability could not be provisioned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// No identity was supplied
    NoIdentity,
    /// Required connection parameters are missing from configuration
    MissingConfiguration,
    /// Neither personal nor service-account credentials are available
    CredentialsMissing,
    /// The connection attempt failed or timed out
    ConnectFailed,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoIdentity => write!(f, "no identity"),
            Self::MissingConfiguration => write!(f, "missing configuration"),
            Self::CredentialsMissing => write!(f, "credentials missing"),
            Self::ConnectFailed => write!(f, "connect failed"),
        }
    }
}

/// Structured instruction for resolving an unavailable capability.
///
/// The presentation layer renders this as a redirect/button; the core never
/// renders UI itself. The identity travels with the action so the login
/// flow can attribute stored credentials correctly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationAction {
    /// Button/link label
    pub label: String,
    /// Where the user should be sent
    pub target_url: String,
    /// Identity the remediation is for
    pub email: String,
}

/// Result of a provisioning attempt
pub enum ToolAccess {
    /// The toolset is live and bound to a connection
    Available(Arc<WarehouseToolset>),
    /// The capability could not be provisioned
    Unavailable {
        reason: UnavailableReason,
        remediation: Option<RemediationAction>,
    },
}

impl ToolAccess {
    /// Convenience predicate for pattern-free call sites
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

/// Provisions the warehouse toolset for a session
pub struct CapabilityProvisioner {
    database: Arc<Database>,
    connector: Arc<dyn WarehouseConnector>,
    settings: WarehouseSettings,
}

impl CapabilityProvisioner {
    /// Create a provisioner over a credential store and connector
    #[must_use]
    pub fn new(
        database: Arc<Database>,
        connector: Arc<dyn WarehouseConnector>,
        settings: WarehouseSettings,
    ) -> Self {
        Self {
            database,
            connector,
            settings,
        }
    }

    /// Attempt to provision the warehouse toolset for an identity.
    ///
    /// Never returns an error: every failure mode is expressed as an
    /// `Unavailable` variant. Configuration faults are operator-facing and
    /// carry no remediation (the capability is silently disabled); missing
    /// or rejected credentials carry a remediation action pointing the user
    /// at the warehouse login flow.
    pub async fn provision(&self, email: &str, agent: &AgentHandle) -> ToolAccess {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            warn!("Warehouse provisioning requested without an identity");
            return ToolAccess::Unavailable {
                reason: UnavailableReason::NoIdentity,
                remediation: None,
            };
        }

        let credentials = match self.database.lookup_warehouse_credentials(&email).await {
            Some(found) => {
                info!("Using personal warehouse credentials for {email}");
                found
            }
            None => match self.service_account_credentials(&email) {
                Some(fallback) => {
                    info!(
                        "No personal warehouse credentials on file for {email}, \
                         falling back to service-account credentials"
                    );
                    fallback
                }
                None => {
                    info!("No warehouse credentials available for {email}");
                    return ToolAccess::Unavailable {
                        reason: UnavailableReason::CredentialsMissing,
                        remediation: Some(self.remediation(&email)),
                    };
                }
            },
        };

        let Some(params) = self.settings.connection_params() else {
            error!(
                "Warehouse connection parameters missing (account/database/schema); \
                 capability disabled"
            );
            return ToolAccess::Unavailable {
                reason: UnavailableReason::MissingConfiguration,
                remediation: None,
            };
        };

        let timeout = Duration::from_secs(self.settings.connect_timeout_secs);
        match self.connector.connect(&params, &credentials, timeout).await {
            Ok(session) => {
                info!("Warehouse toolset provisioned for {email}");
                ToolAccess::Available(Arc::new(WarehouseToolset::new(
                    session,
                    agent.clone(),
                    params.schema,
                )))
            }
            Err(e) => {
                warn!("Warehouse connection failed for {email}: {e}");
                ToolAccess::Unavailable {
                    reason: UnavailableReason::ConnectFailed,
                    remediation: Some(self.remediation(&email)),
                }
            }
        }
    }

    fn service_account_credentials(&self, email: &str) -> Option<WarehouseCredentials> {
        let username = self.settings.default_username.clone()?;
        let password = self.settings.default_password.clone()?;
        Some(WarehouseCredentials {
            email: email.to_owned(),
            username,
            password,
        })
    }

    fn remediation(&self, email: &str) -> RemediationAction {
        RemediationAction {
            label: "Go to Warehouse Login".to_owned(),
            target_url: self.settings.login_url.clone(),
            email: email.to_owned(),
        }
    }
}
