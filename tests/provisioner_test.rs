// ABOUTME: Integration tests for the warehouse capability provisioner
// ABOUTME: Covers credential fallback, configuration faults, and remediation actions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::{AcceptingConnector, RejectingConnector, ScriptedAgent};
use jordi_chat_server::warehouse::{CapabilityProvisioner, ToolAccess, UnavailableReason};
use std::sync::atomic::Ordering;
use std::sync::Arc;

async fn provisioner_with(
    connector: Arc<dyn jordi_chat_server::warehouse::WarehouseConnector>,
    settings: jordi_chat_server::config::WarehouseSettings,
) -> (CapabilityProvisioner, Arc<jordi_chat_server::database::Database>) {
    let database = common::create_test_database().await;
    let provisioner = CapabilityProvisioner::new(Arc::clone(&database), connector, settings);
    (provisioner, database)
}

#[tokio::test]
async fn test_connect_failure_returns_unavailable_with_identity() {
    let connector = Arc::new(RejectingConnector::default());
    let mut settings = common::warehouse_settings();
    settings.default_username = Some("svc".into());
    settings.default_password = Some("svc-pass".into());

    let (provisioner, _db) = provisioner_with(connector.clone(), settings).await;
    let agent = ScriptedAgent::replying("ok");
    let handle = common::test_agent_handle(&agent);

    let access = provisioner.provision("A@X.com", &handle).await;

    match access {
        ToolAccess::Unavailable {
            reason,
            remediation,
        } => {
            assert_eq!(reason, UnavailableReason::ConnectFailed);
            let remediation = remediation.expect("connect failure must carry a remediation");
            // The remediation carries the normalized identity unchanged
            assert_eq!(remediation.email, "a@x.com");
            assert_eq!(remediation.label, "Go to Warehouse Login");
            assert!(!remediation.target_url.is_empty());
        }
        ToolAccess::Available(_) => panic!("rejecting connector must not provision"),
    }
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_configuration_skips_network_call() {
    let connector = Arc::new(RejectingConnector::default());
    let mut settings = common::warehouse_settings();
    settings.account = None;
    settings.default_username = Some("svc".into());
    settings.default_password = Some("svc-pass".into());

    let (provisioner, _db) = provisioner_with(connector.clone(), settings).await;
    let agent = ScriptedAgent::replying("ok");
    let handle = common::test_agent_handle(&agent);

    let access = provisioner.provision("a@x.com", &handle).await;

    match access {
        ToolAccess::Unavailable {
            reason,
            remediation,
        } => {
            assert_eq!(reason, UnavailableReason::MissingConfiguration);
            // Operator-facing fault: silently disabled, no user remediation
            assert!(remediation.is_none());
        }
        ToolAccess::Available(_) => panic!("missing configuration must not provision"),
    }
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_no_identity_returns_unavailable() {
    let connector = Arc::new(RejectingConnector::default());
    let (provisioner, _db) = provisioner_with(connector.clone(), common::warehouse_settings()).await;
    let agent = ScriptedAgent::replying("ok");
    let handle = common::test_agent_handle(&agent);

    let access = provisioner.provision("   ", &handle).await;

    match access {
        ToolAccess::Unavailable { reason, .. } => {
            assert_eq!(reason, UnavailableReason::NoIdentity);
        }
        ToolAccess::Available(_) => panic!("empty identity must not provision"),
    }
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_credentials_yield_remediation_without_connecting() {
    // No stored row and no service-account fallback configured
    let connector = Arc::new(RejectingConnector::default());
    let (provisioner, _db) = provisioner_with(connector.clone(), common::warehouse_settings()).await;
    let agent = ScriptedAgent::replying("ok");
    let handle = common::test_agent_handle(&agent);

    let access = provisioner.provision("a@x.com", &handle).await;

    match access {
        ToolAccess::Unavailable {
            reason,
            remediation,
        } => {
            assert_eq!(reason, UnavailableReason::CredentialsMissing);
            assert_eq!(remediation.unwrap().email, "a@x.com");
        }
        ToolAccess::Available(_) => panic!("no credentials must not provision"),
    }
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_service_account_fallback_used_when_no_personal_row() {
    let connector = Arc::new(AcceptingConnector::default());
    let mut settings = common::warehouse_settings();
    settings.default_username = Some("shared_svc".into());
    settings.default_password = Some("svc-pass".into());

    let (provisioner, _db) = provisioner_with(connector.clone(), settings).await;
    let agent = ScriptedAgent::replying("ok");
    let handle = common::test_agent_handle(&agent);

    let access = provisioner.provision("a@x.com", &handle).await;

    assert!(access.is_available());
    assert_eq!(
        connector.last_username.lock().unwrap().as_deref(),
        Some("shared_svc")
    );
}

#[tokio::test]
async fn test_personal_credentials_preferred_over_service_account() {
    let connector = Arc::new(AcceptingConnector::default());
    let mut settings = common::warehouse_settings();
    settings.default_username = Some("shared_svc".into());
    settings.default_password = Some("svc-pass".into());

    let (provisioner, database) = provisioner_with(connector.clone(), settings).await;
    database
        .upsert_warehouse_credentials("a@x.com", "personal_user", "personal-pass")
        .await
        .unwrap();

    let agent = ScriptedAgent::replying("ok");
    let handle = common::test_agent_handle(&agent);

    let access = provisioner.provision("a@x.com", &handle).await;

    assert!(access.is_available());
    assert_eq!(
        connector.last_username.lock().unwrap().as_deref(),
        Some("personal_user")
    );
}
