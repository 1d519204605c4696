// ABOUTME: Warehouse login endpoint implementing the verify-then-store credential flow
// ABOUTME: Opens a live connection with the submitted credentials before persisting them
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::AppState;
use crate::database::WarehouseCredentials;
use crate::errors::{AppError, ErrorCode};
use crate::warehouse::WarehouseError;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// Request body for the warehouse login flow
#[derive(Debug, Deserialize)]
pub struct WarehouseLoginRequest {
    /// Identity assertion attributing the stored credentials
    pub token: String,
    /// Warehouse username
    pub username: String,
    /// Warehouse password
    pub password: String,
}

/// Response for a successful warehouse login
#[derive(Debug, Serialize, Deserialize)]
pub struct WarehouseLoginResponse {
    pub success: bool,
    pub message: String,
}

/// Verify submitted warehouse credentials and store them for the identity.
///
/// The credentials are checked against a live connection first; nothing is
/// persisted when the warehouse rejects them.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<WarehouseLoginRequest>,
) -> Result<Json<WarehouseLoginResponse>, AppError> {
    let claims = state.tokens.decode_token(&request.token).ok_or_else(|| {
        AppError::auth_invalid("Invalid or expired token. Please log in again.")
    })?;
    let email = claims.email_normalized();
    if email.is_empty() {
        return Err(AppError::auth_invalid("Email claim missing in token"));
    }

    let params = state
        .warehouse
        .connection_params()
        .ok_or_else(|| AppError::config("Warehouse connection parameters are not configured"))?;

    let credentials = WarehouseCredentials {
        email: email.clone(),
        username: request.username,
        password: request.password,
    };

    let timeout = Duration::from_secs(state.warehouse.connect_timeout_secs);
    state
        .connector
        .connect(&params, &credentials, timeout)
        .await
        .map_err(|e| match e {
            WarehouseError::Auth(_) => AppError::new(
                ErrorCode::ExternalAuthFailed,
                "Warehouse rejected the supplied credentials",
            ),
            other => AppError::external_service("warehouse", other.to_string()),
        })?;

    state
        .database
        .upsert_warehouse_credentials(&email, &credentials.username, &credentials.password)
        .await
        .map_err(|e| AppError::database(format!("Failed to store credentials: {e}")))?;

    info!("Warehouse credentials verified and stored for {email}");
    Ok(Json(WarehouseLoginResponse {
        success: true,
        message: "Login successful and credentials stored".to_owned(),
    }))
}
