// ABOUTME: Token issuance and identity-provider exchange endpoints
// ABOUTME: Mints signed identity assertions and returns the chat entry URL
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::AppState;
use crate::errors::AppError;
use crate::identity::ProviderToken;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Smallest TTL a caller may request, in minutes
const MIN_TTL_MINUTES: i64 = 5;

/// Largest TTL a caller may request, in minutes
const MAX_TTL_MINUTES: i64 = 120;

/// Default TTL when none is requested, in minutes
const DEFAULT_TTL_MINUTES: i64 = 30;

/// Request to mint an identity assertion directly
#[derive(Debug, Deserialize)]
pub struct IssueTokenRequest {
    /// Subject email
    pub email: String,
    /// Requested time-to-live in minutes (clamped to 5-120)
    #[serde(default)]
    pub ttl_minutes: Option<i64>,
}

/// Request to exchange an identity-provider authorization code
#[derive(Debug, Deserialize)]
pub struct ExchangeCodeRequest {
    /// Authorization code from the provider redirect
    pub code: String,
}

/// Response carrying a freshly minted token
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The signed identity assertion
    pub token: String,
    /// Chat entry URL with the token embedded as a query parameter
    pub chat_url: String,
    /// Subject email the token asserts
    pub email: String,
}

fn token_response(state: &AppState, email: &str, token: String) -> TokenResponse {
    let chat_url = format!(
        "{}/chat/session?token={}",
        state.public_url.trim_end_matches('/'),
        urlencoding::encode(&token)
    );
    TokenResponse {
        token,
        chat_url,
        email: email.to_owned(),
    }
}

/// Mint an identity assertion for an email
pub async fn issue_token(
    State(state): State<AppState>,
    Json(request): Json<IssueTokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let email = request.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::invalid_input("A valid email address is required"));
    }

    let ttl_minutes = request
        .ttl_minutes
        .unwrap_or(DEFAULT_TTL_MINUTES)
        .clamp(MIN_TTL_MINUTES, MAX_TTL_MINUTES);

    let token = state
        .tokens
        .create_token_with_ttl(&email, ttl_minutes * 60, None)?;

    info!("Issued identity token for {email} (ttl={ttl_minutes}m)");
    Ok(Json(token_response(&state, &email, token)))
}

/// Exchange an identity-provider authorization code for a token
pub async fn exchange_code(
    State(state): State<AppState>,
    Json(request): Json<ExchangeCodeRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let provider = state
        .identity
        .as_ref()
        .ok_or_else(|| AppError::config("Identity provider is not configured"))?;

    let exchange = provider.exchange_code(&request.code).await?;
    let email = exchange.claims.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::auth_invalid(
            "Email claim missing from identity provider response",
        ));
    }

    let provider_token = ProviderToken {
        access_token: exchange.token.access_token,
        refresh_token: exchange.token.refresh_token,
        expires_at: exchange.token.expires_at,
    };
    state.token_cache.insert(&email, provider_token).await;

    let token = state.tokens.create_token(&email, None)?;

    info!("Exchanged provider code for identity token ({email})");
    Ok(Json(token_response(&state, &email, token)))
}
