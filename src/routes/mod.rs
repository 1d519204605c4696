// ABOUTME: HTTP route assembly and shared application state
// ABOUTME: Thin axum shell over the session orchestrator and token manager
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! HTTP routes for token issuance, session bootstrap, chat turns, settings,
//! and the warehouse login flow. Handlers translate between the transport
//! and the core; they never contain business logic of their own.

mod auth;
mod chat;
mod health;
mod warehouse;

use crate::auth::TokenManager;
use crate::config::WarehouseSettings;
use crate::database::Database;
use crate::identity::{IdentityProvider, TokenCache};
use crate::session::SessionOrchestrator;
use crate::warehouse::WarehouseConnector;
use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    /// Session orchestrator
    pub orchestrator: Arc<SessionOrchestrator>,
    /// Token manager for issuance endpoints
    pub tokens: Arc<TokenManager>,
    /// Credential/conversation store
    pub database: Arc<Database>,
    /// Warehouse connector used by the login verification flow
    pub connector: Arc<dyn WarehouseConnector>,
    /// Warehouse settings (connection params, timeouts, login URL)
    pub warehouse: WarehouseSettings,
    /// Optional identity provider for the code-exchange flow
    pub identity: Option<Arc<dyn IdentityProvider>>,
    /// Cache of provider tokens keyed by identity
    pub token_cache: Arc<TokenCache>,
    /// Externally visible base URL for links handed to users
    pub public_url: String,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/auth/token", post(auth::issue_token))
        .route("/auth/exchange", post(auth::exchange_code))
        .route("/chat/session", get(chat::bootstrap_session))
        .route(
            "/chat/sessions/:session_id/messages",
            post(chat::send_message),
        )
        .route(
            "/chat/sessions/:session_id/settings",
            put(chat::update_settings),
        )
        .route("/warehouse/login", post(warehouse::login))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
