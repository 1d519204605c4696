// ABOUTME: Server binary wiring configuration, storage, and the HTTP router
// ABOUTME: Production entrypoint with fail-fast startup on configuration faults
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Jordi Chat Server Binary
//!
//! Starts the warehouse-gated advisor chat backend with token issuance,
//! session orchestration, and streaming chat endpoints.

use anyhow::{Context, Result};
use clap::Parser;
use jordi_chat_server::{
    agent::{OpenAiAgentProvider, OpenAiProviderConfig},
    auth::TokenManager,
    config::ServerConfig,
    crypto,
    database::Database,
    identity::TokenCache,
    logging,
    routes::{self, AppState},
    session::{SessionOrchestrator, SessionStore},
    warehouse::{CapabilityProvisioner, HttpWarehouseConnector},
};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "jordi-chat-server")]
#[command(about = "Jordi Chat Server - Warehouse-gated AI advisor chat backend")]
struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }

    logging::init_from_env()?;

    info!("Starting Jordi Chat Server");
    info!("{}", config.summary());

    let data_key = crypto::load_data_key_from_env();
    let database = Arc::new(
        Database::new(&config.database.url.to_connection_string(), data_key)
            .await
            .context("Failed to initialize database")?,
    );
    info!("Database initialized: {}", config.database.url);

    let tokens = Arc::new(
        TokenManager::with_ttl(config.auth.jwt_secret.as_bytes(), config.auth.token_ttl_seconds)
            .with_leeway(config.auth.leeway_seconds),
    );

    let connector = Arc::new(
        HttpWarehouseConnector::new().context("Failed to initialize warehouse connector")?,
    );
    let provisioner = Arc::new(CapabilityProvisioner::new(
        Arc::clone(&database),
        connector.clone(),
        config.warehouse.clone(),
    ));

    let provider = Arc::new(
        OpenAiAgentProvider::new(OpenAiProviderConfig::from(&config.agent))
            .context("Failed to initialize agent provider")?,
    );

    let store = Arc::new(SessionStore::new());
    let orchestrator = Arc::new(SessionOrchestrator::new(
        Arc::clone(&database),
        Arc::clone(&tokens),
        provisioner,
        provider,
        store,
    ));

    let state = AppState {
        orchestrator,
        tokens,
        database,
        connector,
        warehouse: config.warehouse.clone(),
        identity: None,
        token_cache: Arc::new(TokenCache::new()),
        public_url: config.public_url.clone(),
    };

    let router = routes::router(state);

    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    info!("Shutdown signal received");
}
