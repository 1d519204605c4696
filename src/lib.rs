// ABOUTME: Main library entry point for the Jordi chat server
// ABOUTME: Wires token auth, credential-gated warehouse tools, and streaming chat sessions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![deny(unsafe_code)]

//! # Jordi Chat Server
//!
//! Backend for a warehouse-gated AI advisor chat. Users authenticate with
//! a signed, short-lived identity assertion; sessions are restored or
//! initialized per user; a SQL warehouse toolset is provisioned behind
//! per-user stored credentials; and agent responses stream back to the
//! transport while conversation history accumulates.
//!
//! ## Architecture
//!
//! - **`auth`**: identity assertion creation and validation (Token Manager)
//! - **`database`**: credential store and conversation history over SQLite
//! - **`warehouse`**: connector, bounded SQL toolset, capability provisioner
//! - **`agent`**: LLM provider boundary with streaming and tool calling
//! - **`session`**: session store, settings protocol, turn orchestration
//! - **`routes`**: thin axum shell over the core
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use jordi_chat_server::config::ServerConfig;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("Jordi chat server configured: {}", config.summary());
//!     Ok(())
//! }
//! ```

/// Agent provider boundary with streaming and tool-calling support
pub mod agent;

/// Identity assertion creation and validation
pub mod auth;

/// Configuration management and environment parsing
pub mod config;

/// Encryption-at-rest helpers for stored secrets
pub mod crypto;

/// Credential store and conversation history
pub mod database;

/// Unified error handling system with standard error codes and HTTP responses
pub mod errors;

/// Identity-provider exchange boundary and provider-token cache
pub mod identity;

/// Production logging and structured output
pub mod logging;

/// HTTP routes for auth, chat, and warehouse login flows
pub mod routes;

/// Session store, settings protocol, and turn orchestration
pub mod session;

/// Warehouse connectivity, toolset, and capability provisioning
pub mod warehouse;
