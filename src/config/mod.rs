// ABOUTME: Configuration management for deployment-specific settings
// ABOUTME: Re-exports the environment-based server configuration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Configuration management

pub mod environment;

pub use environment::{
    AgentConfig, AuthConfig, DatabaseConfig, DatabaseUrl, LogLevel, ServerConfig, WarehouseSettings,
};
