// ABOUTME: Liveness endpoint reporting service name and version
// ABOUTME: Used by deployment probes and smoke tests
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use axum::Json;
use serde_json::{json, Value};

/// Report service liveness
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "jordi-chat-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
