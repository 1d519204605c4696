// ABOUTME: Chat session bootstrap, streaming turn, and settings endpoints
// ABOUTME: Maps orchestrator turn events onto SSE events for the transport
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::AppState;
use crate::errors::AppError;
use crate::session::{Attachment, ChatSettings, TurnEvent, TurnInput};
use crate::warehouse::RemediationAction;
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tracing::error;

/// Buffer size for the turn event channel
const TURN_EVENT_BUFFER: usize = 32;

/// Query parameters for session bootstrap
#[derive(Debug, Deserialize)]
pub struct BootstrapQuery {
    /// Identity assertion passed through the URL
    pub token: String,
    /// Optional settings line applied at bootstrap
    #[serde(default)]
    pub settings: Option<String>,
}

/// Response for a successful bootstrap
#[derive(Debug, Serialize, Deserialize)]
pub struct BootstrapResponse {
    /// Session id for subsequent requests
    pub session_id: String,
    /// Authenticated identity
    pub email: String,
    /// Active model label
    pub model: String,
    /// Whether the warehouse capability is enabled for this session
    pub warehouse_enabled: bool,
    /// Remediation action when the capability could not be provisioned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<RemediationAction>,
    /// Whether history was rehydrated from a previous conversation
    pub resumed: bool,
}

/// Request body for one chat turn
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// Message content
    pub content: String,
    /// Attached documents, already reduced to text upstream
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Request body for a settings update
#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    /// Settings line, e.g. `model=GPT-4.1, temperature=0.3, enable_warehouse=true`
    pub settings: String,
}

/// Response for a settings update
#[derive(Debug, Serialize, Deserialize)]
pub struct SettingsResponse {
    /// Active model label
    pub model: String,
    /// Active temperature
    pub temperature: f32,
    /// Whether the warehouse capability survived the update
    pub warehouse_enabled: bool,
    /// Remediation action when re-provisioning failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<RemediationAction>,
}

/// Bootstrap a session from the `token` URL parameter
pub async fn bootstrap_session(
    State(state): State<AppState>,
    Query(query): Query<BootstrapQuery>,
) -> Result<Json<BootstrapResponse>, AppError> {
    let settings = query
        .settings
        .as_deref()
        .map_or_else(ChatSettings::default, ChatSettings::parse_line);

    let outcome = state.orchestrator.bootstrap(&query.token, settings).await?;

    Ok(Json(BootstrapResponse {
        session_id: outcome.session_id,
        email: outcome.email,
        model: outcome.model,
        warehouse_enabled: outcome.warehouse_enabled,
        remediation: outcome.remediation,
        resumed: outcome.resumed,
    }))
}

/// Send a message and stream the response via SSE
pub async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    // Reject unknown sessions before committing to a stream response
    state
        .orchestrator
        .store()
        .get(&session_id)
        .ok_or_else(|| AppError::not_found("Session"))?;

    let (tx, mut rx) = mpsc::channel(TURN_EVENT_BUFFER);

    let orchestrator = state.orchestrator;
    let input = TurnInput {
        text: request.content,
        attachments: request.attachments,
    };

    tokio::spawn(async move {
        if let Err(e) = orchestrator.handle_turn(&session_id, input, tx).await {
            error!("Turn processing failed for session {session_id}: {e}");
        }
    });

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let payload = match event {
                TurnEvent::UserMessage { content } => serde_json::json!({
                    "type": "user_message",
                    "content": content,
                }),
                TurnEvent::Token { delta } => serde_json::json!({
                    "type": "chunk",
                    "delta": delta,
                }),
                TurnEvent::Done { content } => serde_json::json!({
                    "type": "done",
                    "content": content,
                }),
                TurnEvent::Error { message } => serde_json::json!({
                    "type": "error",
                    "message": message,
                }),
            };
            yield Ok(Event::default().data(payload.to_string()));
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Apply a settings line to a session
pub async fn update_settings(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<Json<SettingsResponse>, AppError> {
    let outcome = state
        .orchestrator
        .update_settings(&session_id, &request.settings)
        .await?;

    Ok(Json(SettingsResponse {
        model: outcome.settings.model.label().to_owned(),
        temperature: outcome.settings.temperature,
        warehouse_enabled: outcome.settings.enable_warehouse,
        remediation: outcome.remediation,
    }))
}
