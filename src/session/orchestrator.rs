// ABOUTME: Session orchestrator driving bootstrap, per-turn agent dispatch, and settings updates
// ABOUTME: Streams agent output in arrival order and appends history under the per-session lock
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Session Orchestrator
//!
//! Consumes the token manager, credential store, and capability
//! provisioner to initialize or resume per-user conversation sessions, and
//! routes each inbound turn through the tool-augmented agent.
//!
//! Turn output is forwarded through a bounded mpsc channel: tokens are
//! emitted in arrival order and the channel closing is the terminal
//! "stream closed" signal. A dropped receiver (transport disconnect) stops
//! the stream consumer best-effort; the turn still finalizes with whatever
//! content was produced.

use super::{ChatSettings, SessionContext, SessionStore};
use crate::agent::{
    prompts, AgentHandle, AgentProvider, ChatMessage, ChatRequest, MessageRole, TokenUsage,
};
use crate::auth::TokenManager;
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::warehouse::{CapabilityProvisioner, RemediationAction, ToolAccess, WarehouseToolset};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{info, warn};

/// Maximum number of tool call iterations before forcing a text response
const MAX_TOOL_ITERATIONS: usize = 10;

/// Pre-extracted text of an uploaded document attached to a turn
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct Attachment {
    /// Original file name
    pub name: String,
    /// Extracted document text
    pub text: String,
}

/// One inbound user turn
#[derive(Debug, Clone)]
pub struct TurnInput {
    /// The user's message text
    pub text: String,
    /// Attached documents, already reduced to text upstream
    pub attachments: Vec<Attachment>,
}

impl TurnInput {
    /// A plain text turn with no attachments
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }
}

/// Events forwarded to the transport while a turn is processed
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// The persisted user message, echoed first
    UserMessage { content: String },
    /// An incremental output token
    Token { delta: String },
    /// Terminal event carrying the finalized assistant text
    Done { content: String },
    /// A fault; when mid-stream, the turn still finalizes with partial content
    Error { message: String },
}

/// Result of a session bootstrap
#[derive(Debug, Clone)]
pub struct BootstrapOutcome {
    /// Session id for subsequent turns
    pub session_id: String,
    /// Authenticated identity
    pub email: String,
    /// Active model label
    pub model: String,
    /// Whether the warehouse capability ended up enabled
    pub warehouse_enabled: bool,
    /// Remediation action when provisioning failed, surfaced exactly once
    pub remediation: Option<RemediationAction>,
    /// Whether history was rehydrated from a previous conversation
    pub resumed: bool,
}

/// Result of a settings update
#[derive(Debug, Clone)]
pub struct SettingsOutcome {
    /// The settings now in effect (after any capability downgrade)
    pub settings: ChatSettings,
    /// Remediation action when re-provisioning failed and none was surfaced before
    pub remediation: Option<RemediationAction>,
}

/// Internal result of the multi-turn tool execution loop
struct ToolLoopResult {
    content: String,
    usage: Option<TokenUsage>,
    finish_reason: Option<String>,
}

/// Orchestrates session lifecycle and turn processing
pub struct SessionOrchestrator {
    database: Arc<Database>,
    tokens: Arc<TokenManager>,
    provisioner: Arc<CapabilityProvisioner>,
    provider: Arc<dyn AgentProvider>,
    store: Arc<SessionStore>,
}

impl SessionOrchestrator {
    /// Assemble an orchestrator from its collaborators
    #[must_use]
    pub fn new(
        database: Arc<Database>,
        tokens: Arc<TokenManager>,
        provisioner: Arc<CapabilityProvisioner>,
        provider: Arc<dyn AgentProvider>,
        store: Arc<SessionStore>,
    ) -> Self {
        Self {
            database,
            tokens,
            provisioner,
            provider,
            store,
        }
    }

    /// Access the injected session store
    #[must_use]
    pub const fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    fn agent_handle(&self, settings: &ChatSettings) -> AgentHandle {
        AgentHandle::new(
            Arc::clone(&self.provider),
            settings.model.api_model(),
            settings.temperature,
        )
    }

    /// Bootstrap a session from an identity assertion.
    ///
    /// Validates the token, rehydrates history from the persisted
    /// conversation (root messages only), and provisions the warehouse
    /// toolset when the capability flag is on. If provisioning returns an
    /// unavailable result the flag is downgraded for this session and the
    /// remediation is surfaced here, once.
    ///
    /// # Errors
    ///
    /// Returns an auth error when the token is invalid, expired, or lacks
    /// an email claim; the caller's correct response is a login prompt.
    pub async fn bootstrap(
        &self,
        token: &str,
        settings: ChatSettings,
    ) -> AppResult<BootstrapOutcome> {
        let claims = self.tokens.decode_token(token).ok_or_else(|| {
            AppError::auth_invalid("Invalid or expired token. Please log in again.")
        })?;

        let email = claims.email_normalized();
        if email.is_empty() {
            return Err(AppError::auth_invalid("Email claim missing in token"));
        }

        let chat = self.database.chat_manager();
        let conversation = chat
            .get_or_create_conversation(
                &email,
                settings.model.label(),
                Some(prompts::advisor_system_prompt()),
            )
            .await?;

        let mut history = Vec::new();
        for record in chat.get_root_messages(&conversation.id).await? {
            if let Some(role) = MessageRole::parse(&record.role) {
                history.push(ChatMessage::new(role, record.content));
            }
        }
        let resumed = !history.is_empty();

        let mut settings = settings;
        let mut toolset = None;
        let mut remediation = None;

        if settings.enable_warehouse {
            let handle = self.agent_handle(&settings);
            match self.provisioner.provision(&email, &handle).await {
                ToolAccess::Available(provisioned) => toolset = Some(provisioned),
                ToolAccess::Unavailable {
                    reason,
                    remediation: action,
                } => {
                    info!("Warehouse capability unavailable for {email}: {reason}");
                    settings.enable_warehouse = false;
                    remediation = action;
                }
            }
        }

        let remediation_sent = remediation.is_some();
        let session = self.store.create(SessionContext {
            email: email.clone(),
            settings,
            history,
            toolset,
            system_prompt: prompts::advisor_system_prompt().to_owned(),
            conversation_id: conversation.id,
            remediation_sent,
        });

        info!("Session {} ready for {email} (resumed={resumed})", session.id);

        Ok(BootstrapOutcome {
            session_id: session.id.clone(),
            email,
            model: settings.model.label().to_owned(),
            warehouse_enabled: settings.enable_warehouse,
            remediation,
            resumed,
        })
    }

    /// Process one user turn, forwarding output events to `events`.
    ///
    /// The session lock is held from turn start until the history append
    /// completes, so turns within one session are strictly serialized.
    ///
    /// # Errors
    ///
    /// Returns an error when the session does not exist or persistence
    /// fails; agent faults are reported through the event channel instead.
    pub async fn handle_turn(
        &self,
        session_id: &str,
        input: TurnInput,
        events: mpsc::Sender<TurnEvent>,
    ) -> AppResult<()> {
        let session = self
            .store
            .get(session_id)
            .ok_or_else(|| AppError::not_found("Session"))?;

        let mut ctx = session.lock().await;
        let chat = self.database.chat_manager();

        // Fold attached-document text into the conversation as system context
        let attachment_context = format_attachments(&input.attachments);
        if !attachment_context.is_empty() {
            ctx.history.push(ChatMessage::system(&attachment_context));
            chat.add_message(
                &ctx.conversation_id,
                None,
                "system",
                &attachment_context,
                None,
                None,
            )
            .await?;
        }

        // Persist the user turn before agent dispatch
        chat.add_message(&ctx.conversation_id, None, "user", &input.text, None, None)
            .await?;

        let connected = emit(
            &events,
            TurnEvent::UserMessage {
                content: input.text.clone(),
            },
        )
        .await;

        // Assemble the agent request: system prompt, history, current input
        let turn_text = format!("{}{attachment_context}", input.text);
        let mut messages = Vec::with_capacity(ctx.history.len() + 2);
        messages.push(ChatMessage::system(&ctx.system_prompt));
        messages.extend(ctx.history.iter().cloned());
        messages.push(ChatMessage::user(&turn_text));

        let handle = self.agent_handle(&ctx.settings);
        let outcome = if let Some(toolset) = ctx.toolset.clone() {
            self.run_tool_turn(&handle, messages, &toolset, &events, connected)
                .await
        } else {
            self.run_streaming_turn(&handle, messages, &events, connected)
                .await
        };

        let Some(result) = outcome else {
            // Agent fault before any content: keep the persisted user turn,
            // skip the assistant append.
            return Ok(());
        };

        let token_count = result.usage.map(|u| i64::from(u.completion_tokens));
        chat.add_message(
            &ctx.conversation_id,
            None,
            "assistant",
            &result.content,
            token_count,
            result.finish_reason.as_deref(),
        )
        .await?;

        ctx.history.push(ChatMessage::user(&input.text));
        ctx.history.push(ChatMessage::assistant(&result.content));

        emit(
            &events,
            TurnEvent::Done {
                content: result.content,
            },
        )
        .await;

        Ok(())
    }

    /// Tool-augmented turn: run the bounded tool loop, then forward the
    /// final text. When the loop ends with no visible text the structured
    /// result's content is what gets finalized.
    async fn run_tool_turn(
        &self,
        handle: &AgentHandle,
        mut messages: Vec<ChatMessage>,
        toolset: &Arc<WarehouseToolset>,
        events: &mpsc::Sender<TurnEvent>,
        connected: bool,
    ) -> Option<ToolLoopResult> {
        match self.run_tool_loop(handle, &mut messages, toolset).await {
            Ok(result) => {
                if connected && !result.content.is_empty() {
                    emit(
                        events,
                        TurnEvent::Token {
                            delta: result.content.clone(),
                        },
                    )
                    .await;
                }
                Some(result)
            }
            Err(e) => {
                warn!("Agent turn failed: {e}");
                emit(
                    events,
                    TurnEvent::Error {
                        message: e.to_string(),
                    },
                )
                .await;
                None
            }
        }
    }

    /// Streaming turn: forward deltas in arrival order. A mid-stream fault
    /// finalizes with the partial content; an empty stream falls back to a
    /// structured completion.
    async fn run_streaming_turn(
        &self,
        handle: &AgentHandle,
        messages: Vec<ChatMessage>,
        events: &mpsc::Sender<TurnEvent>,
        mut connected: bool,
    ) -> Option<ToolLoopResult> {
        let request = ChatRequest::new(messages)
            .with_model(handle.model.clone())
            .with_temperature(handle.temperature)
            .with_streaming();

        let mut stream = match self.provider.complete_stream(&request).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Agent stream failed to open: {e}");
                emit(
                    events,
                    TurnEvent::Error {
                        message: e.to_string(),
                    },
                )
                .await;
                return None;
            }
        };

        let mut content = String::new();
        let mut finish_reason = None;
        let mut faulted = false;

        while let Some(chunk_result) = stream.next().await {
            match chunk_result {
                Ok(chunk) => {
                    if !chunk.delta.is_empty() {
                        content.push_str(&chunk.delta);
                        if connected {
                            connected = emit(
                                events,
                                TurnEvent::Token {
                                    delta: chunk.delta.clone(),
                                },
                            )
                            .await;
                        }
                    }
                    if chunk.is_final {
                        finish_reason = chunk.finish_reason;
                    }
                }
                Err(e) => {
                    // Finalize with the partial content rather than losing the turn
                    warn!("Agent stream faulted mid-turn: {e}");
                    emit(
                        events,
                        TurnEvent::Error {
                            message: e.to_string(),
                        },
                    )
                    .await;
                    faulted = true;
                    break;
                }
            }
        }

        if content.is_empty() && !faulted {
            // No tokens streamed; fall back to the structured result
            let fallback = ChatRequest {
                stream: false,
                ..request
            };
            match self.provider.complete(&fallback).await {
                Ok(response) => {
                    content = response.content;
                    finish_reason = response.finish_reason;
                    if connected && !content.is_empty() {
                        emit(
                            events,
                            TurnEvent::Token {
                                delta: content.clone(),
                            },
                        )
                        .await;
                    }
                }
                Err(e) => {
                    warn!("Structured fallback failed: {e}");
                    emit(
                        events,
                        TurnEvent::Error {
                            message: e.to_string(),
                        },
                    )
                    .await;
                    return None;
                }
            }
        }

        Some(ToolLoopResult {
            content,
            usage: None,
            finish_reason,
        })
    }

    /// Run the multi-turn tool execution loop
    async fn run_tool_loop(
        &self,
        handle: &AgentHandle,
        messages: &mut Vec<ChatMessage>,
        toolset: &Arc<WarehouseToolset>,
    ) -> AppResult<ToolLoopResult> {
        let specs = toolset.specs();

        for iteration in 0..MAX_TOOL_ITERATIONS {
            let request = ChatRequest::new(messages.clone())
                .with_model(handle.model.clone())
                .with_temperature(handle.temperature);

            let turn = handle
                .provider
                .complete_with_tools(&request, Some(specs.clone()))
                .await?;

            if let Some(ref tool_calls) = turn.tool_calls {
                if !tool_calls.is_empty() {
                    info!(
                        "Iteration {iteration}: executing {} tool calls",
                        tool_calls.len()
                    );

                    if let Some(ref text) = turn.content {
                        if !text.is_empty() {
                            messages.push(ChatMessage::assistant(text));
                        }
                    }

                    // Tool invocations complete before the turn's content is finalized
                    for call in tool_calls {
                        let output = toolset.execute(call).await;
                        let response_text = serde_json::to_string(&output.response)
                            .unwrap_or_else(|_| "{}".to_owned());
                        messages.push(ChatMessage::user(format!(
                            "[Tool Result for {}]: {response_text}",
                            output.name
                        )));
                    }
                    continue;
                }
            }

            return Ok(ToolLoopResult {
                content: turn.content.unwrap_or_default(),
                usage: turn.usage,
                finish_reason: turn.finish_reason,
            });
        }

        Ok(ToolLoopResult {
            content: String::new(),
            usage: None,
            finish_reason: Some("max_iterations".to_owned()),
        })
    }

    /// Apply a settings line to a session.
    ///
    /// Recomputes the model handle; when the capability flag is on the
    /// provisioner is rerun, and when it is off the toolset is dropped. A
    /// failed re-provision downgrades the flag and surfaces the remediation
    /// only if none was surfaced for this session before.
    ///
    /// # Errors
    ///
    /// Returns an error when the session does not exist.
    pub async fn update_settings(
        &self,
        session_id: &str,
        line: &str,
    ) -> AppResult<SettingsOutcome> {
        let session = self
            .store
            .get(session_id)
            .ok_or_else(|| AppError::not_found("Session"))?;

        let mut ctx = session.lock().await;
        ctx.settings = ChatSettings::parse_line(line);
        info!(
            "Settings updated for session {session_id}: model={}, temperature={}, warehouse={}",
            ctx.settings.model.label(),
            ctx.settings.temperature,
            ctx.settings.enable_warehouse
        );

        let mut remediation = None;
        if ctx.settings.enable_warehouse {
            let handle = self.agent_handle(&ctx.settings);
            match self.provisioner.provision(&ctx.email, &handle).await {
                ToolAccess::Available(provisioned) => {
                    ctx.toolset = Some(provisioned);
                }
                ToolAccess::Unavailable {
                    reason,
                    remediation: action,
                } => {
                    info!(
                        "Warehouse capability unavailable for {}: {reason}",
                        ctx.email
                    );
                    ctx.settings.enable_warehouse = false;
                    ctx.toolset = None;
                    if !ctx.remediation_sent {
                        remediation = action;
                        ctx.remediation_sent = remediation.is_some();
                    }
                }
            }
        } else {
            ctx.toolset = None;
        }

        Ok(SettingsOutcome {
            settings: ctx.settings,
            remediation,
        })
    }
}

/// Forward an event, reporting whether the receiver is still attached
async fn emit(events: &mpsc::Sender<TurnEvent>, event: TurnEvent) -> bool {
    events.send(event).await.is_ok()
}

/// Format attachment texts the way they are fed to the agent
fn format_attachments(attachments: &[Attachment]) -> String {
    if attachments.is_empty() {
        return String::new();
    }

    let mut context = String::from("Retrieved context from uploaded files:\n\n");
    for attachment in attachments {
        context.push_str(&format!(
            "File: {}\nContent:\n{}\n{}\n",
            attachment.name,
            attachment.text,
            "=".repeat(50)
        ));
    }
    context
}
