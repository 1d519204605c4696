// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides database, orchestrator, scripted agent, and stub connector helpers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions
)]

//! Shared test utilities for `jordi_chat_server` integration tests.

use async_trait::async_trait;
use jordi_chat_server::{
    agent::{
        AgentCapabilities, AgentHandle, AgentProvider, AgentTurn, ChatRequest, ChatResponse,
        ChatStream, StreamChunk, ToolSpec,
    },
    auth::TokenManager,
    config::environment::ConnectionParams,
    config::WarehouseSettings,
    crypto,
    database::{Database, WarehouseCredentials},
    errors::AppError,
    session::{SessionOrchestrator, SessionStore, TurnEvent, TurnInput},
    warehouse::{CapabilityProvisioner, QueryResult, WarehouseConnector, WarehouseError, WarehouseSession},
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::sync::mpsc;

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        let _ = tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .try_init();
    });
}

/// Standard in-memory test database
pub async fn create_test_database() -> Arc<Database> {
    init_test_logging();
    let data_key = crypto::generate_data_key().to_vec();
    Arc::new(
        Database::new("sqlite::memory:", data_key)
            .await
            .expect("Failed to create test database"),
    )
}

/// Test token manager with a fixed secret
pub fn create_test_token_manager() -> Arc<TokenManager> {
    Arc::new(TokenManager::new("test-secret-key"))
}

/// Warehouse settings with connection parameters configured
pub fn warehouse_settings() -> WarehouseSettings {
    WarehouseSettings {
        account: Some("acme-prod".into()),
        database: Some("NEO".into()),
        schema: Some("PUBLIC".into()),
        base_url: None,
        default_username: None,
        default_password: None,
        connect_timeout_secs: 2,
        login_url: "http://localhost:8081/warehouse/login".into(),
    }
}

// ============================================================================
// Scripted agent
// ============================================================================

/// One scripted streaming chunk
#[derive(Debug, Clone)]
pub enum ScriptedChunk {
    /// A content delta
    Delta(String),
    /// A mid-stream fault
    Fail(String),
}

/// Agent test double with scriptable replies, streams, and tool turns
pub struct ScriptedAgent {
    /// Final text returned by `complete` and by the tool loop fallback
    pub reply: String,
    /// Artificial processing delay applied to every call
    pub delay: Option<Duration>,
    /// Scripted stream; `None` streams the reply as a single delta
    pub chunks: Mutex<Option<Vec<ScriptedChunk>>>,
    /// Scripted tool-loop turns, popped front first
    pub tool_turns: Mutex<VecDeque<AgentTurn>>,
    /// Every request the agent has seen
    pub seen_requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedAgent {
    pub fn replying(reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.into(),
            delay: None,
            chunks: Mutex::new(None),
            tool_turns: Mutex::new(VecDeque::new()),
            seen_requests: Mutex::new(Vec::new()),
        })
    }

    pub fn with_delay(reply: impl Into<String>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.into(),
            delay: Some(delay),
            chunks: Mutex::new(None),
            tool_turns: Mutex::new(VecDeque::new()),
            seen_requests: Mutex::new(Vec::new()),
        })
    }

    pub fn with_chunks(reply: impl Into<String>, chunks: Vec<ScriptedChunk>) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.into(),
            delay: None,
            chunks: Mutex::new(Some(chunks)),
            tool_turns: Mutex::new(VecDeque::new()),
            seen_requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push_tool_turn(&self, turn: AgentTurn) {
        self.tool_turns.lock().unwrap().push_back(turn);
    }

    fn record(&self, request: &ChatRequest) {
        self.seen_requests.lock().unwrap().push(request.clone());
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl AgentProvider for ScriptedAgent {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities::STREAMING
            | AgentCapabilities::FUNCTION_CALLING
            | AgentCapabilities::SYSTEM_MESSAGES
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AppError> {
        self.record(request);
        self.pause().await;
        Ok(ChatResponse {
            content: self.reply.clone(),
            model: request.model.clone().unwrap_or_default(),
            usage: None,
            finish_reason: Some("stop".into()),
        })
    }

    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChatStream, AppError> {
        self.record(request);
        self.pause().await;

        let scripted = self.chunks.lock().unwrap().clone();
        let mut items: Vec<Result<StreamChunk, AppError>> = Vec::new();

        match scripted {
            Some(chunks) => {
                let mut faulted = false;
                for chunk in chunks {
                    match chunk {
                        ScriptedChunk::Delta(delta) => items.push(Ok(StreamChunk {
                            delta,
                            is_final: false,
                            finish_reason: None,
                        })),
                        ScriptedChunk::Fail(message) => {
                            items.push(Err(AppError::external_service("agent", message)));
                            faulted = true;
                            break;
                        }
                    }
                }
                if !faulted {
                    items.push(Ok(StreamChunk {
                        delta: String::new(),
                        is_final: true,
                        finish_reason: Some("stop".into()),
                    }));
                }
            }
            None => {
                items.push(Ok(StreamChunk {
                    delta: self.reply.clone(),
                    is_final: false,
                    finish_reason: None,
                }));
                items.push(Ok(StreamChunk {
                    delta: String::new(),
                    is_final: true,
                    finish_reason: Some("stop".into()),
                }));
            }
        }

        Ok(Box::pin(tokio_stream::iter(items)))
    }

    async fn complete_with_tools(
        &self,
        request: &ChatRequest,
        _tools: Option<Vec<ToolSpec>>,
    ) -> Result<AgentTurn, AppError> {
        self.record(request);
        self.pause().await;

        if let Some(turn) = self.tool_turns.lock().unwrap().pop_front() {
            return Ok(turn);
        }

        Ok(AgentTurn {
            content: Some(self.reply.clone()),
            tool_calls: None,
            model: request.model.clone().unwrap_or_default(),
            usage: None,
            finish_reason: Some("stop".into()),
        })
    }
}

// ============================================================================
// Warehouse connectors
// ============================================================================

/// Connector that rejects every login, counting attempts
#[derive(Default)]
pub struct RejectingConnector {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl WarehouseConnector for RejectingConnector {
    async fn connect(
        &self,
        _params: &ConnectionParams,
        credentials: &WarehouseCredentials,
        _timeout: Duration,
    ) -> Result<Arc<dyn WarehouseSession>, WarehouseError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(WarehouseError::Auth(format!(
            "warehouse rejected login for user {}",
            credentials.username
        )))
    }
}

/// Connector that accepts every login and records the username used
#[derive(Default)]
pub struct AcceptingConnector {
    pub attempts: AtomicUsize,
    pub last_username: Mutex<Option<String>>,
}

#[async_trait]
impl WarehouseConnector for AcceptingConnector {
    async fn connect(
        &self,
        _params: &ConnectionParams,
        credentials: &WarehouseCredentials,
        _timeout: Duration,
    ) -> Result<Arc<dyn WarehouseSession>, WarehouseError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        *self.last_username.lock().unwrap() = Some(credentials.username.clone());
        Ok(Arc::new(StubSession::default()))
    }
}

/// Session returning canned results and recording executed statements
#[derive(Default)]
pub struct StubSession {
    pub statements: Mutex<Vec<String>>,
}

#[async_trait]
impl WarehouseSession for StubSession {
    async fn execute(&self, sql: &str) -> Result<QueryResult, WarehouseError> {
        self.statements.lock().unwrap().push(sql.to_owned());

        if sql.contains("information_schema.tables") {
            Ok(QueryResult {
                columns: vec!["table_name".into()],
                rows: vec![
                    vec!["ACCOUNTS".into()],
                    vec!["POSITIONS".into()],
                ],
            })
        } else if sql.contains("information_schema.columns") {
            Ok(QueryResult {
                columns: vec!["column_name".into(), "data_type".into()],
                rows: vec![
                    vec!["ID".into(), "NUMBER".into()],
                    vec!["NAME".into(), "TEXT".into()],
                ],
            })
        } else {
            Ok(QueryResult {
                columns: vec!["N".into()],
                rows: vec![vec![serde_json::Value::from(1)]],
            })
        }
    }
}

// ============================================================================
// Orchestrator harness
// ============================================================================

/// Assembled orchestrator with its collaborators exposed for assertions
pub struct TestHarness {
    pub database: Arc<Database>,
    pub tokens: Arc<TokenManager>,
    pub orchestrator: Arc<SessionOrchestrator>,
    pub agent: Arc<ScriptedAgent>,
}

/// Build an orchestrator over the given connector, settings, and agent
pub async fn create_harness(
    connector: Arc<dyn WarehouseConnector>,
    settings: WarehouseSettings,
    agent: Arc<ScriptedAgent>,
) -> TestHarness {
    let database = create_test_database().await;
    let tokens = create_test_token_manager();
    let provisioner = Arc::new(CapabilityProvisioner::new(
        Arc::clone(&database),
        connector,
        settings,
    ));
    let orchestrator = Arc::new(SessionOrchestrator::new(
        Arc::clone(&database),
        Arc::clone(&tokens),
        provisioner,
        agent.clone() as Arc<dyn AgentProvider>,
        Arc::new(SessionStore::new()),
    ));

    TestHarness {
        database,
        tokens,
        orchestrator,
        agent,
    }
}

/// Agent handle over a scripted agent for direct toolset construction
pub fn test_agent_handle(agent: &Arc<ScriptedAgent>) -> AgentHandle {
    AgentHandle::new(agent.clone() as Arc<dyn AgentProvider>, "gpt-4o", 0.1)
}

/// Run one turn to completion and collect every emitted event
pub async fn run_turn(
    orchestrator: &Arc<SessionOrchestrator>,
    session_id: &str,
    input: TurnInput,
) -> Vec<TurnEvent> {
    let (tx, mut rx) = mpsc::channel(32);
    let orchestrator = Arc::clone(orchestrator);
    let session_id = session_id.to_owned();

    let worker =
        tokio::spawn(async move { orchestrator.handle_turn(&session_id, input, tx).await });

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    worker
        .await
        .expect("turn task panicked")
        .expect("turn processing failed");
    events
}
