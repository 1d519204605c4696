// ABOUTME: Session store and per-session context for the chat orchestrator
// ABOUTME: Explicit create/get/evict lifecycle with per-session turn serialization
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Session Management
//!
//! Sessions are held in an explicit injected [`SessionStore`] keyed by
//! session id. Each [`Session`] wraps its mutable context in a
//! `tokio::Mutex`; a turn holds the lock from the moment it starts until
//! its history append completes, which is what serializes turns within one
//! session while leaving distinct sessions fully independent.

mod orchestrator;
mod settings;

pub use orchestrator::{
    Attachment, BootstrapOutcome, SessionOrchestrator, SettingsOutcome, TurnEvent, TurnInput,
};
pub use settings::{ChatSettings, ModelChoice};

use crate::agent::ChatMessage;
use crate::warehouse::WarehouseToolset;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Mutable per-session state
pub struct SessionContext {
    /// Normalized identity email
    pub email: String,
    /// Active chat settings
    pub settings: ChatSettings,
    /// Append-only conversation history in real turn order
    pub history: Vec<ChatMessage>,
    /// Live warehouse toolset, present only while the capability is up
    pub toolset: Option<Arc<WarehouseToolset>>,
    /// System prompt prepended to every agent request
    pub system_prompt: String,
    /// Persisted conversation backing this session
    pub conversation_id: String,
    /// Whether the remediation message has already been surfaced
    pub remediation_sent: bool,
}

/// A single chat session
pub struct Session {
    /// Session identifier handed to the transport
    pub id: String,
    context: Mutex<SessionContext>,
}

impl Session {
    /// Create a session over an initialized context
    #[must_use]
    pub fn new(id: String, context: SessionContext) -> Self {
        Self {
            id,
            context: Mutex::new(context),
        }
    }

    /// Lock the session context. Holding the guard serializes turns.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, SessionContext> {
        self.context.lock().await
    }
}

/// Explicit session store mapping session-id to live sessions.
///
/// Injected into the orchestrator rather than accessed as ambient global
/// state; creation and eviction are explicit operations.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with a fresh id and insert it
    pub fn create(&self, context: SessionContext) -> Arc<Session> {
        let id = Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(id.clone(), context));
        self.sessions.insert(id, Arc::clone(&session));
        session
    }

    /// Look up a session by id
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a session, returning whether it existed
    pub fn evict(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Number of live sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
