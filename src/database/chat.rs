// ABOUTME: Database operations for chat conversations and messages
// ABOUTME: Handles conversation lookup by identity and append-only message history
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::Database;
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Database representation of a chat conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Unique conversation ID
    pub id: String,
    /// Normalized email of the owning identity
    pub email: String,
    /// Model label active when the conversation was created
    pub model: String,
    /// Optional system prompt for the conversation
    pub system_prompt: Option<String>,
    /// When the conversation was created (ISO 8601)
    pub created_at: String,
    /// When the conversation was last updated (ISO 8601)
    pub updated_at: String,
}

/// Database representation of a chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Unique message ID
    pub id: String,
    /// Conversation ID this message belongs to
    pub conversation_id: String,
    /// Parent message ID; root messages have none
    pub parent_id: Option<String>,
    /// Role of the message sender (system, user, assistant)
    pub role: String,
    /// Message content
    pub content: String,
    /// Token count for assistant messages when known
    pub token_count: Option<i64>,
    /// Finish reason for assistant messages
    pub finish_reason: Option<String>,
    /// When the message was created (ISO 8601)
    pub created_at: String,
}

/// Chat database operations manager
pub struct ChatManager {
    pool: SqlitePool,
}

impl Database {
    /// Create the conversation and message tables
    ///
    /// # Errors
    ///
    /// Returns an error if a schema statement fails
    pub(super) async fn migrate_chat(&self) -> Result<(), anyhow::Error> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS chat_conversations (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                model TEXT NOT NULL,
                system_prompt TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_conversations_email ON chat_conversations(email)",
        )
        .execute(self.pool())
        .await?;

        // seq gives a strict append order even when timestamps collide
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS chat_messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                conversation_id TEXT NOT NULL,
                parent_id TEXT,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                token_count INTEGER,
                finish_reason TEXT,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_messages_conversation ON chat_messages(conversation_id)",
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Build a [`ChatManager`] over this database's pool
    #[must_use]
    pub fn chat_manager(&self) -> ChatManager {
        ChatManager::new(self.pool().clone())
    }
}

impl ChatManager {
    /// Create a new chat manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the existing conversation for an identity or create one.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn get_or_create_conversation(
        &self,
        email: &str,
        model: &str,
        system_prompt: Option<&str>,
    ) -> AppResult<ConversationRecord> {
        if let Some(existing) = self.get_conversation_for_user(email).await? {
            return Ok(existing);
        }

        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            r"
            INSERT INTO chat_conversations (id, email, model, system_prompt, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ",
        )
        .bind(&id)
        .bind(email)
        .bind(model)
        .bind(system_prompt)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create conversation: {e}")))?;

        Ok(ConversationRecord {
            id,
            email: email.to_owned(),
            model: model.to_owned(),
            system_prompt: system_prompt.map(ToOwned::to_owned),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Get the most recent conversation owned by an identity
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn get_conversation_for_user(
        &self,
        email: &str,
    ) -> AppResult<Option<ConversationRecord>> {
        let row = sqlx::query(
            r"
            SELECT id, email, model, system_prompt, created_at, updated_at
            FROM chat_conversations
            WHERE email = $1
            ORDER BY created_at DESC
            LIMIT 1
            ",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get conversation: {e}")))?;

        Ok(row.map(|r| ConversationRecord {
            id: r.get("id"),
            email: r.get("email"),
            model: r.get("model"),
            system_prompt: r.get("system_prompt"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }))
    }

    /// Append a message to a conversation
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn add_message(
        &self,
        conversation_id: &str,
        parent_id: Option<&str>,
        role: &str,
        content: &str,
        token_count: Option<i64>,
        finish_reason: Option<&str>,
    ) -> AppResult<MessageRecord> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            r"
            INSERT INTO chat_messages (id, conversation_id, parent_id, role, content, token_count, finish_reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(&id)
        .bind(conversation_id)
        .bind(parent_id)
        .bind(role)
        .bind(content)
        .bind(token_count)
        .bind(finish_reason)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to add message: {e}")))?;

        sqlx::query("UPDATE chat_conversations SET updated_at = $1 WHERE id = $2")
            .bind(&now)
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to touch conversation: {e}")))?;

        Ok(MessageRecord {
            id,
            conversation_id: conversation_id.to_owned(),
            parent_id: parent_id.map(ToOwned::to_owned),
            role: role.to_owned(),
            content: content.to_owned(),
            token_count,
            finish_reason: finish_reason.map(ToOwned::to_owned),
            created_at: now,
        })
    }

    /// Get all messages in a conversation in append order
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn get_messages(&self, conversation_id: &str) -> AppResult<Vec<MessageRecord>> {
        self.fetch_messages(conversation_id, false).await
    }

    /// Get root-level messages only, the set flattened into the history
    /// buffer on session resume.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn get_root_messages(&self, conversation_id: &str) -> AppResult<Vec<MessageRecord>> {
        self.fetch_messages(conversation_id, true).await
    }

    async fn fetch_messages(
        &self,
        conversation_id: &str,
        roots_only: bool,
    ) -> AppResult<Vec<MessageRecord>> {
        let sql = if roots_only {
            r"
            SELECT id, conversation_id, parent_id, role, content, token_count, finish_reason, created_at
            FROM chat_messages
            WHERE conversation_id = $1 AND parent_id IS NULL
            ORDER BY seq
            "
        } else {
            r"
            SELECT id, conversation_id, parent_id, role, content, token_count, finish_reason, created_at
            FROM chat_messages
            WHERE conversation_id = $1
            ORDER BY seq
            "
        };

        let rows = sqlx::query(sql)
            .bind(conversation_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to get messages: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|r| MessageRecord {
                id: r.get("id"),
                conversation_id: r.get("conversation_id"),
                parent_id: r.get("parent_id"),
                role: r.get("role"),
                content: r.get("content"),
                token_count: r.get("token_count"),
                finish_reason: r.get("finish_reason"),
                created_at: r.get("created_at"),
            })
            .collect())
    }
}
