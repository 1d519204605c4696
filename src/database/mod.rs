// ABOUTME: Database management for credential and conversation storage
// ABOUTME: Handles the SQLite pool, schema migrations, and secure data access
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Database Management
//!
//! Connection pool, migrations, and the credential/conversation stores.
//! Stored warehouse passwords are sealed with the process data key before
//! they touch disk.

mod chat;
mod credentials;

pub use chat::{ChatManager, ConversationRecord, MessageRecord};
pub use credentials::WarehouseCredentials;

use anyhow::Result;
use sqlx::SqlitePool;

/// Database manager for credential and conversation storage
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    data_key: Vec<u8>,
}

impl Database {
    /// Create a new database connection and run migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be opened or a migration fails.
    pub async fn new(database_url: &str, data_key: Vec<u8>) -> Result<Self> {
        // Ensure SQLite creates the database file if it doesn't exist
        let connection_options = if database_url.starts_with("sqlite:") {
            format!("{database_url}?mode=rwc")
        } else {
            database_url.to_owned()
        };

        let pool = SqlitePool::connect(&connection_options).await?;

        let db = Self { pool, data_key };
        db.migrate().await?;

        Ok(db)
    }

    /// Get a reference to the database pool for advanced operations
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Data key used to seal stored secrets
    pub(crate) fn data_key(&self) -> &[u8] {
        &self.data_key
    }

    /// Run database migrations
    ///
    /// # Errors
    ///
    /// Returns an error if a schema statement fails.
    pub async fn migrate(&self) -> Result<()> {
        self.migrate_credentials().await?;
        self.migrate_chat().await?;
        Ok(())
    }
}
