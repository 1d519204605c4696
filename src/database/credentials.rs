// ABOUTME: Warehouse credential rows keyed by user email with overwrite-on-upsert semantics
// ABOUTME: Passwords are sealed with the process data key before storage
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::Database;
use crate::crypto;
use anyhow::Result;
use chrono::Utc;
use sqlx::Row;
use tracing::warn;

/// Decrypted warehouse credentials for a single identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseCredentials {
    /// Owning identity (normalized email)
    pub email: String,
    /// Warehouse username
    pub username: String,
    /// Warehouse password
    pub password: String,
}

impl Database {
    /// Create the `warehouse_credentials` table
    ///
    /// # Errors
    ///
    /// Returns an error if table creation fails
    pub(super) async fn migrate_credentials(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS warehouse_credentials (
                email TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                password_sealed TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Store or overwrite the warehouse credentials for an identity.
    ///
    /// The email primary key guarantees at most one row per identity; a
    /// second upsert replaces the previous username/password pair.
    ///
    /// # Errors
    ///
    /// Returns an error if sealing or the database operation fails
    pub async fn upsert_warehouse_credentials(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<()> {
        let email = email.trim().to_lowercase();
        let sealed = crypto::seal(password, self.data_key())
            .map_err(|e| anyhow::anyhow!("Failed to seal warehouse password: {e}"))?;

        sqlx::query(
            r"
            INSERT INTO warehouse_credentials (email, username, password_sealed, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (email)
            DO UPDATE SET
                username = EXCLUDED.username,
                password_sealed = EXCLUDED.password_sealed,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(&email)
        .bind(username)
        .bind(&sealed)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Fetch the stored credentials for an identity, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored password cannot be
    /// unsealed (wrong data key).
    pub async fn get_warehouse_credentials(
        &self,
        email: &str,
    ) -> Result<Option<WarehouseCredentials>> {
        let email = email.trim().to_lowercase();

        let row = sqlx::query(
            r"
            SELECT email, username, password_sealed
            FROM warehouse_credentials
            WHERE email = $1
            ",
        )
        .bind(&email)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => {
                let sealed: String = row.get("password_sealed");
                let password = crypto::open(&sealed, self.data_key())
                    .map_err(|e| anyhow::anyhow!("Failed to unseal warehouse password: {e}"))?;
                Ok(Some(WarehouseCredentials {
                    email: row.get("email"),
                    username: row.get("username"),
                    password,
                }))
            }
            None => Ok(None),
        }
    }

    /// Credential lookup with the session-bootstrap policy: absent/empty
    /// identity returns `None` without querying, and store-connectivity
    /// failure is logged and treated identically to "no credentials on
    /// file". Fail-open here means fail-open to "not configured", never
    /// to access.
    pub async fn lookup_warehouse_credentials(&self, email: &str) -> Option<WarehouseCredentials> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return None;
        }

        match self.get_warehouse_credentials(&email).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Credential store lookup failed, treating as not configured: {e}");
                None
            }
        }
    }
}
