// ABOUTME: JWT-based identity assertion creation and validation
// ABOUTME: Handles token issuance, signature verification, and expiry enforcement
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Token Manager
//!
//! Creates and validates the short-lived signed identity assertions that
//! gate every chat session. Tokens are HS256-signed with a single
//! process-wide secret and carry an email claim plus issued-at/expiry
//! timestamps.
//!
//! Validation failure is deliberately collapsed into an absent result:
//! whether the signature was wrong, the token malformed, or the expiry
//! passed, the caller's only correct response is "reject and show a login
//! prompt". The distinction survives only at log level. Signing failures,
//! by contrast, are programmer/configuration errors and propagate.

use crate::errors::{AppError, AppResult};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Default token time-to-live in seconds
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 1800;

/// Default clock-skew leeway in seconds applied during expiry checks
pub const DEFAULT_LEEWAY_SECS: u64 = 10;

/// Claims carried by an identity assertion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject email
    pub email: String,
    /// Issued-at timestamp (epoch seconds)
    pub iat: i64,
    /// Expiry timestamp (epoch seconds)
    pub exp: i64,
    /// Any extra claims merged at issuance time
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Subject email normalized to lowercase, the form used as a lookup key
    #[must_use]
    pub fn email_normalized(&self) -> String {
        self.email.trim().to_lowercase()
    }
}

/// Token manager for identity assertion issuance and validation
pub struct TokenManager {
    secret: Vec<u8>,
    ttl_seconds: i64,
    leeway_seconds: u64,
}

impl TokenManager {
    /// Create a new token manager with the default TTL and leeway
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self::with_ttl(secret, DEFAULT_TOKEN_TTL_SECS)
    }

    /// Create a token manager with a specific TTL in seconds
    #[must_use]
    pub fn with_ttl(secret: impl Into<Vec<u8>>, ttl_seconds: i64) -> Self {
        Self {
            secret: secret.into(),
            ttl_seconds,
            leeway_seconds: DEFAULT_LEEWAY_SECS,
        }
    }

    /// Override the clock-skew leeway applied during validation
    #[must_use]
    pub fn with_leeway(mut self, leeway_seconds: u64) -> Self {
        self.leeway_seconds = leeway_seconds;
        self
    }

    /// Configured token time-to-live in seconds
    #[must_use]
    pub const fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Create a signed identity assertion for an email.
    ///
    /// Extra claims are merged into the payload; the reserved `email`,
    /// `iat`, and `exp` claims cannot be overridden.
    ///
    /// # Errors
    ///
    /// Returns an error if the signing primitive fails. This is fatal and
    /// must propagate to the caller.
    pub fn create_token(
        &self,
        email: &str,
        extra_claims: Option<Map<String, Value>>,
    ) -> AppResult<String> {
        self.create_token_with_ttl(email, self.ttl_seconds, extra_claims)
    }

    /// Create a signed identity assertion with an explicit TTL in seconds.
    ///
    /// # Errors
    ///
    /// Returns an error if the signing primitive fails.
    pub fn create_token_with_ttl(
        &self,
        email: &str,
        ttl_seconds: i64,
        extra_claims: Option<Map<String, Value>>,
    ) -> AppResult<String> {
        let now = Utc::now().timestamp();

        let mut extra = extra_claims.unwrap_or_default();
        extra.remove("email");
        extra.remove("iat");
        extra.remove("exp");

        let claims = Claims {
            email: email.to_owned(),
            iat: now,
            exp: now + ttl_seconds,
            extra,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| {
            AppError::internal(format!("Failed to sign identity token: {e}")).with_source(e)
        })
    }

    /// Decode and validate an identity assertion.
    ///
    /// Returns `None` for signature mismatch, structurally invalid tokens,
    /// missing required claims, and expiry violations; all are user-facing
    /// "please log in again" conditions and indistinguishable to the caller
    /// beyond a log-level detail.
    #[must_use]
    pub fn decode_token(&self, token: &str) -> Option<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.leeway_seconds;
        validation.set_required_spec_claims(&["exp"]);

        // The non-optional `iat`/`exp` fields on Claims reject tokens whose
        // required claims are absent even when the signature verifies.
        match decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!("Token validation failed: {}", Self::describe_error(&e));
                None
            }
        }
    }

    /// Convenience predicate for `decode_token(token).is_some()`
    #[must_use]
    pub fn is_valid(&self, token: &str) -> bool {
        self.decode_token(token).is_some()
    }

    /// Map a JWT library error to a log-level detail string
    fn describe_error(e: &jsonwebtoken::errors::Error) -> String {
        use jsonwebtoken::errors::ErrorKind;

        match e.kind() {
            ErrorKind::ExpiredSignature => "token has expired".to_owned(),
            ErrorKind::InvalidSignature => "signature verification failed".to_owned(),
            ErrorKind::InvalidToken => "token format is invalid".to_owned(),
            ErrorKind::Base64(err) => format!("token contains invalid base64: {err}"),
            ErrorKind::Json(err) => format!("token claims are invalid: {err}"),
            ErrorKind::Utf8(err) => format!("token contains invalid UTF-8: {err}"),
            ErrorKind::MissingRequiredClaim(claim) => format!("required claim missing: {claim}"),
            _ => format!("token validation failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn manager() -> TokenManager {
        TokenManager::new("test-secret-key")
    }

    #[test]
    fn test_round_trip_preserves_claims() {
        let tokens = manager();
        let before = Utc::now().timestamp();
        let token = tokens.create_token("user@example.com", None).unwrap();
        let claims = tokens.decode_token(&token).unwrap();

        assert_eq!(claims.email, "user@example.com");
        assert!(claims.iat >= before);
        assert_eq!(claims.exp, claims.iat + DEFAULT_TOKEN_TTL_SECS);
    }

    #[test]
    fn test_extra_claims_cannot_override_expiry() {
        let tokens = manager();
        let mut extra = Map::new();
        extra.insert("exp".to_owned(), Value::from(0));
        extra.insert("role".to_owned(), Value::from("advisor"));

        let token = tokens.create_token("user@example.com", Some(extra)).unwrap();
        let claims = tokens.decode_token(&token).unwrap();

        assert!(claims.exp > Utc::now().timestamp());
        assert_eq!(claims.extra.get("role"), Some(&Value::from("advisor")));
    }

    #[test]
    fn test_email_normalization() {
        let tokens = manager();
        let token = tokens.create_token("Advisor@Example.COM", None).unwrap();
        let claims = tokens.decode_token(&token).unwrap();
        assert_eq!(claims.email_normalized(), "advisor@example.com");
    }
}
