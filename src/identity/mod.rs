// ABOUTME: Identity-provider exchange boundary and the explicit provider-token cache
// ABOUTME: Models "exchange an authorization code for an identity claim set" as an opaque call
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Identity Provider Boundary
//!
//! The external identity provider's browser-redirect protocol is out of
//! scope; what the core needs is the final step, modeled by
//! [`IdentityProvider`]: hand over an authorization code, receive an
//! identity claim set and a provider token. Cached provider tokens live in
//! an explicit, injected [`TokenCache`] with eviction-on-expiry.

use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Early-expiry skew: a token this close to expiring is treated as expired
const EXPIRY_SKEW_SECS: i64 = 60;

/// Identity claims returned by a provider exchange
#[derive(Debug, Clone)]
pub struct IdentityClaims {
    /// Verified email address
    pub email: String,
    /// Display name when the provider supplies one
    pub display_name: Option<String>,
}

/// A provider-issued token bundle
#[derive(Debug, Clone)]
pub struct ProviderToken {
    /// Access token for the provider's APIs
    pub access_token: String,
    /// Refresh token when the provider issues one
    pub refresh_token: Option<String>,
    /// Absolute expiry of the access token
    pub expires_at: DateTime<Utc>,
}

/// Result of exchanging an authorization code
#[derive(Debug, Clone)]
pub struct IdentityExchange {
    /// The asserted identity
    pub claims: IdentityClaims,
    /// The provider token bundle for later silent refresh
    pub token: ProviderToken,
}

/// Opaque identity-provider boundary
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange an authorization code for an identity claim set
    async fn exchange_code(&self, code: &str) -> AppResult<IdentityExchange>;

    /// Refresh an expired provider token
    async fn refresh(&self, refresh_token: &str) -> AppResult<ProviderToken>;
}

/// Explicit cache of provider tokens keyed by identity.
///
/// Injected where needed rather than living as module-level state; expired
/// entries are evicted on access and by [`TokenCache::purge_expired`].
#[derive(Default)]
pub struct TokenCache {
    entries: RwLock<HashMap<String, ProviderToken>>,
}

impl TokenCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a token for an identity
    pub async fn insert(&self, email: &str, token: ProviderToken) {
        let mut entries = self.entries.write().await;
        entries.insert(email.trim().to_lowercase(), token);
    }

    /// Get a still-valid token for an identity, evicting it when expired
    pub async fn get_valid(&self, email: &str) -> Option<ProviderToken> {
        let key = email.trim().to_lowercase();
        let deadline = Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS);

        let mut entries = self.entries.write().await;
        match entries.get(&key) {
            Some(token) if token.expires_at > deadline => Some(token.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Get a valid token, silently refreshing through the provider when the
    /// cached one has expired but carries a refresh token.
    ///
    /// # Errors
    ///
    /// Returns an error when the provider refresh call fails.
    pub async fn get_or_refresh(
        &self,
        email: &str,
        provider: &dyn IdentityProvider,
    ) -> AppResult<Option<ProviderToken>> {
        if let Some(valid) = self.get_valid(email).await {
            return Ok(Some(valid));
        }

        let key = email.trim().to_lowercase();
        let refresh_token = {
            let entries = self.entries.read().await;
            entries
                .get(&key)
                .and_then(|token| token.refresh_token.clone())
        };

        let Some(refresh_token) = refresh_token else {
            return Ok(None);
        };

        let refreshed = provider.refresh(&refresh_token).await.map_err(|e| {
            AppError::new(
                crate::errors::ErrorCode::ExternalAuthFailed,
                format!("Identity provider refresh failed: {e}"),
            )
        })?;

        self.insert(&key, refreshed.clone()).await;
        Ok(Some(refreshed))
    }

    /// Drop every expired entry
    pub async fn purge_expired(&self) {
        let deadline = Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS);
        let mut entries = self.entries.write().await;
        entries.retain(|_, token| token.expires_at > deadline);
    }

    /// Number of cached entries (expired or not)
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
