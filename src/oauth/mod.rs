//! Host platform OAuth: code exchange, expiry-aware refresh and provider registration.
//!
//! Grants are persisted per tenant, so any number of installs can be active at once.
//! A grant's access token is handed out as-is until it expires, then refreshed with
//! exactly one refresh-token call and written back as a single (access, refresh,
//! expiry) triple.

mod exchange;
mod registration;

pub use exchange::OAuthClientConfig;
pub use registration::{ProviderPayload, ProviderRegistration, RegistrationConfig, HOST_API_VERSION};

use crate::credentials::{CredentialStore, HostAuthGrant};
use crate::error::{BridgeError, BridgeResult};
use chrono::{DateTime, Duration, Utc};
use exchange::{request_token, TokenGrant};
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default host platform token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://services.leadconnectorhq.com/oauth/token";

/// Default host platform API base.
pub const DEFAULT_API_BASE_URL: &str = "https://services.leadconnectorhq.com";

/// Exchanges authorization codes and keeps per-tenant access tokens valid.
pub struct TokenManager {
    store: Arc<CredentialStore>,
    http_client: Client,
    config: OAuthClientConfig,
}

impl TokenManager {
    pub fn new(store: Arc<CredentialStore>, http_client: Client, config: OAuthClientConfig) -> Self {
        Self {
            store,
            http_client,
            config,
        }
    }

    /// Exchanges an authorization code and stores the grant under the tenant the host
    /// platform returns.
    ///
    /// # Errors
    /// * `Validation` - Empty code; no network call is made
    /// * `CodeAlreadyUsed` - The host already redeemed this code
    /// * `HostPlatform` / `UpstreamTimeout` - Any other token endpoint failure
    pub async fn exchange_code(&self, code: &str) -> BridgeResult<HostAuthGrant> {
        let code = code.trim();
        if code.is_empty() {
            return Err(BridgeError::validation(
                "Authorization code is required",
                vec!["code".to_string()],
            ));
        }

        let now = Utc::now();
        let token = request_token(
            &self.http_client,
            &self.config,
            TokenGrant::AuthorizationCode(code),
        )
        .await?;

        let tenant_id = token
            .location_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BridgeError::HostPlatform {
                status: None,
                detail: "token response did not include a locationId".to_string(),
            })?;

        let refresh_token = token.refresh_token.ok_or_else(|| BridgeError::HostPlatform {
            status: None,
            detail: "token response did not include a refresh_token".to_string(),
        })?;

        let grant = HostAuthGrant {
            tenant_id,
            account_id: token.company_id.unwrap_or_default(),
            user_id: token.user_id.unwrap_or_default(),
            access_token: token.access_token,
            refresh_token,
            expires_at: expiry(now, token.expires_in),
        };
        self.store.upsert_grant(&grant)?;

        info!(
            tenant_id = %grant.tenant_id,
            account_id = %grant.account_id,
            expires_at = %grant.expires_at,
            "Host grant stored"
        );
        Ok(grant)
    }

    /// Returns a bearer token for `tenant_id`, refreshing it if it has expired.
    pub async fn get_valid_access_token(&self, tenant_id: &str) -> BridgeResult<String> {
        self.get_valid_access_token_at(tenant_id, Utc::now()).await
    }

    /// Same as [`get_valid_access_token`](Self::get_valid_access_token) with an explicit clock.
    pub async fn get_valid_access_token_at(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> BridgeResult<String> {
        let grant = self
            .store
            .get_grant(tenant_id)?
            .ok_or_else(|| BridgeError::NotFound(format!("no host grant for tenant '{}'", tenant_id)))?;

        if now < grant.expires_at {
            debug!(tenant_id = %tenant_id, "Using stored access token");
            return Ok(grant.access_token);
        }

        debug!(tenant_id = %tenant_id, expired_at = %grant.expires_at, "Refreshing access token");
        let token = request_token(
            &self.http_client,
            &self.config,
            TokenGrant::RefreshToken(&grant.refresh_token),
        )
        .await
        .inspect_err(|e| {
            warn!(tenant_id = %tenant_id, kind = e.kind(), "Access token refresh failed");
        })?;

        let rotated = token.refresh_token.is_some();
        let refresh_token = token.refresh_token.unwrap_or(grant.refresh_token);
        let expires_at = expiry(now, token.expires_in);

        let updated = self.store.update_grant_tokens(
            tenant_id,
            &token.access_token,
            &refresh_token,
            expires_at,
        )?;
        if !updated {
            return Err(BridgeError::NotFound(format!(
                "host grant for tenant '{}' was removed during refresh",
                tenant_id
            )));
        }

        info!(
            tenant_id = %tenant_id,
            refresh_token_rotated = rotated,
            expires_at = %expires_at,
            "Access token refreshed"
        );
        Ok(token.access_token)
    }
}

/// Absolute expiry from a relative lifetime. A missing lifetime yields an already
/// expired token so the next use refreshes it.
fn expiry(now: DateTime<Utc>, expires_in: Option<i64>) -> DateTime<Utc> {
    match expires_in {
        Some(seconds) if seconds > 0 => now + Duration::seconds(seconds),
        _ => now,
    }
}
