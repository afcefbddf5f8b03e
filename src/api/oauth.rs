//! Host platform install flow.
//!
//! 1. The host redirects the browser to GET /oauth/callback?code=...
//! 2. The code is exchanged and the grant stored under the returned tenant
//! 3. The integration registers itself as the tenant's payment provider
//! 4. The browser continues to the dashboard, or sees a status page
//!
//! Registration can be retried later with POST /oauth/register?tenantId=...

use super::error::TenantQuery;
use super::pages::status_page;
use crate::error::BridgeError;
use crate::oauth::{ProviderRegistration, TokenManager};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared application state for OAuth API
pub struct OAuthAppState {
    pub token_manager: Arc<TokenManager>,
    pub registration: Arc<ProviderRegistration>,
    pub dashboard_url: String,
}

/// OAuth callback query parameters
#[derive(Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    registered: bool,
    tenant_id: String,
}

/// Create OAuth API router
pub fn create_oauth_router(state: OAuthAppState) -> Router {
    Router::new()
        .route("/oauth/callback", get(oauth_callback))
        .route("/oauth/register", post(register_provider))
        .with_state(Arc::new(state))
}

/// GET /oauth/callback
///
/// Browser-facing: every outcome is a redirect or an HTML page, never JSON.
async fn oauth_callback(
    State(state): State<Arc<OAuthAppState>>,
    Query(callback): Query<OAuthCallback>,
) -> Response {
    debug!("OAuth callback received");

    if let Some(error) = callback.error {
        let description = callback
            .error_description
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!(error = %error, description = %description, "OAuth authorization denied");
        return page(
            StatusCode::BAD_REQUEST,
            "Authorization failed",
            &format!("{}: {}", error, description),
            None,
        );
    }

    let code = callback.code.unwrap_or_default();
    let grant = match state.token_manager.exchange_code(&code).await {
        Ok(grant) => grant,
        Err(BridgeError::CodeAlreadyUsed { .. }) => {
            info!("Authorization code already redeemed, continuing to dashboard");
            return Redirect::to(&state.dashboard_url).into_response();
        }
        Err(e) => {
            error!(kind = e.kind(), error = %e, "Token exchange failed");
            return page(
                error_status(&e),
                "Authorization failed",
                &e.to_string(),
                None,
            );
        }
    };

    match state
        .registration
        .register_provider(&grant.tenant_id, &grant.access_token)
        .await
    {
        Ok(()) => {
            info!(tenant_id = %grant.tenant_id, "Install completed");
            Redirect::to(&state.dashboard_url).into_response()
        }
        Err(e) => {
            warn!(
                tenant_id = %grant.tenant_id,
                kind = e.kind(),
                error = %e,
                "Authorized, but provider registration failed"
            );
            page(
                StatusCode::OK,
                "Authorized, registration incomplete",
                "The app is authorized but could not be registered as a payment provider. \
                 Registration can be retried without reinstalling.",
                Some((state.dashboard_url.as_str(), "Continue to dashboard")),
            )
        }
    }
}

/// POST /oauth/register?tenantId=
async fn register_provider(
    State(state): State<Arc<OAuthAppState>>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<RegisterResponse>, BridgeError> {
    let tenant_id = query.tenant()?;

    let access_token = state.token_manager.get_valid_access_token(&tenant_id).await?;
    state
        .registration
        .register_provider(&tenant_id, &access_token)
        .await?;

    Ok(Json(RegisterResponse {
        registered: true,
        tenant_id,
    }))
}

fn error_status(e: &BridgeError) -> StatusCode {
    StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn page(status: StatusCode, title: &str, message: &str, link: Option<(&str, &str)>) -> Response {
    (status, Html(status_page(title, message, link))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth_callback_deserialization() {
        let callback: OAuthCallback = serde_urlencoded::from_str("code=auth_code_123").unwrap();
        assert_eq!(callback.code, Some("auth_code_123".to_string()));
        assert_eq!(callback.error, None);

        let callback: OAuthCallback =
            serde_urlencoded::from_str("error=access_denied&error_description=User+cancelled")
                .unwrap();
        assert_eq!(callback.error, Some("access_denied".to_string()));
        assert_eq!(callback.error_description, Some("User cancelled".to_string()));
        assert_eq!(callback.code, None);
    }

    #[test]
    fn test_register_response_serialization() {
        let json = serde_json::to_string(&RegisterResponse {
            registered: true,
            tenant_id: "loc-1".to_string(),
        })
        .unwrap();
        assert!(json.contains("\"registered\":true"));
        assert!(json.contains("\"tenantId\":\"loc-1\""));
    }
}
