//! Gateway credential endpoints for the tenant settings form.
//!
//! Secrets are accepted in full but only ever echoed masked.

use super::error::{JsonBody, TenantQuery};
use crate::credentials::{
    mask_secret, GatewayCredential, GatewayCredentialManager, GatewayMode, SaveCredentialsRequest,
};
use crate::error::BridgeError;
use axum::{
    extract::{Query, State},
    response::Json,
    routing::post,
    Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Shared application state for credential API
pub struct CredentialsAppState {
    pub manager: Arc<GatewayCredentialManager>,
}

/// Credential record as shown to the browser
#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialView {
    pub tenant_id: String,
    pub mode: GatewayMode,
    pub api_key: String,
    pub signing_secret: String,
    pub collection_id: String,
    pub verified: bool,
    pub updated_at: String,
}

impl From<GatewayCredential> for CredentialView {
    fn from(credential: GatewayCredential) -> Self {
        Self {
            api_key: mask_secret(&credential.api_key),
            signing_secret: mask_secret(&credential.signing_secret),
            tenant_id: credential.tenant_id,
            mode: credential.mode,
            collection_id: credential.collection_id,
            verified: credential.verified,
            updated_at: credential.updated_at.to_rfc3339(),
        }
    }
}

/// Create credential API router
pub fn create_credentials_router(state: CredentialsAppState) -> Router {
    Router::new()
        .route("/credentials", post(save_credentials).get(get_credentials))
        .route("/credentials/test", post(test_credentials))
        .with_state(Arc::new(state))
}

/// POST /credentials
///
/// Saves and probes. A failed probe leaves the record stored but unverified and
/// returns the probe's error.
async fn save_credentials(
    State(state): State<Arc<CredentialsAppState>>,
    JsonBody(request): JsonBody<SaveCredentialsRequest>,
) -> Result<Json<CredentialView>, BridgeError> {
    let saved = state.manager.save_credentials(&request).await?;
    Ok(Json(saved.into()))
}

/// GET /credentials?tenantId=&mode=
async fn get_credentials(
    State(state): State<Arc<CredentialsAppState>>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<CredentialView>, BridgeError> {
    let (tenant_id, mode) = query.tenant_and_mode()?;

    state
        .manager
        .get_credentials(&tenant_id, mode)?
        .map(|credential| Json(credential.into()))
        .ok_or_else(|| {
            BridgeError::NotFound(format!(
                "no {} credentials for tenant '{}'",
                mode, tenant_id
            ))
        })
}

/// POST /credentials/test?tenantId=&mode=
async fn test_credentials(
    State(state): State<Arc<CredentialsAppState>>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<CredentialView>, BridgeError> {
    let (tenant_id, mode) = query.tenant_and_mode()?;
    let tested = state.manager.test_connection(&tenant_id, mode).await?;
    Ok(Json(tested.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_view_masks_secrets() {
        let view = CredentialView::from(GatewayCredential {
            tenant_id: "loc-1".to_string(),
            mode: GatewayMode::Sandbox,
            api_key: "73eb57f0-7d4e-42b9".to_string(),
            signing_secret: "S-abcdefgh".to_string(),
            collection_id: "col-1".to_string(),
            verified: true,
            revision: 3,
            updated_at: Utc::now(),
        });

        assert_eq!(view.api_key, "**************42b9");
        assert_eq!(view.signing_secret, "******efgh");

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["mode"], "sandbox");
        assert_eq!(json["collectionId"], "col-1");
        assert!(json.get("revision").is_none());
    }
}
