//! Gateway credential lifecycle: validate, persist, probe, mark verified.

use super::{CredentialStore, GatewayCredential, GatewayCredentialFields, GatewayMode};
use crate::error::{BridgeError, BridgeResult};
use crate::payments::PaymentAdapter;
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Credential save request as submitted by the tenant's settings form.
///
/// Every field is optional at the type level so validation can report all of the
/// missing ones at once.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveCredentialsRequest {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub signing_secret: Option<String>,
    #[serde(default)]
    pub collection_id: Option<String>,
}

impl SaveCredentialsRequest {
    /// Validates the request, naming every missing or invalid field.
    pub fn validate(&self) -> BridgeResult<(String, GatewayMode, GatewayCredentialFields)> {
        fn present(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }

        let mut invalid = Vec::new();
        let mut problems = Vec::new();

        let tenant_id = present(&self.tenant_id);
        if tenant_id.is_none() {
            invalid.push("tenantId");
        }

        let mode = match present(&self.mode) {
            Some(raw) => match raw.parse::<GatewayMode>() {
                Ok(mode) => Some(mode),
                Err(e) => {
                    invalid.push("mode");
                    problems.push(e);
                    None
                }
            },
            None => {
                invalid.push("mode");
                None
            }
        };

        let api_key = present(&self.api_key);
        if api_key.is_none() {
            invalid.push("apiKey");
        }
        let signing_secret = present(&self.signing_secret);
        if signing_secret.is_none() {
            invalid.push("signingSecret");
        }
        let collection_id = present(&self.collection_id);
        if collection_id.is_none() {
            invalid.push("collectionId");
        }

        match (tenant_id, mode, api_key, signing_secret, collection_id) {
            (Some(tenant_id), Some(mode), Some(api_key), Some(signing_secret), Some(collection_id))
                if invalid.is_empty() =>
            {
                Ok((
                    tenant_id,
                    mode,
                    GatewayCredentialFields {
                        api_key,
                        signing_secret,
                        collection_id,
                    },
                ))
            }
            _ => {
                let mut message = format!("Missing or invalid fields: {}", invalid.join(", "));
                if !problems.is_empty() {
                    message = format!("{} ({})", message, problems.join("; "));
                }
                Err(BridgeError::validation(
                    message,
                    invalid.into_iter().map(String::from).collect(),
                ))
            }
        }
    }
}

/// Validates, persists and probes per-tenant, per-mode gateway credentials.
///
/// Probe failures follow the flag policy: the new record stays stored, unverified,
/// and the probe's error is returned to the caller.
pub struct GatewayCredentialManager {
    store: Arc<CredentialStore>,
    adapter: Arc<PaymentAdapter>,
    locks: DashMap<(String, GatewayMode), Arc<Mutex<()>>>,
}

impl GatewayCredentialManager {
    pub fn new(store: Arc<CredentialStore>, adapter: Arc<PaymentAdapter>) -> Self {
        Self {
            store,
            adapter,
            locks: DashMap::new(),
        }
    }

    /// Saves credentials for `(tenant_id, mode)` and probes them against the gateway.
    pub async fn save_credentials(
        &self,
        request: &SaveCredentialsRequest,
    ) -> BridgeResult<GatewayCredential> {
        let (tenant_id, mode, fields) = request.validate()?;

        let lock = self.key_lock(&tenant_id, mode);
        let _guard = lock.lock().await;

        let saved = self
            .store
            .upsert_gateway_credential(&tenant_id, mode, &fields)?;
        info!(
            tenant_id = %tenant_id,
            mode = %mode,
            revision = saved.revision,
            "Gateway credentials saved, probing"
        );

        self.probe_and_mark(saved).await
    }

    /// Current credentials for `(tenant_id, mode)`, if any.
    pub fn get_credentials(
        &self,
        tenant_id: &str,
        mode: GatewayMode,
    ) -> BridgeResult<Option<GatewayCredential>> {
        Ok(self.store.get_gateway_credential(tenant_id, mode)?)
    }

    /// Re-probes the stored credentials and updates their `verified` flag.
    pub async fn test_connection(
        &self,
        tenant_id: &str,
        mode: GatewayMode,
    ) -> BridgeResult<GatewayCredential> {
        let lock = self.key_lock(tenant_id, mode);
        let _guard = lock.lock().await;

        let stored = self
            .store
            .get_gateway_credential(tenant_id, mode)?
            .ok_or_else(|| BridgeError::NotConfigured {
                tenant_id: tenant_id.to_string(),
                mode: mode.to_string(),
            })?;

        self.probe_and_mark(stored).await
    }

    async fn probe_and_mark(&self, mut credential: GatewayCredential) -> BridgeResult<GatewayCredential> {
        let probe = self.adapter.probe_connection(&credential).await;
        let verified = probe.is_ok();

        let applied = self.store.set_gateway_verified(
            &credential.tenant_id,
            credential.mode,
            credential.revision,
            verified,
        )?;
        if !applied {
            warn!(
                tenant_id = %credential.tenant_id,
                mode = %credential.mode,
                revision = credential.revision,
                "Credentials replaced during probe, verification not applied"
            );
        }

        match probe {
            Ok(()) => {
                credential.verified = applied;
                Ok(credential)
            }
            Err(e) => {
                warn!(
                    tenant_id = %credential.tenant_id,
                    mode = %credential.mode,
                    kind = e.kind(),
                    "Gateway probe failed, credentials kept unverified"
                );
                Err(e)
            }
        }
    }

    fn key_lock(&self, tenant_id: &str, mode: GatewayMode) -> Arc<Mutex<()>> {
        self.locks
            .entry((tenant_id.to_string(), mode))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
