//! Custom payment provider registration with the host platform.

use crate::credentials::GatewayMode;
use crate::error::{from_transport, registration, BridgeError, BridgeResult};
use crate::payments::tenant_url;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

/// Host API version header value expected by the provider endpoint.
pub const HOST_API_VERSION: &str = "2021-07-28";

/// What gets registered, and where.
#[derive(Clone, Debug)]
pub struct RegistrationConfig {
    /// Host platform API base, e.g. `https://services.leadconnectorhq.com`
    pub api_base_url: String,
    pub api_version: String,
    pub provider_name: String,
    pub description: String,
    pub image_url: String,
    /// This integration's externally reachable base URL
    pub public_base_url: String,
    /// Gateway mode baked into the registered URLs.
    ///
    /// Shared by every tenant this deployment registers. Registration happens at install,
    /// before any gateway credentials exist, so tenants save credentials for this mode.
    pub mode: GatewayMode,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderPayload {
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub payments_url: String,
    pub query_url: String,
    pub webhook_url: String,
}

pub struct ProviderRegistration {
    http_client: Client,
    config: RegistrationConfig,
}

impl ProviderRegistration {
    pub fn new(http_client: Client, config: RegistrationConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    /// The provider record for `tenant_id`, with tenant-scoped callback URLs.
    pub fn payload(&self, tenant_id: &str) -> ProviderPayload {
        let url = |path: &str| {
            tenant_url(
                &self.config.public_base_url,
                path,
                tenant_id,
                self.config.mode,
            )
        };
        ProviderPayload {
            name: self.config.provider_name.clone(),
            description: self.config.description.clone(),
            image_url: self.config.image_url.clone(),
            payments_url: url("/payments"),
            query_url: url("/payments/query"),
            webhook_url: url("/payments/callback"),
        }
    }

    /// Registers this integration as a payment provider for `tenant_id`.
    pub async fn register_provider(&self, tenant_id: &str, access_token: &str) -> BridgeResult<()> {
        let url = format!(
            "{}/payments/custom-provider/provider?locationId={}",
            self.config.api_base_url.trim_end_matches('/'),
            urlencoding::encode(tenant_id)
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .header("Version", &self.config.api_version)
            .header("Accept", "application/json")
            .json(&self.payload(tenant_id))
            .send()
            .await
            .map_err(|e| from_transport(e, "Failed to send provider registration", registration))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            warn!(tenant_id = %tenant_id, status = status.as_u16(), "Provider registration rejected");
            return Err(BridgeError::Registration {
                status: Some(status.as_u16()),
                detail: body,
            });
        }

        info!(tenant_id = %tenant_id, mode = %self.config.mode, "Payment provider registered");
        Ok(())
    }
}
