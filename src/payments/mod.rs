//! Mode-aware payment adapter.
//!
//! Turns "create a charge" / "query a charge" intents into Billplz calls using the
//! tenant's stored credentials, and authenticates the gateway's asynchronous callbacks.
//!
//! The adapter keeps no credential state; every operation re-reads the store.

mod amount;
mod types;

pub use amount::{parse_major_amount, to_minor_units};
pub use types::{ChargeCreated, ChargeState, ChargeStatus, PaymentEvent, PaymentIntent};

use crate::billplz::{signature, BillplzClient, CreateBill};
use crate::credentials::{CredentialStore, GatewayCredential, GatewayMode};
use crate::error::{BridgeError, BridgeResult};
use axum::http::HeaderMap;
use std::sync::Arc;
use tracing::{debug, info, warn};


/// Header carrying the callback signature.
pub const SIGNATURE_HEADER: &str = "x-signature";

/// Gateway limit on bill descriptions.
const MAX_DESCRIPTION_CHARS: usize = 200;

const DEFAULT_DESCRIPTION: &str = "Payment via HighLevel";

/// The only currency the gateway settles in.
const GATEWAY_CURRENCY: &str = "MYR";

/// Builds a URL on this integration scoped to one tenant and mode.
pub fn tenant_url(public_base_url: &str, path: &str, tenant_id: &str, mode: GatewayMode) -> String {
    format!(
        "{}{}?tenantId={}&mode={}",
        public_base_url.trim_end_matches('/'),
        path,
        urlencoding::encode(tenant_id),
        mode
    )
}

pub struct PaymentAdapter {
    store: Arc<CredentialStore>,
    client: BillplzClient,
    public_base_url: String,
}

impl PaymentAdapter {
    pub fn new(store: Arc<CredentialStore>, client: BillplzClient, public_base_url: String) -> Self {
        Self {
            store,
            client,
            public_base_url,
        }
    }

    /// Read-only connectivity check against the gateway with `credential`'s exact values.
    pub async fn probe_connection(&self, credential: &GatewayCredential) -> BridgeResult<()> {
        debug!(
            tenant_id = %credential.tenant_id,
            mode = %credential.mode,
            "Probing gateway connection"
        );
        let collection = self
            .client
            .get_collection(credential.mode, &credential.api_key, &credential.collection_id)
            .await?;

        info!(
            tenant_id = %credential.tenant_id,
            mode = %credential.mode,
            collection_id = %collection.id,
            "Gateway connection probe succeeded"
        );
        Ok(())
    }

    /// Creates a bill for `intent` and returns the hosted payment page.
    pub async fn create_charge(
        &self,
        tenant_id: &str,
        mode: GatewayMode,
        intent: &PaymentIntent,
    ) -> BridgeResult<ChargeCreated> {
        let mut missing = Vec::new();
        if intent.payer_name.trim().is_empty() {
            missing.push("name".to_string());
        }
        if intent.payer_email.trim().is_empty() {
            missing.push("email".to_string());
        }
        if !missing.is_empty() {
            return Err(BridgeError::validation(
                format!("Missing required fields: {}", missing.join(", ")),
                missing,
            ));
        }

        let currency = intent.currency.trim();
        if !currency.is_empty() && !currency.eq_ignore_ascii_case(GATEWAY_CURRENCY) {
            return Err(BridgeError::validation(
                format!("Unsupported currency '{}', expected {}", currency, GATEWAY_CURRENCY),
                vec!["currency".to_string()],
            ));
        }

        let amount = to_minor_units(intent.amount)?;
        let credential = self.load_credentials(tenant_id, mode)?;

        let bill = CreateBill {
            collection_id: credential.collection_id.clone(),
            email: intent.payer_email.trim().to_string(),
            name: intent.payer_name.trim().to_string(),
            amount,
            description: bill_description(&intent.description),
            callback_url: tenant_url(&self.public_base_url, "/payments/callback", tenant_id, mode),
            redirect_url: tenant_url(&self.public_base_url, "/payments/redirect", tenant_id, mode),
            mobile: intent
                .payer_phone
                .as_ref()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
        };

        let created = self
            .client
            .create_bill(mode, &credential.api_key, &bill)
            .await
            .inspect_err(|e| {
                warn!(tenant_id = %tenant_id, mode = %mode, kind = e.kind(), "Bill creation failed");
            })?;

        info!(
            tenant_id = %tenant_id,
            mode = %mode,
            charge_id = %created.id,
            amount = amount,
            "Charge created"
        );

        Ok(ChargeCreated {
            charge_id: created.id,
            redirect_url: created.url,
        })
    }

    /// Fetches a charge and normalizes its state.
    pub async fn query_charge(
        &self,
        tenant_id: &str,
        mode: GatewayMode,
        charge_id: &str,
    ) -> BridgeResult<ChargeStatus> {
        if charge_id.trim().is_empty() {
            return Err(BridgeError::validation(
                "chargeId is required",
                vec!["chargeId".to_string()],
            ));
        }

        let credential = self.load_credentials(tenant_id, mode)?;
        let bill = self
            .client
            .get_bill(mode, &credential.api_key, charge_id.trim())
            .await?;

        let state = ChargeState::from_gateway(&bill.state);
        debug!(tenant_id = %tenant_id, charge_id = %charge_id, state = ?state, "Charge queried");

        Ok(ChargeStatus {
            state,
            // A paid flag without a paid state is not trusted
            paid: bill.paid && state == ChargeState::Paid,
            amount_paid: bill.paid_amount,
        })
    }

    /// Authenticates a gateway callback and turns it into a [`PaymentEvent`].
    ///
    /// Fails closed: a missing signature header, missing credentials, an unparsable
    /// body or a signature mismatch all yield [`BridgeError::Signature`].
    pub fn verify_callback(
        &self,
        tenant_id: &str,
        mode: GatewayMode,
        headers: &HeaderMap,
        raw_body: &[u8],
    ) -> BridgeResult<PaymentEvent> {
        let provided = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                warn!(tenant_id = %tenant_id, mode = %mode, "Callback without signature header");
                BridgeError::Signature("missing signature header".to_string())
            })?;

        let credential = match self.store.get_gateway_credential(tenant_id, mode)? {
            Some(credential) => credential,
            None => {
                warn!(tenant_id = %tenant_id, mode = %mode, "Callback for unconfigured tenant");
                return Err(BridgeError::Signature(
                    "no signing key for tenant".to_string(),
                ));
            }
        };

        let fields: Vec<(String, String)> = serde_urlencoded::from_bytes(raw_body)
            .map_err(|_| BridgeError::Signature("callback body is not form-encoded".to_string()))?;

        if !signature::verify(&fields, &credential.signing_secret, provided) {
            warn!(tenant_id = %tenant_id, mode = %mode, "Callback signature mismatch");
            return Err(BridgeError::Signature("signature mismatch".to_string()));
        }

        let field = |name: &str| {
            fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };

        let charge_id = field("id")
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                BridgeError::validation("callback is missing the bill id", vec!["id".to_string()])
            })?
            .to_string();
        let state = ChargeState::from_gateway(field("state").unwrap_or_default());
        let paid = field("paid") == Some("true") && state == ChargeState::Paid;
        let amount_paid = field("paid_amount")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        let paid_at = field("paid_at")
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        info!(
            tenant_id = %tenant_id,
            mode = %mode,
            charge_id = %charge_id,
            state = ?state,
            "Verified gateway callback"
        );

        Ok(PaymentEvent {
            tenant_id: tenant_id.to_string(),
            mode,
            charge_id,
            state,
            paid,
            amount_paid,
            paid_at,
        })
    }

    fn load_credentials(&self, tenant_id: &str, mode: GatewayMode) -> BridgeResult<GatewayCredential> {
        self.store
            .get_gateway_credential(tenant_id, mode)?
            .ok_or_else(|| BridgeError::NotConfigured {
                tenant_id: tenant_id.to_string(),
                mode: mode.to_string(),
            })
    }
}

fn bill_description(description: &str) -> String {
    let description = description.trim();
    if description.is_empty() {
        return DEFAULT_DESCRIPTION.to_string();
    }
    description.chars().take(MAX_DESCRIPTION_CHARS).collect()
}
