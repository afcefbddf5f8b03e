//! Payment endpoints called by the host platform, the gateway and the payer's browser.

use super::error::{JsonBody, TenantQuery};
use super::pages::status_page;
use crate::error::BridgeError;
use crate::payments::{
    parse_major_amount, ChargeCreated, ChargeState, ChargeStatus, PaymentAdapter, PaymentEvent,
    PaymentIntent,
};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Query key the gateway uses for the bill id on browser redirects.
const REDIRECT_BILL_ID: &str = "billplz[id]";

/// Shared application state for payment API
pub struct PaymentsAppState {
    pub adapter: Arc<PaymentAdapter>,
    pub events: broadcast::Sender<PaymentEvent>,
    pub dashboard_url: String,
}

/// Request body for POST /payments
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl CreatePaymentRequest {
    fn into_intent(self) -> Result<PaymentIntent, BridgeError> {
        fn text(value: Option<String>) -> String {
            value.map(|v| v.trim().to_string()).unwrap_or_default()
        }

        let name = text(self.name);
        let email = text(self.email);

        let mut missing = Vec::new();
        let amount = self.amount.filter(|v| !v.is_null());
        if amount.is_none() {
            missing.push("amount".to_string());
        }
        if name.is_empty() {
            missing.push("name".to_string());
        }
        if email.is_empty() {
            missing.push("email".to_string());
        }
        let Some(amount) = amount.filter(|_| missing.is_empty()) else {
            return Err(BridgeError::validation(
                format!("Missing required fields: {}", missing.join(", ")),
                missing,
            ));
        };

        Ok(PaymentIntent {
            amount: parse_major_amount(&amount)?,
            currency: text(self.currency),
            payer_name: name,
            payer_email: email,
            payer_phone: self.phone,
            description: text(self.description),
        })
    }
}

/// Request body for POST /payments/query
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPaymentRequest {
    #[serde(default)]
    pub charge_id: String,
}

#[derive(Serialize)]
struct CallbackAck {
    received: bool,
}

/// Create payment API router
pub fn create_payments_router(state: PaymentsAppState) -> Router {
    Router::new()
        .route("/payments", post(create_payment))
        .route("/payments/query", post(query_payment))
        .route("/payments/callback", post(payment_callback))
        .route("/payments/redirect", get(payment_redirect))
        .with_state(Arc::new(state))
}

/// POST /payments?tenantId=&mode=
async fn create_payment(
    State(state): State<Arc<PaymentsAppState>>,
    Query(query): Query<TenantQuery>,
    JsonBody(request): JsonBody<CreatePaymentRequest>,
) -> Result<Json<ChargeCreated>, BridgeError> {
    let (tenant_id, mode) = query.tenant_and_mode()?;
    let intent = request.into_intent()?;
    let created = state.adapter.create_charge(&tenant_id, mode, &intent).await?;
    Ok(Json(created))
}

/// POST /payments/query?tenantId=&mode=
async fn query_payment(
    State(state): State<Arc<PaymentsAppState>>,
    Query(query): Query<TenantQuery>,
    JsonBody(request): JsonBody<QueryPaymentRequest>,
) -> Result<Json<ChargeStatus>, BridgeError> {
    let (tenant_id, mode) = query.tenant_and_mode()?;
    let status = state
        .adapter
        .query_charge(&tenant_id, mode, &request.charge_id)
        .await?;
    Ok(Json(status))
}

/// POST /payments/callback?tenantId=&mode=
///
/// Gateway server-to-server notification. The raw body is kept for signature checks.
async fn payment_callback(
    State(state): State<Arc<PaymentsAppState>>,
    Query(query): Query<TenantQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CallbackAck>, BridgeError> {
    let (tenant_id, mode) = query
        .tenant_and_mode()
        .map_err(|_| BridgeError::Signature("callback URL is missing tenantId or mode".to_string()))?;

    let event = state
        .adapter
        .verify_callback(&tenant_id, mode, &headers, &body)?;

    // No subscribers is not an error
    if state.events.send(event).is_err() {
        debug!(tenant_id = %tenant_id, "No payment event subscribers");
    }

    Ok(Json(CallbackAck { received: true }))
}

/// GET /payments/redirect?tenantId=&mode=&billplz[id]=
///
/// The payer's browser lands here. Query parameters are not trusted; the bill is
/// re-read from the gateway.
async fn payment_redirect(
    State(state): State<Arc<PaymentsAppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let query = TenantQuery {
        tenant_id: params.get("tenantId").cloned(),
        mode: params.get("mode").cloned(),
    };
    let dashboard = Some((state.dashboard_url.as_str(), "Return"));

    let (tenant_id, mode) = match query.tenant_and_mode() {
        Ok(parts) => parts,
        Err(e) => return page(StatusCode::BAD_REQUEST, "Invalid payment link", &e.to_string(), None),
    };
    let Some(bill_id) = params.get(REDIRECT_BILL_ID).filter(|id| !id.is_empty()) else {
        return page(
            StatusCode::BAD_REQUEST,
            "Invalid payment link",
            "The payment reference is missing.",
            None,
        );
    };

    match state.adapter.query_charge(&tenant_id, mode, bill_id).await {
        Ok(status) => {
            let (title, message) = match status.state {
                ChargeState::Paid => ("Payment received", "Thank you, your payment was successful."),
                ChargeState::Pending => (
                    "Payment pending",
                    "Your payment has not been confirmed yet. You will be notified once it is.",
                ),
                ChargeState::Failed => ("Payment not completed", "Your payment was not completed."),
            };
            page(StatusCode::OK, title, message, dashboard)
        }
        Err(e) => {
            warn!(tenant_id = %tenant_id, bill_id = %bill_id, kind = e.kind(), "Redirect lookup failed");
            let status =
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            page(
                status,
                "Payment status unavailable",
                "We could not confirm the payment status. Please check again later.",
                dashboard,
            )
        }
    }
}

fn page(status: StatusCode, title: &str, message: &str, link: Option<(&str, &str)>) -> Response {
    (status, Html(status_page(title, message, link))).into_response()
}
